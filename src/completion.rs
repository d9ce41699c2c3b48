// ✅ Completion Gateway - fee lookup, payment, registration, status report
//
// Failure policy:
//   fee lookup fails          → fail open, register without a fee
//   registration fails        → this attempt ends, session stays for a retry
//   status report fails       → logged only, never retried, never blocks navigation
//
// Payment cancellation is the only outcome that skips registration.

use crate::api::{BackendApi, RegistrationResponse};
use crate::form::FieldMap;
use crate::payment::{GatewayResult, PaymentAttempt, PaymentGateway, PaymentRequest, PaymentStatusReport};
use crate::store::{CredentialStore, PaymentLedger, StoredSession};
use crate::wizard::{Transition, WizardController};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

// ============================================================================
// NAVIGATION & NOTICES
// ============================================================================

/// Where the app goes after a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    FarmerHome,
    AggregatorHome,
    /// Unknown role: send to sign-in with the cached token
    SignIn,
}

impl Destination {
    pub fn for_role(role_id: i64) -> Self {
        match role_id {
            2 => Destination::FarmerHome,
            3 => Destination::AggregatorHome,
            _ => Destination::SignIn,
        }
    }
}

/// User-visible messages raised during completion
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PaymentCancelled,
    PaymentFailed(String),
    RegistrationFailed(String),
}

/// The slice of the UI the completion sequence talks to
#[async_trait]
pub trait CompletionUi: Send + Sync {
    /// Ask the user to confirm paying the fee
    async fn confirm_fee(&self, amount: f64, currency: &str) -> bool;

    fn notify(&self, notice: Notice);

    fn navigate(&self, destination: Destination);
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Registered {
        registration_id: String,
        role_id: i64,
        destination: Destination,
        payment: Option<PaymentAttempt>,
    },
    /// User backed out of the fee; nothing registered
    PaymentCancelled,
    /// Backend refused or was unreachable; nothing registered
    RegistrationFailed(String),
    /// Another confirm is still running
    Busy,
    AlreadyCompleted,
}

impl CompletionOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, CompletionOutcome::Registered { .. })
    }
}

/// Clears the in-progress flag even if the future is dropped mid-way
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

pub struct CompletionGateway {
    backend: Arc<dyn BackendApi>,
    payments: Arc<dyn PaymentGateway>,
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn PaymentLedger>,
    ui: Arc<dyn CompletionUi>,
    currency: String,
    in_progress: AtomicBool,
    completed: AtomicBool,
    /// A fee paid whose registration then failed; reused on retry
    paid: Mutex<Option<PaymentAttempt>>,
}

impl CompletionGateway {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        payments: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn PaymentLedger>,
        ui: Arc<dyn CompletionUi>,
    ) -> Self {
        CompletionGateway {
            backend,
            payments,
            credentials,
            ledger,
            ui,
            currency: "INR".to_string(),
            in_progress: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            paid: Mutex::new(None),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Run the terminal confirm; a second call while one runs is ignored
    pub async fn complete(&self, fields: &FieldMap) -> CompletionOutcome {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            if self.is_completed() {
                return CompletionOutcome::AlreadyCompleted;
            }
            info!("completion already running, ignoring confirm");
            return CompletionOutcome::Busy;
        }
        let _guard = InProgress(&self.in_progress);

        // Checked under the flag: `completed` is set before a winner releases it
        if self.is_completed() {
            return CompletionOutcome::AlreadyCompleted;
        }

        let outcome = self.run(fields).await;
        if outcome.is_registered() {
            self.completed.store(true, Ordering::SeqCst);
        }
        outcome
    }

    async fn run(&self, fields: &FieldMap) -> CompletionOutcome {
        if let Some(paid) = self.take_paid() {
            info!(payment = %paid.id, "reusing settled payment for registration retry");
            return self.register_after_payment(fields, paid).await;
        }

        let fees = match self.backend.fetch_fees().await {
            Ok(fees) => fees,
            Err(e) => {
                warn!(error = %e, "fee lookup failed, registering without fee");
                crate::api::FeeConfig::disabled()
            }
        };

        if !fees.is_due() {
            return match self.register_user(fields).await {
                Some(registration) => self.finish(registration, None),
                None => self.registration_failed(),
            };
        }

        if !self.ui.confirm_fee(fees.amount, &self.currency).await {
            self.ui.notify(Notice::PaymentCancelled);
            return CompletionOutcome::PaymentCancelled;
        }

        let request = PaymentRequest {
            amount: fees.amount,
            currency: self.currency.clone(),
            description: "Farmer registration fee".to_string(),
            contact_name: fields.text("full_name").or_else(|| fields.text("name")),
            contact_mobile: fields.text("mobile"),
        };

        let mut attempt = PaymentAttempt::pending(fees.amount, &self.currency);
        let result = self.payments.open(&request).await;
        attempt.settle(&result);
        info!(payment = %attempt.id, outcome = attempt.outcome.as_str(), "payment settled");

        match result {
            GatewayResult::Cancelled => {
                self.record(None, &attempt);
                self.ui.notify(Notice::PaymentCancelled);
                CompletionOutcome::PaymentCancelled
            }
            GatewayResult::Failed { reason, .. } => {
                self.ui.notify(Notice::PaymentFailed(reason));
                self.register_after_payment(fields, attempt).await
            }
            GatewayResult::Success { .. } => self.register_after_payment(fields, attempt).await,
        }
    }

    /// Register, then report the settled attempt against the new id
    async fn register_after_payment(&self, fields: &FieldMap, attempt: PaymentAttempt) -> CompletionOutcome {
        self.record(None, &attempt);

        let Some(registration) = self.register_user(fields).await else {
            // Keep a successful charge so a retry does not bill twice
            if attempt.outcome == crate::payment::PaymentOutcome::Succeeded {
                *self.paid.lock().unwrap_or_else(|p| p.into_inner()) = Some(attempt);
            }
            return self.registration_failed();
        };

        self.record(Some(&registration.farmer_id), &attempt);
        self.report_status(&registration.farmer_id, &attempt).await;
        self.finish(registration, Some(attempt))
    }

    /// Multipart submission; persists credentials on success
    ///
    /// Returns `None` (after notifying the user) when the backend refuses.
    pub async fn register_user(&self, fields: &FieldMap) -> Option<RegistrationResponse> {
        let registration = match self.backend.register_farmer(fields).await {
            Ok(registration) => registration,
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "registration failed");
                self.ui.notify(Notice::RegistrationFailed(e.to_string()));
                return None;
            }
        };

        self.backend.authorize(&registration.token);

        let session = StoredSession {
            token: registration.token.clone(),
            user_id: registration.farmer_id.clone(),
            role_id: registration.role_id,
            profile: registration.profile.clone(),
            saved_at: Utc::now(),
        };
        if let Err(e) = self.credentials.save_session(&session) {
            // Registered server-side; the user can still sign in again
            error!(error = %e, "could not cache session locally");
        }

        info!(farmer = %registration.farmer_id, role = registration.role_id, "farmer registered");
        Some(registration)
    }

    /// Best-effort telemetry
    async fn report_status(&self, user_id: &str, attempt: &PaymentAttempt) {
        let report = PaymentStatusReport::from_attempt(user_id, attempt, self.payments.method_name());
        if let Err(e) = self.backend.update_payment_status(&report).await {
            warn!(error = %e, payment = %attempt.id, "payment status report failed");
        }
    }

    fn record(&self, user_id: Option<&str>, attempt: &PaymentAttempt) {
        if let Err(e) = self.ledger.record_attempt(user_id, attempt) {
            warn!(error = %e, "could not record payment attempt locally");
        }
    }

    fn take_paid(&self) -> Option<PaymentAttempt> {
        self.paid.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn finish(&self, registration: RegistrationResponse, payment: Option<PaymentAttempt>) -> CompletionOutcome {
        let destination = Destination::for_role(registration.role_id);
        self.ui.navigate(destination);

        CompletionOutcome::Registered {
            registration_id: registration.farmer_id,
            role_id: registration.role_id,
            destination,
            payment,
        }
    }

    fn registration_failed(&self) -> CompletionOutcome {
        CompletionOutcome::RegistrationFailed("registration was not accepted".to_string())
    }
}

/// Advance the controller; if that confirms the terminal step, run completion
///
/// Returns the transition and, when completion ran, its outcome.
pub async fn advance(
    controller: &mut WizardController,
    gateway: &CompletionGateway,
) -> (Transition, Option<CompletionOutcome>) {
    let transition = controller.go_next();
    if transition != Transition::Completing {
        return (transition, None);
    }

    let fields = controller.submission_fields();
    let outcome = gateway.complete(&fields).await;
    controller.finish_completion(outcome.is_registered() || outcome == CompletionOutcome::AlreadyCompleted);
    (transition, Some(outcome))
}
