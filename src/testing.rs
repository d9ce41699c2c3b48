// Test doubles for the external collaborators

use crate::api::{BackendApi, FeeConfig, RegistrationResponse};
use crate::completion::{CompletionUi, Destination, Notice};
use crate::error::{Result, WizardError};
use crate::form::FieldMap;
use crate::geo::{GeoHierarchyResolver, GeoLevel, GeoOption};
use crate::location::{Coordinates, DeviceLocation, GeocodedPlace};
use crate::payment::{GatewayResult, PaymentAttempt, PaymentGateway, PaymentRequest, PaymentStatusReport};
use crate::store::{CredentialStore, PaymentLedger, StoredSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub(crate) fn opt(id: &str, name: &str) -> GeoOption {
    GeoOption::new(id, name)
}

// ============================================================================
// RESOLVERS
// ============================================================================

/// Answers immediately from a fixture table; unknown parents get an empty list
#[derive(Default)]
pub(crate) struct StaticResolver {
    table: HashMap<(GeoLevel, Option<String>), Vec<GeoOption>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, level: GeoLevel, parent: Option<&str>, options: Vec<GeoOption>) -> Self {
        self.table.insert((level, parent.map(str::to_string)), options);
        self
    }
}

#[async_trait]
impl GeoHierarchyResolver for StaticResolver {
    async fn resolve(&self, level: GeoLevel, parent_id: Option<&str>) -> Result<Vec<GeoOption>> {
        Ok(self
            .table
            .get(&(level, parent_id.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}

type PendingCall = (GeoLevel, Option<String>, oneshot::Sender<Result<Vec<GeoOption>>>);

/// Holds every call open until the test answers it, in any order
#[derive(Default)]
pub(crate) struct ScriptedResolver {
    pending: Mutex<Vec<PendingCall>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn has_call(&self, level: GeoLevel, parent: Option<&str>) -> bool {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .any(|(l, p, _)| *l == level && p.as_deref() == parent)
    }

    /// Yield until a matching call is in flight
    pub async fn wait_for_call(&self, level: GeoLevel, parent: Option<&str>) {
        while !self.has_call(level, parent) {
            tokio::task::yield_now().await;
        }
    }

    pub fn respond(&self, level: GeoLevel, parent: Option<&str>, result: Result<Vec<GeoOption>>) {
        let mut pending = self.pending.lock().unwrap();
        let index = pending
            .iter()
            .position(|(l, p, _)| *l == level && p.as_deref() == parent)
            .expect("no such pending call");
        let (_, _, sender) = pending.remove(index);
        let _ = sender.send(result);
    }
}

#[async_trait]
impl GeoHierarchyResolver for ScriptedResolver {
    async fn resolve(&self, level: GeoLevel, parent_id: Option<&str>) -> Result<Vec<GeoOption>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .push((level, parent_id.map(str::to_string), tx));
        rx.await.unwrap_or(Err(WizardError::Cancelled))
    }

    fn cancel_pending(&self) {
        self.pending.lock().unwrap().clear();
    }
}

// ============================================================================
// LOCATION
// ============================================================================

pub(crate) struct FixedLocation {
    place: Option<GeocodedPlace>,
}

impl FixedLocation {
    pub fn new(postal_code: &str, region: &str, subregion: &str) -> Self {
        FixedLocation {
            place: Some(GeocodedPlace {
                postal_code: Some(postal_code.to_string()),
                region: Some(region.to_string()),
                subregion: Some(subregion.to_string()),
            }),
        }
    }

    pub fn unavailable() -> Self {
        FixedLocation { place: None }
    }
}

#[async_trait]
impl DeviceLocation for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        Ok(Coordinates {
            latitude: 10.36,
            longitude: 76.31,
        })
    }

    async fn reverse_geocode(&self, _coords: Coordinates) -> Result<GeocodedPlace> {
        self.place
            .clone()
            .ok_or_else(|| WizardError::Network("geocoder offline".into()))
    }
}

// ============================================================================
// BACKEND
// ============================================================================

pub(crate) struct FakeBackend {
    fees: std::result::Result<FeeConfig, String>,
    registration_error: Mutex<Option<String>>,
    fail_reports: AtomicBool,
    register_calls: AtomicUsize,
    log: Mutex<Vec<&'static str>>,
    reports: Mutex<Vec<PaymentStatusReport>>,
    submitted: Mutex<Vec<FieldMap>>,
}

impl FakeBackend {
    pub fn new(fees: Result<FeeConfig>) -> Self {
        FakeBackend {
            fees: fees.map_err(|e| e.to_string()),
            registration_error: Mutex::new(None),
            fail_reports: AtomicBool::new(false),
            register_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Field maps handed to `register_farmer`, in call order
    pub fn submitted(&self) -> Vec<FieldMap> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fail_registration(&self, message: &str) {
        *self.registration_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn allow_registration(&self) {
        *self.registration_error.lock().unwrap() = None;
    }

    pub fn fail_reports(&self) {
        self.fail_reports.store(true, Ordering::SeqCst);
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<PaymentStatusReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn fetch_fees(&self) -> Result<FeeConfig> {
        self.log.lock().unwrap().push("fees");
        // Give a concurrent confirm the chance to run
        tokio::task::yield_now().await;
        self.fees.clone().map_err(WizardError::Network)
    }

    async fn register_farmer(&self, fields: &FieldMap) -> Result<RegistrationResponse> {
        self.log.lock().unwrap().push("register");
        self.submitted.lock().unwrap().push(fields.clone());
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if let Some(message) = self.registration_error.lock().unwrap().clone() {
            return Err(WizardError::Server { status: 409, message });
        }
        Ok(RegistrationResponse {
            farmer_id: "101".to_string(),
            role_id: 2,
            token: "token-101".to_string(),
            profile: serde_json::json!({"id": 101, "name": "Anil"}),
        })
    }

    async fn update_payment_status(&self, report: &PaymentStatusReport) -> Result<()> {
        self.log.lock().unwrap().push("update-status");
        self.reports.lock().unwrap().push(report.clone());
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(WizardError::Network("status endpoint down".into()));
        }
        Ok(())
    }
}

// ============================================================================
// PAYMENTS, STORE, UI
// ============================================================================

pub(crate) struct FakePayments {
    result: GatewayResult,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl FakePayments {
    pub fn new(result: GatewayResult) -> Self {
        FakePayments {
            result,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn open_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn open(&self, request: &PaymentRequest) -> GatewayResult {
        self.requests.lock().unwrap().push(request.clone());
        self.result.clone()
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    session: Mutex<Option<StoredSession>>,
    attempts: Mutex<Vec<(Option<String>, PaymentAttempt)>>,
}

impl MemoryStore {
    pub fn session(&self) -> Option<StoredSession> {
        self.session.lock().unwrap().clone()
    }

    pub fn history(&self, user_id: &str) -> Vec<PaymentAttempt> {
        self.payment_history(user_id).unwrap()
    }
}

impl CredentialStore for MemoryStore {
    fn save_session(&self, session: &StoredSession) -> Result<()> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<StoredSession>> {
        Ok(self.session())
    }

    fn clear_session(&self) -> Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

impl PaymentLedger for MemoryStore {
    fn record_attempt(&self, user_id: Option<&str>, attempt: &PaymentAttempt) -> Result<()> {
        let mut attempts = self.attempts.lock().unwrap();
        match attempts.iter_mut().find(|(_, a)| a.id == attempt.id) {
            Some((owner, existing)) => {
                if user_id.is_some() {
                    *owner = user_id.map(str::to_string);
                }
                *existing = attempt.clone();
            }
            None => attempts.push((user_id.map(str::to_string), attempt.clone())),
        }
        Ok(())
    }

    fn payment_history(&self, user_id: &str) -> Result<Vec<PaymentAttempt>> {
        Ok(self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(owner, _)| owner.as_deref() == Some(user_id))
            .map(|(_, a)| a.clone())
            .collect())
    }
}

pub(crate) struct RecordingUi {
    confirm: bool,
    notices: Mutex<Vec<Notice>>,
    navigations: Mutex<Vec<Destination>>,
}

impl RecordingUi {
    pub fn new(confirm: bool) -> Self {
        RecordingUi {
            confirm,
            notices: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<Destination> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionUi for RecordingUi {
    async fn confirm_fee(&self, _amount: f64, _currency: &str) -> bool {
        self.confirm
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn navigate(&self, destination: Destination) {
        self.navigations.lock().unwrap().push(destination);
    }
}
