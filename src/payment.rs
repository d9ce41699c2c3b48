// 💳 Payment - registration fee attempts and the external gateway contract
//
// The gateway owns its own UI and returns exactly one of success,
// cancellation or failure. Only failure still leads to a registration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PAYMENT OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Pending,
    Succeeded,
    Cancelled,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Pending => "pending",
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Cancelled => "cancelled",
            PaymentOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentOutcome::Pending),
            "succeeded" => Some(PaymentOutcome::Succeeded),
            "cancelled" => Some(PaymentOutcome::Cancelled),
            "failed" => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// PAYMENT ATTEMPT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Local id, stable across status updates
    pub id: String,
    pub amount: f64,
    pub currency: String,
    /// Gateway transaction id; None until the gateway responds
    pub transaction_id: Option<String>,
    pub outcome: PaymentOutcome,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn pending(amount: f64, currency: &str) -> Self {
        PaymentAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            currency: currency.to_string(),
            transaction_id: None,
            outcome: PaymentOutcome::Pending,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Fold a gateway answer into the attempt
    pub fn settle(&mut self, result: &GatewayResult) {
        match result {
            GatewayResult::Success { transaction_id } => {
                self.transaction_id = Some(transaction_id.clone());
                self.outcome = PaymentOutcome::Succeeded;
            }
            GatewayResult::Cancelled => {
                self.outcome = PaymentOutcome::Cancelled;
            }
            GatewayResult::Failed { transaction_id, reason } => {
                self.transaction_id = transaction_id.clone();
                self.outcome = PaymentOutcome::Failed;
                self.failure_reason = Some(reason.clone());
            }
        }
    }
}

// ============================================================================
// GATEWAY CONTRACT
// ============================================================================

/// What the payment sheet is opened with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub contact_name: Option<String>,
    pub contact_mobile: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResult {
    Success { transaction_id: String },
    /// User dismissed the sheet
    Cancelled,
    /// Gateway declined (insufficient funds, bank timeout, ...)
    Failed {
        transaction_id: Option<String>,
        reason: String,
    },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Yield to the gateway UI and wait for its single answer
    async fn open(&self, request: &PaymentRequest) -> GatewayResult;

    /// Reported as `payment_method` in status updates
    fn method_name(&self) -> &str {
        "razorpay"
    }
}

// ============================================================================
// STATUS REPORT (POST /payments/update-status)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusReport {
    pub user_id: String,
    pub payment_id: String,
    /// 1 = success, 0 = failure
    pub payment_status: u8,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PaymentStatusReport {
    pub fn from_attempt(user_id: &str, attempt: &PaymentAttempt, method: &str) -> Self {
        PaymentStatusReport {
            user_id: user_id.to_string(),
            payment_id: attempt
                .transaction_id
                .clone()
                .unwrap_or_else(|| attempt.id.clone()),
            payment_status: u8::from(attempt.outcome == PaymentOutcome::Succeeded),
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            payment_method: method.to_string(),
            failure_reason: attempt.failure_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_success() {
        let mut attempt = PaymentAttempt::pending(50.0, "INR");
        assert_eq!(attempt.outcome, PaymentOutcome::Pending);

        attempt.settle(&GatewayResult::Success { transaction_id: "pay_123".into() });

        assert_eq!(attempt.outcome, PaymentOutcome::Succeeded);
        assert_eq!(attempt.transaction_id.as_deref(), Some("pay_123"));
    }

    #[test]
    fn test_failed_report_carries_reason() {
        let mut attempt = PaymentAttempt::pending(50.0, "INR");
        attempt.settle(&GatewayResult::Failed {
            transaction_id: None,
            reason: "insufficient funds".into(),
        });

        let report = PaymentStatusReport::from_attempt("42", &attempt, "razorpay");

        assert_eq!(report.payment_status, 0);
        assert_eq!(report.failure_reason.as_deref(), Some("insufficient funds"));
        // Without a gateway id the local attempt id is reported
        assert_eq!(report.payment_id, attempt.id);
    }

    #[test]
    fn test_report_serialization_omits_empty_reason() {
        let mut attempt = PaymentAttempt::pending(50.0, "INR");
        attempt.settle(&GatewayResult::Success { transaction_id: "pay_9".into() });

        let json = serde_json::to_value(PaymentStatusReport::from_attempt("7", &attempt, "upi")).unwrap();

        assert_eq!(json["payment_status"], 1);
        assert_eq!(json["payment_id"], "pay_9");
        assert!(json.get("failure_reason").is_none());
    }
}
