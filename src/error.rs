// 🚨 Error Taxonomy - what can go wrong inside a wizard session
//
// Validation errors never leave the controller. Network errors are retryable
// and leave session state untouched. Payment outcomes and stale geo responses
// are not errors: see `Notice` and `FetchOutcome`.

use thiserror::Error;

/// Wizard engine error
#[derive(Debug, Error)]
pub enum WizardError {
    /// Local validation rejected a step (never reaches the network)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport-level failure talking to the backend
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered but reported a failure
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Backend answered with something we could not decode
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// In-flight request was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// Local key-value storage failed
    #[error("storage error: {0}")]
    Storage(String),
}

impl WizardError {
    /// Errors the user can fix by simply trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WizardError::Network(_) | WizardError::Server { .. } | WizardError::InvalidResponse(_)
        )
    }
}

impl From<reqwest::Error> for WizardError {
    fn from(e: reqwest::Error) -> Self {
        WizardError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(e: serde_json::Error) -> Self {
        WizardError::InvalidResponse(e.to_string())
    }
}

impl From<rusqlite::Error> for WizardError {
    fn from(e: rusqlite::Error) -> Self {
        WizardError::Storage(e.to_string())
    }
}

/// Result type for wizard operations
pub type Result<T> = std::result::Result<T, WizardError>;
