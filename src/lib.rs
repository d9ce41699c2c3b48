// Coco Onboard - Core Library
// Wizard engine for coconut farmer registration, used by the terminal client and tests

pub mod error;
pub mod geo;          // Administrative hierarchy: levels, options, resolver trait
pub mod form;         // Field values collected by the wizards
pub mod media;
pub mod location;
pub mod selector;     // Dependent selector chain with stale-response discard
pub mod validation;   // Per-step validation gate
pub mod wizard;       // Branching wizard controller
pub mod flows;        // The shipped wizards
pub mod payment;
pub mod api;          // Backend HTTP client
pub mod store;        // SQLite session, payment ledger, event log
pub mod completion;   // Fee → payment → register → report → navigate
pub mod config;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{Result, WizardError};
pub use geo::{GeoHierarchyResolver, GeoLevel, GeoOption, Language};
pub use form::{FieldMap, FieldValue};
pub use media::{MediaCapture, MediaHandle, MediaSource};
pub use location::{Coordinates, DeviceLocation, GeocodedPlace};
pub use selector::{DependentSelectorChain, FetchOutcome, LoadState, SeedReport, SelectionState, POSTAL_CODE_FIELD};
pub use validation::{FieldCheck, FieldRule, StepId, StepValidationGate, ValidationError};
pub use wizard::{Position, Step, Transition, WizardController, WizardSession};
pub use flows::{Flow, FlowKind};
pub use payment::{
    GatewayResult, PaymentAttempt, PaymentGateway, PaymentOutcome, PaymentRequest,
    PaymentStatusReport,
};
pub use api::{BackendApi, BackendLocation, ClientConfig, FeeConfig, HttpBackend, RegistrationResponse};
pub use store::{CredentialStore, Event, PaymentLedger, SqliteStore, StoredSession};
pub use completion::{
    advance, CompletionGateway, CompletionOutcome, CompletionUi, Destination, Notice,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
