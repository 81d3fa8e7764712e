//! Error types for the FACTUM validation pipeline.
//!
//! Almost nothing in the pipeline is allowed to fail with an error: rule
//! parse problems, external-service outages, correction failures, and
//! training failures are all reported *in-band* as warning violations or
//! structured reports.  `FactumError` is reserved for the conditions that
//! indicate a programming error at the call site — a request that is not
//! structurally a request, or configuration that cannot be loaded.

use thiserror::Error;

/// The unified error type for the FACTUM crates.
#[derive(Debug, Error)]
pub enum FactumError {
    /// The caller passed input that is structurally invalid (e.g. a rules
    /// argument that is not an array). This propagates — it is a call-site
    /// bug, not a runtime condition of the pipeline.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A required configuration value is missing or could not be parsed.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A rule named a connector that was never registered.
    ///
    /// The rule engine converts this into a `warning` violation; it is only
    /// an `Err` at the registry boundary so callers can distinguish
    /// "connector failed" from "connector does not exist".
    #[error("connector '{name}' is not registered (available: {available:?})")]
    ConnectorNotRegistered { name: String, available: Vec<String> },
}

/// Convenience alias used throughout the FACTUM crates.
pub type FactumResult<T> = Result<T, FactumError>;

/// Failure reported by an external collaborator (reference lookup,
/// similarity provider, search provider, sample history, model store).
///
/// Collaborator failures never abort the pipeline — evaluators convert them
/// into `warning` violations carrying this message as detail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl From<String> for CollaboratorError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CollaboratorError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
