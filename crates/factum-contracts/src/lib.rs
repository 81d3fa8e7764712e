//! # factum-contracts
//!
//! Shared types, rule definitions, and collaborator contracts for the
//! FACTUM validation pipeline.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions, dot-path value helpers, the
//! collaborator trait contracts, and error types.

pub mod error;
pub mod result;
pub mod rule;
pub mod traits;
pub mod value;
pub mod violation;

pub use error::{CollaboratorError, FactumError, FactumResult};
pub use result::{new_validation_id, ValidationContext, ValidationResult, ValidationStatus};
pub use rule::{OutlierMethod, Rule, RuleKind, RuleParseError, Severity};
pub use violation::{CorrectionHint, Violation, ViolationKind};
