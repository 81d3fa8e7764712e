//! # factum-core
//!
//! The FACTUM validation orchestrator.
//!
//! This crate wires the pipeline together and exposes the public entry
//! point, [`Validator::validate`]:
//!
//! 1. **Rule engine** — every caller-supplied rule, dispatched by kind.
//! 2. **Anomaly detection** — statistical rules and pattern heuristics,
//!    opt-in via the request context.
//! 3. **Auto-correction** — deterministic repair of error violations,
//!    opt-in via the request context.
//! 4. **Status & confidence** — verdict derivation and the weighted
//!    five-factor trust score.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use factum_connect::{register_builtins, ConnectorRegistry};
//! use factum_core::Validator;
//! use factum_rules::RuleEngine;
//! use factum_stats::MlAnomalyDetector;
//!
//! let mut registry = ConnectorRegistry::new();
//! register_builtins(&mut registry);
//!
//! let engine = RuleEngine::new(Arc::new(registry), Arc::new(MlAnomalyDetector::new()));
//! let validator = Validator::new(engine);
//! // validator.validate(&document, &rules, &context).await
//! ```

pub mod config;
pub mod scorer;
pub mod validator;

pub use config::EngineConfig;
pub use scorer::{ConfidenceFactors, ConfidenceLevel, ConfidenceScorer};
pub use validator::Validator;
