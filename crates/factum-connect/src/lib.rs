//! # factum-connect
//!
//! The connector registry and web fact-check pipeline for the FACTUM
//! validation engine.
//!
//! ## Overview
//!
//! `external_ref` rules delegate to a named [`Connector`] looked up in a
//! process-wide [`ConnectorRegistry`].  The registry's `check()` call never
//! raises: connector errors and timeouts are converted into
//! `ConnectorResult { exists: false }` with an explanatory detail, and
//! latency is measured around every call.
//!
//! `web_verify` rules delegate to [`WebVerifier`], which grounds a claim in
//! live search results and scores them by embedding similarity.
//!
//! ## Registering a custom connector
//!
//! ```rust,ignore
//! use factum_connect::{Connector, ConnectorRegistry, ConnectorResult};
//!
//! struct StripeCustomer { client: reqwest::Client }
//!
//! #[async_trait::async_trait]
//! impl Connector for StripeCustomer {
//!     async fn call(&self, value: &serde_json::Value, _params: &serde_json::Map<String, serde_json::Value>)
//!         -> Result<ConnectorResult, factum_contracts::CollaboratorError>
//!     {
//!         let id = value.as_str().unwrap_or_default();
//!         let status = self.client
//!             .get(format!("https://api.stripe.com/v1/customers/{id}"))
//!             .send().await.map_err(|e| factum_contracts::CollaboratorError(e.to_string()))?
//!             .status();
//!         Ok(ConnectorResult {
//!             exists: status.is_success(),
//!             detail: format!("Stripe HTTP {status}"),
//!             latency_ms: 0,
//!             raw: None,
//!         })
//!     }
//! }
//!
//! let mut registry = ConnectorRegistry::new();
//! registry.register("stripe_customer", Box::new(StripeCustomer { client: reqwest::Client::new() }));
//! ```

pub mod builtin;
pub mod registry;
pub mod web;

pub use builtin::{register_builtins, HttpJsonField, HttpNumericTolerance, HttpStatusOk};
pub use registry::{Connector, ConnectorRegistry, ConnectorResult};
pub use web::{WebSource, WebVerdict, WebVerification, WebVerifier};
