//! The connector registry: named async checks against external truth
//! sources.
//!
//! A connector is registered once at process start and looked up by name
//! when an `external_ref` rule runs.  `check()` is the one call site and it
//! never raises: connector errors and timeouts are converted into
//! `ConnectorResult { exists: false }` with an explanatory detail, and
//! latency is measured around every call — failures included.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use factum_contracts::{CollaboratorError, FactumError, FactumResult};

/// Result returned by every connector check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorResult {
    /// True when the external check passed (value is valid / found).
    pub exists: bool,
    /// Human-readable explanation of the outcome.
    pub detail: String,
    /// Round-trip time in milliseconds, set by the registry.
    #[serde(default)]
    pub latency_ms: u64,
    /// Optional raw response from the external source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    /// True when `exists: false` reflects an infrastructure problem (error
    /// or timeout) rather than a genuine "not found" answer.  Callers use
    /// this to downgrade severity; it is not part of the wire format.
    #[serde(skip)]
    pub infra_failure: bool,
}

impl ConnectorResult {
    /// A passing result.
    pub fn found(detail: impl Into<String>) -> Self {
        Self {
            exists: true,
            detail: detail.into(),
            latency_ms: 0,
            raw: None,
            infra_failure: false,
        }
    }

    /// A failing result.
    pub fn missing(detail: impl Into<String>) -> Self {
        Self {
            exists: false,
            detail: detail.into(),
            latency_ms: 0,
            raw: None,
            infra_failure: false,
        }
    }

    fn infra(detail: impl Into<String>) -> Self {
        Self {
            infra_failure: true,
            ..Self::missing(detail)
        }
    }

    /// Attach the raw upstream response.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// A named async capability verifying a single value against an external
/// source of truth.
///
/// `value` is whatever the rule's target field contains; `params` come from
/// the rule's `params` object.  Connectors are stateless between calls.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn call(
        &self,
        value: &Value,
        params: &Map<String, Value>,
    ) -> Result<ConnectorResult, CollaboratorError>;
}

/// Registry of named connectors.
///
/// Register connectors at startup and share the registry (behind an `Arc`)
/// with the rule engine for the life of the process.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Box<dyn Connector>>,
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connector` under `name`.  Registering the same name twice
    /// replaces the previous connector.
    pub fn register(&mut self, name: impl Into<String>, connector: Box<dyn Connector>) {
        self.connectors.insert(name.into(), connector);
    }

    /// Sorted list of registered connector names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Call the named connector with `value` and `params`, bounded by
    /// `timeout`.
    ///
    /// Latency is measured around every call, including failures.  A
    /// connector error or timeout becomes `ConnectorResult { exists: false }`
    /// — this method only returns `Err` for a name that was never
    /// registered, so callers can distinguish "check failed" from
    /// "connector does not exist".
    pub async fn check(
        &self,
        name: &str,
        value: &Value,
        params: &Map<String, Value>,
        timeout: Duration,
    ) -> FactumResult<ConnectorResult> {
        let Some(connector) = self.connectors.get(name) else {
            return Err(FactumError::ConnectorNotRegistered {
                name: name.to_string(),
                available: self.names(),
            });
        };

        let started = Instant::now();
        let mut result = match tokio::time::timeout(timeout, connector.call(value, params)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(connector = %name, error = %e, "connector call failed");
                ConnectorResult::infra(format!("connector '{name}' error: {e}"))
            }
            Err(_) => {
                warn!(connector = %name, timeout_s = timeout.as_secs_f64(), "connector timed out");
                ConnectorResult::infra(format!(
                    "connector '{name}' timed out after {}s",
                    timeout.as_secs_f64()
                ))
            }
        };

        result.latency_ms = started.elapsed().as_millis() as u64;
        debug!(
            connector = %name,
            exists = result.exists,
            latency_ms = result.latency_ms,
            "connector check complete"
        );
        Ok(result)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
