//! Built-in connectors demonstrating the registry contract.
//!
//! Three pre-built checks that need no API key:
//!
//! - [`HttpStatusOk`] — liveness probe: GET the value as a URL, pass on 200.
//! - [`HttpJsonField`] — GET a configured URL, extract a dot-path field from
//!   the JSON body, optionally compare it to an expected value.
//! - [`HttpNumericTolerance`] — fetch a canonical numeric or `HH:MM` clock
//!   value from an external source and check the claimed value is within an
//!   allowed deviation.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use factum_contracts::{value as docpath, CollaboratorError};

use crate::registry::{Connector, ConnectorRegistry, ConnectorResult};

/// Default per-request HTTP timeout, overridable via a `timeout` param
/// (seconds).
const DEFAULT_HTTP_TIMEOUT_SECS: f64 = 8.0;

fn http_timeout(params: &Map<String, Value>) -> std::time::Duration {
    let secs = params
        .get("timeout")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    std::time::Duration::from_secs_f64(secs)
}

fn param_str<'p>(params: &'p Map<String, Value>, key: &str) -> Option<&'p str> {
    params.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// GETs the field value (which must be a URL) and passes when the server
/// responds 200 OK.
pub struct HttpStatusOk {
    client: reqwest::Client,
}

impl HttpStatusOk {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpStatusOk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for HttpStatusOk {
    async fn call(
        &self,
        value: &Value,
        params: &Map<String, Value>,
    ) -> Result<ConnectorResult, CollaboratorError> {
        let url = match value.as_str() {
            Some(s) => s.trim().to_string(),
            None => value.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .timeout(http_timeout(params))
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("GET {url} failed: {e}")))?;

        let status = response.status().as_u16();
        Ok(ConnectorResult {
            exists: status == 200,
            detail: format!("GET {url} -> HTTP {status}"),
            latency_ms: 0,
            infra_failure: false,
            raw: Some(json!({ "status_code": status })),
        })
    }
}

/// GETs `params.url`, walks `params.json_path` into the JSON body, and
/// passes when the field exists — or, when `params.expected` is set, when
/// the field's string form equals it.
pub struct HttpJsonField {
    client: reqwest::Client,
}

impl HttpJsonField {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpJsonField {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for HttpJsonField {
    async fn call(
        &self,
        _value: &Value,
        params: &Map<String, Value>,
    ) -> Result<ConnectorResult, CollaboratorError> {
        let (Some(url), Some(json_path)) = (param_str(params, "url"), param_str(params, "json_path"))
        else {
            return Ok(ConnectorResult::missing(
                "http_json_field requires 'url' and 'json_path' params",
            ));
        };

        let response = self
            .client
            .get(url)
            .timeout(http_timeout(params))
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("GET {url} failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(ConnectorResult::missing(format!(
                "GET {url} -> HTTP {status} (expected 200)"
            ))
            .with_raw(json!({ "status_code": status })));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError(format!("response from {url} is not JSON: {e}")))?;

        let Some(node) = docpath::get_path(&body, json_path) else {
            return Ok(ConnectorResult::missing(format!(
                "field '{json_path}' not found in JSON response from {url}"
            ))
            .with_raw(body));
        };

        let found = display_string(node);

        if let Some(expected) = params.get("expected") {
            let expected_str = display_string(expected);
            let matches = found == expected_str;
            let verdict = if matches {
                "matches".to_string()
            } else {
                format!("does not match expected '{expected_str}'")
            };
            return Ok(ConnectorResult {
                exists: matches,
                detail: format!("field '{json_path}' = '{found}' {verdict}"),
                latency_ms: 0,
                infra_failure: false,
                raw: Some(json!({ "field": json_path, "found": found, "expected": expected_str })),
            });
        }

        Ok(ConnectorResult::found(format!("field '{json_path}' = '{found}'"))
            .with_raw(json!({ "field": json_path, "found": found })))
    }
}

/// Fetches a canonical value from `params.url` at `params.json_path` and
/// passes when the claimed value is within `params.tolerance` of it.
///
/// Both the claimed and canonical values may be plain numbers or `HH:MM`
/// clock strings (compared in minutes since midnight).  A trailing
/// parenthesized suffix on the canonical value (e.g. a timezone annotation)
/// is stripped before parsing.
pub struct HttpNumericTolerance {
    client: reqwest::Client,
}

impl HttpNumericTolerance {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpNumericTolerance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for HttpNumericTolerance {
    async fn call(
        &self,
        value: &Value,
        params: &Map<String, Value>,
    ) -> Result<ConnectorResult, CollaboratorError> {
        let (Some(url), Some(json_path)) = (param_str(params, "url"), param_str(params, "json_path"))
        else {
            return Ok(ConnectorResult::missing(
                "http_numeric_tolerance requires 'url' and 'json_path' params",
            ));
        };
        let tolerance = params
            .get("tolerance")
            .and_then(Value::as_f64)
            .unwrap_or(15.0);

        let Some(claimed) = parse_magnitude(&display_string(value)) else {
            return Ok(ConnectorResult::missing(format!(
                "could not parse claimed value '{}' as a number or HH:MM time",
                display_string(value)
            )));
        };

        let response = self
            .client
            .get(url)
            .timeout(http_timeout(params))
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("GET {url} failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(ConnectorResult::missing(format!(
                "GET {url} -> HTTP {status} (expected 200)"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError(format!("response from {url} is not JSON: {e}")))?;

        let Some(node) = docpath::get_path(&body, json_path) else {
            return Ok(ConnectorResult::missing(format!(
                "canonical field '{json_path}' not found in response from {url}"
            ))
            .with_raw(body));
        };

        let canonical_raw = display_string(node);
        let canonical_clean = strip_parenthetical(&canonical_raw);
        let Some(canonical) = parse_magnitude(&canonical_clean) else {
            return Ok(ConnectorResult::missing(format!(
                "could not parse canonical value '{canonical_raw}' as a number or HH:MM time"
            )));
        };

        let diff = (claimed - canonical).abs();
        let within = diff <= tolerance;
        Ok(ConnectorResult {
            exists: within,
            detail: format!(
                "claimed {claimed} vs canonical {canonical} — deviation {diff} {} tolerance {tolerance}",
                if within { "within" } else { "exceeds" }
            ),
            latency_ms: 0,
            infra_failure: false,
            raw: Some(json!({
                "claimed": claimed,
                "canonical": canonical,
                "deviation": diff,
                "tolerance": tolerance,
            })),
        })
    }
}

/// String form used for comparisons: bare strings are unquoted, everything
/// else renders as compact JSON.
fn display_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.trim().to_string(),
        None => value.to_string(),
    }
}

/// Parse a magnitude: a plain float, or an `HH:MM` clock time as minutes
/// since midnight.
pub(crate) fn parse_magnitude(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(n) = s.parse::<f64>() {
        return Some(n);
    }
    parse_hhmm(s).map(|m| m as f64)
}

/// Minutes since midnight for strings starting with `HH:MM`, else `None`.
pub(crate) fn parse_hhmm(s: &str) -> Option<u32> {
    let mut parts = s.trim().splitn(2, ':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;
    if rest.len() < 2 {
        return None;
    }
    let minutes: u32 = rest[..2].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Strip a trailing parenthesized suffix: `"05:10 (+06)"` → `"05:10"`.
fn strip_parenthetical(s: &str) -> String {
    match s.find('(') {
        Some(idx) => s[..idx].trim().to_string(),
        None => s.trim().to_string(),
    }
}

/// Register the three built-in connectors under their canonical names.
pub fn register_builtins(registry: &mut ConnectorRegistry) {
    registry.register("http_status_ok", Box::new(HttpStatusOk::new()));
    registry.register("http_json_field", Box::new(HttpJsonField::new()));
    registry.register("http_numeric_tolerance", Box::new(HttpNumericTolerance::new()));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
