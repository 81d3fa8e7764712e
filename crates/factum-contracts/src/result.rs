//! Validation results and the request context that shapes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rule::Severity;
use crate::violation::Violation;

/// Overall verdict for one validation request.
///
/// Derived purely from violation severities: `Failed` iff at least one
/// error, `Warning` iff no errors and at least one warning, else `Passed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Warning,
    Failed,
}

impl ValidationStatus {
    /// Derive the status from a violation list.
    pub fn from_violations(violations: &[Violation]) -> Self {
        if violations.iter().any(|v| v.severity == Severity::Error) {
            ValidationStatus::Failed
        } else if violations.iter().any(|v| v.severity == Severity::Warning) {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Passed
        }
    }
}

/// The complete result returned to the caller.  Created once per request,
/// immutable; persistence is an external collaborator's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// True iff no error-severity violations were found.
    pub is_valid: bool,
    /// All violations, in evaluation order.
    pub violations: Vec<Violation>,
    /// True iff at least one auto-correction was applied.
    pub auto_corrected: bool,
    /// The repaired document — present only when at least one fix landed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_output: Option<Value>,
    /// Human-readable descriptions of the fixes, in application order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections_applied: Vec<String>,
    /// Overall trust score in [0, 1], when confidence scoring ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Discrete band for `confidence_score`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<String>,
    /// Count of statistical anomalies found, when anomaly detection ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomalies_detected: Option<usize>,
    /// Unique id of this validation run (`val_` + 16 hex chars).
    pub validation_id: String,
    /// Wall-clock duration of the pipeline.
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Generate a fresh validation id: `val_` followed by the first 16 hex
/// characters of a v4 UUID.
pub fn new_validation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("val_{}", &hex[..16])
}

/// Caller-supplied request context.
///
/// The typed fields gate pipeline stages; everything else the caller sends
/// (e.g. the reference texts semantic rules read) lands in `extra` and is
/// looked up by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationContext {
    /// Attempt repair of error-severity violations.
    #[serde(default)]
    pub auto_correct: bool,
    /// Compute the confidence score (on by default).
    #[serde(default = "default_true")]
    pub calculate_confidence: bool,
    /// Run the statistical anomaly detector.
    #[serde(default)]
    pub detect_anomalies: bool,
    /// Additionally run the opportunistic pattern heuristics.
    #[serde(default)]
    pub auto_detect_anomalies: bool,
    /// Tenant whose history scopes statistics, ML models, and references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Rule-kind-specific extras (semantic context texts, etc.).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            auto_correct: false,
            calculate_confidence: true,
            detect_anomalies: false,
            auto_detect_anomalies: false,
            organization_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl ValidationContext {
    /// Look up an extra context value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::violation::ViolationKind;

    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation::new("r", ViolationKind::Constraint, "f", "m", severity)
    }

    /// Failed iff any error; warning iff warnings only; passed otherwise.
    #[test]
    fn status_derivation() {
        assert_eq!(ValidationStatus::from_violations(&[]), ValidationStatus::Passed);
        assert_eq!(
            ValidationStatus::from_violations(&[violation(Severity::Info)]),
            ValidationStatus::Passed
        );
        assert_eq!(
            ValidationStatus::from_violations(&[violation(Severity::Warning)]),
            ValidationStatus::Warning
        );
        assert_eq!(
            ValidationStatus::from_violations(&[
                violation(Severity::Warning),
                violation(Severity::Error)
            ]),
            ValidationStatus::Failed
        );
    }

    /// Validation ids carry the fixed prefix and 16 hex characters, and are
    /// unique across calls.
    #[test]
    fn validation_id_shape() {
        let id = new_validation_id();
        assert!(id.starts_with("val_"));
        assert_eq!(id.len(), 20);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_validation_id());
    }

    /// Context deserialization: unknown keys land in `extra`,
    /// calculate_confidence defaults on.
    #[test]
    fn context_flattening() {
        let ctx: ValidationContext = serde_json::from_value(json!({
            "auto_correct": true,
            "organization_id": "org-1",
            "patient_history": "diabetic, on metformin"
        }))
        .unwrap();

        assert!(ctx.auto_correct);
        assert!(ctx.calculate_confidence);
        assert_eq!(ctx.organization_id.as_deref(), Some("org-1"));
        assert_eq!(
            ctx.get("patient_history"),
            Some(&json!("diabetic, on metformin"))
        );
        assert!(ctx.get("missing").is_none());
    }
}
