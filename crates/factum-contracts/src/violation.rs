//! Violation reporting types.
//!
//! Every failed check produces one `Violation` carrying enough context —
//! field, found value, correction hint — for the caller to render an
//! actionable message without consulting logs.  Violations are created
//! fresh per evaluation and never mutated afterward.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rule::Severity;

/// The family a violation belongs to, mirroring the rule-kind families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Schema,
    Constraint,
    Reference,
    Statistical,
    Semantic,
}

/// A machine-usable repair hint attached to a violation.
///
/// The variant tells the auto-corrector exactly which strategy applies, so
/// strategies match exhaustively instead of probing an untyped payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionHint {
    /// Clamp into `[min, max]` (either bound may be open).
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Substitute the closest of these options.
    Options { valid: Vec<String> },
    /// Fill the absent/null field with this value.
    Default { value: Value },
    /// Free-text description of what was expected; not auto-correctable.
    Text { detail: String },
    /// No hint available.
    #[default]
    None,
}

impl CorrectionHint {
    /// Shorthand for the free-text variant.
    pub fn text(detail: impl Into<String>) -> Self {
        CorrectionHint::Text {
            detail: detail.into(),
        }
    }
}

/// One reported failure of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// The `name` of the rule that produced this violation.
    pub rule_name: String,
    /// Which family of check failed.
    pub kind: ViolationKind,
    /// Dot-path of the offending field (`"unknown"` when not attributable).
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
    /// How serious this violation is.
    pub severity: Severity,
    /// The value actually found, when one was resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_value: Option<Value>,
    /// Repair hint consumed by the auto-corrector.
    #[serde(default, skip_serializing_if = "CorrectionHint::is_none")]
    pub hint: CorrectionHint,
    /// Optional advice for a human reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CorrectionHint {
    fn is_none(&self) -> bool {
        matches!(self, CorrectionHint::None)
    }
}

impl Violation {
    /// Create a violation with no found value, hint, or suggestion.
    pub fn new(
        rule_name: impl Into<String>,
        kind: ViolationKind,
        field: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            kind,
            field: field.into(),
            message: message.into(),
            severity,
            found_value: None,
            hint: CorrectionHint::None,
            suggestion: None,
        }
    }

    /// Attach the value that was actually found.
    pub fn with_value(mut self, value: Value) -> Self {
        self.found_value = Some(value);
        self
    }

    /// Attach a correction hint.
    pub fn with_hint(mut self, hint: CorrectionHint) -> Self {
        self.hint = hint;
        self
    }

    /// Attach reviewer advice.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// The builder attaches value, hint, and suggestion without touching the
    /// other fields.
    #[test]
    fn builder_composes() {
        let v = Violation::new(
            "hours_check",
            ViolationKind::Constraint,
            "hours",
            "hours must be between 0 and 24",
            Severity::Error,
        )
        .with_value(json!(30))
        .with_hint(CorrectionHint::Range {
            min: Some(0.0),
            max: Some(24.0),
        })
        .with_suggestion("clamp to the working-day range");

        assert_eq!(v.found_value, Some(json!(30)));
        assert_eq!(
            v.hint,
            CorrectionHint::Range {
                min: Some(0.0),
                max: Some(24.0)
            }
        );
        assert!(v.suggestion.is_some());
    }

    /// Hints serialize as an explicit tagged object and absent hints are
    /// omitted from the wire form entirely.
    #[test]
    fn hint_serialization() {
        let with_hint = Violation::new(
            "school_check",
            ViolationKind::Constraint,
            "school",
            "not a valid option",
            Severity::Error,
        )
        .with_hint(CorrectionHint::Options {
            valid: vec!["Hanafi".to_string()],
        });
        let json = serde_json::to_value(&with_hint).unwrap();
        assert_eq!(json["hint"]["kind"], "options");

        let without = Violation::new(
            "x",
            ViolationKind::Schema,
            "x",
            "m",
            Severity::Warning,
        );
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("hint").is_none());
    }

    /// Violations round-trip through serde unchanged.
    #[test]
    fn violation_round_trip() {
        let v = Violation::new(
            "timezone_required",
            ViolationKind::Schema,
            "timezone",
            "field is missing",
            Severity::Error,
        )
        .with_hint(CorrectionHint::Default {
            value: json!("Asia/Dhaka"),
        });
        let json = serde_json::to_string(&v).unwrap();
        let decoded: Violation = serde_json::from_str(&json).unwrap();
        assert_eq!(v, decoded);
    }
}
