//! Opportunistic pattern heuristics over numeric fields.
//!
//! These checks need no history: a value is suspicious if it is an exact
//! power of ten, in the configured "round number" set, in the configured
//! "placeholder value" set, or — for fields named like percentages —
//! outside [0, 100].  Each heuristic fires independently per flattened
//! numeric field and produces its own `statistical`-kind violation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use factum_contracts::value::numeric_fields;
use factum_contracts::{CorrectionHint, Severity, Violation, ViolationKind};

/// The constant sets the heuristics match against.
///
/// Deployments can override the default sets
/// through engine configuration without touching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Suspiciously round magnitudes beyond the power-of-ten check.
    #[serde(default = "default_round_numbers")]
    pub round_numbers: Vec<f64>,
    /// Common placeholder values models emit when they have no real answer.
    #[serde(default = "default_placeholder_values")]
    pub placeholder_values: Vec<f64>,
}

fn default_round_numbers() -> Vec<f64> {
    vec![100.0, 1_000.0, 10_000.0, 100_000.0]
}

fn default_placeholder_values() -> Vec<f64> {
    vec![0.0, 1.0, -1.0, 999.0, 9_999.0]
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            round_numbers: default_round_numbers(),
            placeholder_values: default_placeholder_values(),
        }
    }
}

/// Runs the pattern heuristics over a document's numeric fields.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Detect suspicious patterns across every numeric field of `document`.
    pub fn detect(&self, document: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (field, value) in numeric_fields(document) {
            if self.is_suspicious_round(value) {
                violations.push(
                    Violation::new(
                        "auto_pattern_round_number",
                        ViolationKind::Statistical,
                        &field,
                        format!(
                            "{field} has a suspiciously round value ({value}), a possible hallucination"
                        ),
                        Severity::Warning,
                    )
                    .with_value(Value::from(value))
                    .with_suggestion("Verify this value is accurate and not a placeholder"),
                );
            }

            if self.config.placeholder_values.contains(&value) {
                violations.push(
                    Violation::new(
                        "auto_pattern_placeholder",
                        ViolationKind::Statistical,
                        &field,
                        format!("{field} contains a common placeholder value ({value})"),
                        Severity::Warning,
                    )
                    .with_value(Value::from(value))
                    .with_suggestion("Verify this is a real value and not a placeholder"),
                );
            }

            let lower = field.to_lowercase();
            if (lower.contains("percent") || lower.contains("rate"))
                && !(0.0..=100.0).contains(&value)
            {
                violations.push(
                    Violation::new(
                        "auto_pattern_invalid_percentage",
                        ViolationKind::Statistical,
                        &field,
                        format!("{field} has an invalid percentage value ({value}%)"),
                        Severity::Error,
                    )
                    .with_value(Value::from(value))
                    .with_hint(CorrectionHint::Range {
                        min: Some(0.0),
                        max: Some(100.0),
                    })
                    .with_suggestion("Percentages should be between 0 and 100"),
                );
            }
        }

        violations
    }

    /// True for exact powers of ten and for members of the round-number set.
    fn is_suspicious_round(&self, value: f64) -> bool {
        if self.config.round_numbers.contains(&value) {
            return true;
        }
        value > 0.0 && value == 10f64.powi(value.log10().floor() as i32)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
