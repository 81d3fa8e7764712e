//! Rule definitions: the closed set of validation rule kinds.
//!
//! Rules arrive as untyped JSON specs (`{"type": "range", "field": "hours",
//! "min": 0, "max": 24}`) and are parsed into the `RuleKind` sum type so the
//! engine can dispatch exhaustively at compile time.  Two parse outcomes are
//! deliberately not errors:
//!
//! - an **unknown** `type` string parses to `Ok(None)` — forward
//!   compatibility; the engine logs and skips it;
//! - a **known** `type` with invalid parameters is an `Err` that the engine
//!   converts into exactly one `warning` violation instead of aborting the
//!   request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How serious a violation of this rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Invalidates the output; the only severity auto-correction attempts.
    #[default]
    Error,
    /// Degraded or suspicious, but the output remains usable.
    Warning,
    /// Advisory only.
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Which outlier test an `anomaly` rule runs against the historical baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    #[default]
    Zscore,
    Iqr,
    Both,
}

/// A single parsed validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier referenced by violations. Synthesized from the
    /// field and kind when the spec omits it.
    pub name: String,
    /// Severity a genuine failure of this rule is reported at.
    #[serde(default)]
    pub severity: Severity,
    /// The check to run, with its kind-specific parameters.
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// The closed set of rule kinds FACTUM evaluates.
///
/// Adding a kind means adding a variant here and an evaluator arm in the
/// rule engine — the compiler enforces the pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Validate the whole document against a JSON Schema document.
    Schema {
        /// The JSON Schema to compile and apply.
        schema: Value,
    },

    /// The numeric value at `field` must lie in `[min, max]` (either bound
    /// may be open).
    Range {
        field: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },

    /// The string value at `field` must match `pattern` from the start.
    Pattern {
        field: String,
        pattern: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        suggestion: Option<String>,
    },

    /// A boolean predicate over the single bound name `value`, evaluated by
    /// the restricted expression evaluator.
    Constraint {
        field: String,
        expression: String,
        #[serde(default)]
        message: Option<String>,
    },

    /// The value at `field` must equal one of `valid_options`.
    #[serde(rename = "enum")]
    Enumeration {
        field: String,
        valid_options: Vec<String>,
    },

    /// The field must be present and non-null; `default_value` enables
    /// auto-correction.
    Required {
        field: String,
        #[serde(default)]
        default_value: Option<Value>,
    },

    /// The value must exist as `table.column` per the reference-lookup
    /// collaborator, optionally scoped to the requesting tenant.
    Reference {
        field: String,
        table: String,
        column: String,
        #[serde(default, alias = "custom_message")]
        message: Option<String>,
    },

    /// The value is checked by a named connector from the registry.
    ExternalRef {
        field: String,
        connector: String,
        #[serde(default)]
        params: serde_json::Map<String, Value>,
        /// Per-call timeout in seconds; the engine default applies when absent.
        #[serde(default)]
        timeout: Option<f64>,
    },

    /// Embedding alignment between an output field and a context field.
    Semantic {
        output_field: String,
        context_field: String,
        #[serde(default = "default_min_alignment")]
        min_alignment: f64,
    },

    /// Search-grounded fact check of the text at `field`.
    WebVerify {
        field: String,
        #[serde(default = "default_confidence_threshold")]
        confidence_threshold: f64,
        #[serde(default = "default_search_depth")]
        search_depth: String,
        #[serde(default = "default_max_results")]
        max_results: usize,
    },

    /// Statistical outlier test of `field` against the tenant's historical
    /// baseline.
    #[serde(rename = "anomaly")]
    AnomalyStat {
        field: String,
        #[serde(default)]
        method: OutlierMethod,
        /// Custom z-score threshold / IQR multiplier; detector defaults apply
        /// when absent.
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default = "default_history_days")]
        history_days: u32,
    },

    /// Score the document against the tenant's trained isolation-ensemble
    /// model over the listed numeric fields.
    AnomalyMl {
        fields: Vec<String>,
        #[serde(default)]
        org_id: Option<String>,
        #[serde(default)]
        min_samples: Option<usize>,
    },
}

fn default_min_alignment() -> f64 {
    0.5
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_search_depth() -> String {
    "basic".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_history_days() -> u32 {
    30
}

impl RuleKind {
    /// The canonical kind string, matching the wire `type` discriminant.
    pub fn kind_str(&self) -> &'static str {
        match self {
            RuleKind::Schema { .. } => "schema",
            RuleKind::Range { .. } => "range",
            RuleKind::Pattern { .. } => "pattern",
            RuleKind::Constraint { .. } => "constraint",
            RuleKind::Enumeration { .. } => "enum",
            RuleKind::Required { .. } => "required",
            RuleKind::Reference { .. } => "reference",
            RuleKind::ExternalRef { .. } => "external_ref",
            RuleKind::Semantic { .. } => "semantic",
            RuleKind::WebVerify { .. } => "web_verify",
            RuleKind::AnomalyStat { .. } => "anomaly",
            RuleKind::AnomalyMl { .. } => "anomaly_ml",
        }
    }

    /// The target field path this rule reads, where it has a single one.
    pub fn field(&self) -> Option<&str> {
        match self {
            RuleKind::Schema { .. } | RuleKind::AnomalyMl { .. } => None,
            RuleKind::Range { field, .. }
            | RuleKind::Pattern { field, .. }
            | RuleKind::Constraint { field, .. }
            | RuleKind::Enumeration { field, .. }
            | RuleKind::Required { field, .. }
            | RuleKind::Reference { field, .. }
            | RuleKind::ExternalRef { field, .. }
            | RuleKind::WebVerify { field, .. }
            | RuleKind::AnomalyStat { field, .. } => Some(field),
            RuleKind::Semantic { output_field, .. } => Some(output_field),
        }
    }
}

/// A known rule kind whose parameters failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rule '{name}' failed to parse: {reason}")]
pub struct RuleParseError {
    /// The spec's `name`, or `"unnamed"` when the spec had none.
    pub name: String,
    pub reason: String,
}

/// The `type` strings `from_spec` recognizes.
const KNOWN_KINDS: &[&str] = &[
    "schema",
    "range",
    "pattern",
    "constraint",
    "enum",
    "required",
    "reference",
    "external_ref",
    "semantic",
    "web_verify",
    "anomaly",
    "anomaly_ml",
];

#[derive(Deserialize)]
struct RawRule {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    severity: Severity,
    #[serde(flatten)]
    kind: RuleKind,
}

impl Rule {
    /// Parse an untyped JSON rule spec.
    ///
    /// Returns `Ok(None)` for unknown `type` strings (deliberate skip),
    /// `Err` when a known kind has unusable parameters, and `Ok(Some)` for a
    /// fully parsed rule.  A spec with no `name` gets one synthesized from
    /// its field and kind (e.g. `"hours_range_check"`).
    pub fn from_spec(spec: &Value) -> Result<Option<Rule>, RuleParseError> {
        let name_hint = spec
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();

        let Some(kind_str) = spec.get("type").and_then(Value::as_str) else {
            return Err(RuleParseError {
                name: name_hint,
                reason: "rule is missing a 'type' discriminant".to_string(),
            });
        };

        if !KNOWN_KINDS.contains(&kind_str) {
            return Ok(None);
        }

        let raw: RawRule =
            serde_json::from_value(spec.clone()).map_err(|e| RuleParseError {
                name: name_hint,
                reason: e.to_string(),
            })?;

        let name = raw.name.unwrap_or_else(|| match raw.kind.field() {
            Some(field) => format!("{}_{}_check", field, raw.kind.kind_str()),
            None => format!("{}_check", raw.kind.kind_str()),
        });

        Ok(Some(Rule {
            name,
            severity: raw.severity,
            kind: raw.kind,
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
