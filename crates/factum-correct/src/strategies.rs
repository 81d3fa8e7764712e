//! The correction strategies, in their fixed priority order.
//!
//! Each strategy declares whether it applies to a violation (`can_fix`) and
//! attempts the repair in place (`apply`).  `apply` returning `None` means
//! "could not fix" — the chain moves on to the next strategy without
//! aborting anything.

use regex::Regex;
use serde_json::{json, Value};

use factum_contracts::value::{as_number, get_path, set_path};
use factum_contracts::{CorrectionHint, Violation, ViolationKind};

/// One repair capability in the chain.
pub trait CorrectionStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy knows how to repair `violation`.
    fn can_fix(&self, violation: &Violation) -> bool;

    /// Attempt the repair on `document` in place.  Returns a human-readable
    /// description of the fix, or `None` when the repair was not possible.
    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String>;
}

// ── RangeClamp ────────────────────────────────────────────────────────────────

/// Clamps numeric values into the violated range.
///
/// Applies when the violation carries a `Range` hint, or when its message
/// spells out "between X and Y" (legacy evaluators).
pub struct RangeClamp {
    between: Regex,
}

impl RangeClamp {
    pub fn new() -> Self {
        Self {
            between: Regex::new(r"(?i)between\s+(-?\d+\.?\d*)\s+and\s+(-?\d+\.?\d*)")
                .expect("static regex"),
        }
    }

    fn bounds(&self, violation: &Violation) -> Option<(Option<f64>, Option<f64>)> {
        if let CorrectionHint::Range { min, max } = &violation.hint {
            if min.is_some() || max.is_some() {
                return Some((*min, *max));
            }
        }
        let captures = self.between.captures(&violation.message)?;
        let min = captures[1].parse::<f64>().ok()?;
        let max = captures[2].parse::<f64>().ok()?;
        Some((Some(min), Some(max)))
    }
}

impl Default for RangeClamp {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionStrategy for RangeClamp {
    fn name(&self) -> &'static str {
        "range_clamp"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        self.bounds(violation).is_some()
    }

    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String> {
        let (min, max) = self.bounds(violation)?;
        let current = as_number(get_path(document, &violation.field)?)?;

        let mut clamped = current;
        if let Some(min) = min {
            clamped = clamped.max(min);
        }
        if let Some(max) = max {
            clamped = clamped.min(max);
        }
        if clamped == current {
            return None;
        }

        set_path(document, &violation.field, number_value(clamped));
        Some(format!(
            "Clamped {} from {} to {} (range: {}-{})",
            violation.field,
            current,
            clamped,
            min.map_or("open".to_string(), |m| m.to_string()),
            max.map_or("open".to_string(), |m| m.to_string()),
        ))
    }
}

// ── TypeCoerce ────────────────────────────────────────────────────────────────

/// Converts values to the primitive type a schema violation expected.
///
/// The target type is inferred from the violation message text, the way
/// JSON Schema validators phrase it (`"30" is not of type "number"`).
pub struct TypeCoerce;

impl TypeCoerce {
    fn expected_type(message: &str) -> Option<&'static str> {
        let lower = message.to_lowercase();
        if lower.contains("integer") || lower.contains("int") {
            Some("integer")
        } else if lower.contains("number") || lower.contains("float") {
            Some("number")
        } else if lower.contains("string") || lower.contains("str") {
            Some("string")
        } else if lower.contains("boolean") || lower.contains("bool") {
            Some("boolean")
        } else if lower.contains("array") || lower.contains("list") {
            Some("array")
        } else if lower.contains("object") || lower.contains("dict") {
            Some("object")
        } else {
            None
        }
    }

    fn coerce(value: &Value, target: &str) -> Option<Value> {
        match target {
            // Handle "123.0" -> 123 via the float path.
            "integer" => Some(json!(as_number(value)?.trunc() as i64)),
            "number" => Some(number_value(as_number(value)?)),
            "string" => Some(json!(match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            })),
            "boolean" => Some(json!(match value {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                _ => return None,
            })),
            "array" => Some(match value {
                Value::Array(_) => value.clone(),
                other => json!([other.clone()]),
            }),
            "object" => Some(match value {
                Value::Object(_) => value.clone(),
                other => json!({ "value": other.clone() }),
            }),
            _ => None,
        }
    }
}

impl CorrectionStrategy for TypeCoerce {
    fn name(&self) -> &'static str {
        "type_coerce"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        violation.kind == ViolationKind::Schema
            && violation.message.to_lowercase().contains("type")
    }

    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String> {
        let target = Self::expected_type(&violation.message)?;
        let current = get_path(document, &violation.field)?.clone();
        let coerced = Self::coerce(&current, target)?;
        if coerced == current {
            return None;
        }

        set_path(document, &violation.field, coerced);
        Some(format!("Coerced {} to {}", violation.field, target))
    }
}

// ── StringTrim ────────────────────────────────────────────────────────────────

/// Strips leading and trailing whitespace when the violation mentions it.
pub struct StringTrim;

impl CorrectionStrategy for StringTrim {
    fn name(&self) -> &'static str {
        "string_trim"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        let lower = violation.message.to_lowercase();
        lower.contains("whitespace") || lower.contains("trim")
    }

    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String> {
        let current = get_path(document, &violation.field)?.as_str()?.to_string();
        let trimmed = current.trim().to_string();
        if trimmed == current {
            return None;
        }

        set_path(document, &violation.field, json!(trimmed));
        Some(format!("Trimmed whitespace from {}", violation.field))
    }
}

// ── FuzzyMatch ────────────────────────────────────────────────────────────────

/// Substitutes the closest valid option for an out-of-set value.
///
/// Similarity is normalized Levenshtein distance; the substitution happens
/// only when the best option clears the acceptance threshold, otherwise the
/// violation is left unfixed.
pub struct FuzzyMatch {
    threshold: f64,
}

impl FuzzyMatch {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for FuzzyMatch {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl CorrectionStrategy for FuzzyMatch {
    fn name(&self) -> &'static str {
        "fuzzy_match"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        matches!(&violation.hint, CorrectionHint::Options { valid } if !valid.is_empty())
    }

    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String> {
        let CorrectionHint::Options { valid } = &violation.hint else {
            return None;
        };
        let found = get_path(document, &violation.field)?.as_str()?.to_string();

        let (best, score) = valid
            .iter()
            .map(|option| (option, similarity(&found, option)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        if score < self.threshold {
            return None;
        }

        set_path(document, &violation.field, json!(best));
        Some(format!(
            "Replaced {} value '{}' with closest valid option '{}' (similarity {:.2})",
            violation.field, found, best, score
        ))
    }
}

// ── DefaultValue ──────────────────────────────────────────────────────────────

/// Fills a missing or null field with the rule-supplied default.
pub struct DefaultValue;

impl CorrectionStrategy for DefaultValue {
    fn name(&self) -> &'static str {
        "default_value"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        matches!(&violation.hint, CorrectionHint::Default { .. })
    }

    fn apply(&self, document: &mut Value, violation: &Violation) -> Option<String> {
        let CorrectionHint::Default { value } = &violation.hint else {
            return None;
        };

        set_path(document, &violation.field, value.clone());
        Some(format!(
            "Filled missing {} with default value '{}'",
            violation.field,
            match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            }
        ))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Render an integral float as a JSON integer so repaired documents compare
/// cleanly with hand-written expectations.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Normalized Levenshtein similarity in [0, 1].
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate().take(m + 1) {
        row[0] = i;
    }
    for (j, val) in dp[0].iter_mut().enumerate().take(n + 1) {
        *val = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
