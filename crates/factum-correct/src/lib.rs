//! # factum-correct
//!
//! Deterministic best-effort repair of error-level validation violations.
//!
//! The [`AutoCorrector`] walks the violations in order and, for each
//! error-severity one, tries its strategies in a fixed priority order —
//! range clamping, type coercion, whitespace trimming, fuzzy option
//! matching, default filling.  The first applicable strategy is applied and
//! the chain moves to the next violation: at most one fix per violation.
//! Strategy failures mean "could not fix", never an abort.
//!
//! Correction runs strictly after all violations are collected and is not
//! parallelized: each fix reads the document state left by the previous
//! one.

pub mod strategies;

use serde_json::Value;
use tracing::{debug, warn};

use factum_contracts::{Severity, ValidationContext, Violation};

pub use strategies::{
    CorrectionStrategy, DefaultValue, FuzzyMatch, RangeClamp, StringTrim, TypeCoerce,
};

/// The auto-correction strategy chain.
pub struct AutoCorrector {
    strategies: Vec<Box<dyn CorrectionStrategy>>,
}

impl Default for AutoCorrector {
    /// The standard chain in its fixed priority order.
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(RangeClamp::new()),
                Box::new(TypeCoerce),
                Box::new(StringTrim),
                Box::new(FuzzyMatch::default()),
                Box::new(DefaultValue),
            ],
        }
    }
}

impl AutoCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain with a custom fuzzy-match acceptance threshold.
    pub fn with_fuzzy_threshold(threshold: f64) -> Self {
        Self {
            strategies: vec![
                Box::new(RangeClamp::new()),
                Box::new(TypeCoerce),
                Box::new(StringTrim),
                Box::new(FuzzyMatch::new(threshold)),
                Box::new(DefaultValue),
            ],
        }
    }

    /// Append a custom strategy after the standard chain.
    pub fn add_strategy(&mut self, strategy: Box<dyn CorrectionStrategy>) {
        self.strategies.push(strategy);
    }

    /// Attempt to repair `document` given the collected `violations`.
    ///
    /// No-op unless `context.auto_correct` is set.  Only error-severity
    /// violations are attempted.  The corrected document is returned only
    /// when at least one fix actually succeeded; otherwise `None` even if
    /// correction was requested.
    pub fn fix(
        &self,
        document: &Value,
        violations: &[Violation],
        context: &ValidationContext,
    ) -> (Option<Value>, Vec<String>) {
        if !context.auto_correct {
            return (None, Vec::new());
        }

        let mut working = document.clone();
        let mut fixes: Vec<String> = Vec::new();

        for violation in violations {
            if violation.severity != Severity::Error {
                continue;
            }

            for strategy in &self.strategies {
                if !strategy.can_fix(violation) {
                    continue;
                }
                match strategy.apply(&mut working, violation) {
                    Some(description) => {
                        debug!(
                            strategy = strategy.name(),
                            field = %violation.field,
                            "violation auto-corrected"
                        );
                        fixes.push(description);
                        break;
                    }
                    None => {
                        warn!(
                            strategy = strategy.name(),
                            field = %violation.field,
                            "strategy matched but could not fix; trying next"
                        );
                    }
                }
            }
        }

        if fixes.is_empty() {
            (None, fixes)
        } else {
            (Some(working), fixes)
        }
    }

    /// Whether at least one error-severity violation has an applicable
    /// strategy.
    pub fn can_auto_correct(&self, violations: &[Violation]) -> bool {
        violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
            .any(|v| self.strategies.iter().any(|s| s.can_fix(v)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
