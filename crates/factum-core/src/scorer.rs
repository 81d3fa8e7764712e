//! The confidence scorer: one calibrated trust number per validation.
//!
//! Five independent sub-scores, each in [0, 1], are blended by fixed
//! weights into `overall_confidence`:
//!
//! | factor              | weight | formula                                  |
//! |---------------------|--------|------------------------------------------|
//! | violation count     | 0.30   | `e^(-violations / 3)`                    |
//! | severity            | 0.25   | `1 - sum(weight) / violations`           |
//! | auto-correction     | 0.15   | `1 - min(0.1 * corrections, 0.5)`        |
//! | statistical         | 0.20   | caller-supplied, default 1.0             |
//! | reference           | 0.10   | 0 when any reference violation, else 1   |
//!
//! An empty violation list scores exactly 1.0.

use serde::{Deserialize, Serialize};

use factum_contracts::{Severity, Violation, ViolationKind};

const WEIGHT_VIOLATION_COUNT: f64 = 0.30;
const WEIGHT_SEVERITY: f64 = 0.25;
const WEIGHT_AUTO_CORRECTION: f64 = 0.15;
const WEIGHT_STATISTICAL: f64 = 0.20;
const WEIGHT_REFERENCE: f64 = 0.10;

/// The factors contributing to an overall confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    /// Fewer violations score higher.
    pub violation_count: f64,
    /// Lower aggregate severity scores higher.
    pub severity_score: f64,
    /// Penalty accrued by auto-corrections (0 = none).
    pub auto_correction_penalty: f64,
    /// Caller-supplied statistical confidence (1.0 when not computed).
    pub statistical_confidence: f64,
    /// 0 when any reference violation was found, else 1.
    pub reference_confidence: f64,
    /// The weighted blend, clamped to [0, 1].
    pub overall_confidence: f64,
}

/// Discrete confidence bands with fixed reviewer guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    /// Band for a confidence score.
    pub fn from_score(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::VeryHigh
        } else if confidence >= 0.75 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else if confidence >= 0.25 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    /// Wire-format name (`"very_high"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "very_high",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::VeryLow => "very_low",
        }
    }

    /// The fixed human-readable recommendation for this band.
    pub fn recommendation(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "Output appears highly reliable. Safe to use.",
            ConfidenceLevel::High => "Output is likely valid. Minor review recommended.",
            ConfidenceLevel::Medium => "Output has some concerns. Review recommended before use.",
            ConfidenceLevel::Low => "Output has significant issues. Manual review required.",
            ConfidenceLevel::VeryLow => {
                "Output is unreliable. Do not use without thorough validation."
            }
        }
    }
}

/// Computes confidence factors for validation results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Blend the five factors for one validation outcome.
    ///
    /// `statistical_score` is the caller-supplied statistical confidence
    /// (absent means 1.0); `has_reference_violations` zeroes the reference
    /// factor.
    pub fn calculate(
        &self,
        violations: &[Violation],
        corrections_applied: usize,
        statistical_score: Option<f64>,
        has_reference_violations: bool,
    ) -> ConfidenceFactors {
        let violation_count = Self::violation_score(violations);
        let severity_score = Self::severity_score(violations);
        let auto_correction_penalty = Self::correction_penalty(corrections_applied);
        let statistical_confidence = statistical_score.unwrap_or(1.0);
        let reference_confidence = if has_reference_violations { 0.0 } else { 1.0 };

        let overall = violation_count * WEIGHT_VIOLATION_COUNT
            + severity_score * WEIGHT_SEVERITY
            + (1.0 - auto_correction_penalty) * WEIGHT_AUTO_CORRECTION
            + statistical_confidence * WEIGHT_STATISTICAL
            + reference_confidence * WEIGHT_REFERENCE;

        ConfidenceFactors {
            violation_count,
            severity_score,
            auto_correction_penalty,
            statistical_confidence,
            reference_confidence,
            overall_confidence: overall.clamp(0.0, 1.0),
        }
    }

    /// Statistical confidence from an outlier scan: `e^(-2 * ratio)` of
    /// flagged fields.
    pub fn statistical_confidence(&self, outlier_count: usize, total_fields: usize) -> f64 {
        if total_fields == 0 || outlier_count == 0 {
            return 1.0;
        }
        let ratio = outlier_count as f64 / total_fields as f64;
        (-2.0 * ratio).exp()
    }

    /// Confidence contribution of detected anomaly patterns:
    /// `e^(-0.3 * patterns)`.
    pub fn pattern_confidence(&self, patterns_detected: usize) -> f64 {
        if patterns_detected == 0 {
            return 1.0;
        }
        (-0.3 * patterns_detected as f64).exp()
    }

    /// Exponential decay in the violation count: 0 violations is 1.0,
    /// 3 violations is about 0.37.
    fn violation_score(violations: &[Violation]) -> f64 {
        if violations.is_empty() {
            return 1.0;
        }
        (-(violations.len() as f64) / 3.0).exp()
    }

    /// One minus the mean severity weight (error 1.0, warning 0.5,
    /// info 0.1).
    fn severity_score(violations: &[Violation]) -> f64 {
        if violations.is_empty() {
            return 1.0;
        }
        let total: f64 = violations
            .iter()
            .map(|v| match v.severity {
                Severity::Error => 1.0,
                Severity::Warning => 0.5,
                Severity::Info => 0.1,
            })
            .sum();
        let max = violations.len() as f64;
        1.0 - (total / max).min(1.0)
    }

    /// 0.1 per applied correction, capped at 0.5.
    fn correction_penalty(corrections_applied: usize) -> f64 {
        (0.1 * corrections_applied as f64).min(0.5)
    }

    /// True when any violation came from a reference check.
    pub fn has_reference_violations(violations: &[Violation]) -> bool {
        violations.iter().any(|v| v.kind == ViolationKind::Reference)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
