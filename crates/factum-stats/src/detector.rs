//! The classical anomaly pass: statistical rules plus opportunistic
//! pattern heuristics.
//!
//! `anomaly` rules test a field value against the tenant's historical
//! baseline using the z-score and/or IQR methods.  When the caller asks for
//! auto-detection, the pattern heuristics additionally sweep every numeric
//! field.  No history, no provider, or a non-numeric field value all mean
//! "nothing to check" — this pass degrades, it never fails.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use factum_contracts::traits::SampleHistory;
use factum_contracts::value::{as_number, get_path};
use factum_contracts::{
    CorrectionHint, OutlierMethod, Rule, RuleKind, Severity, ValidationContext, Violation,
    ViolationKind,
};

use crate::analyzer::{OutlierTest, OutlierVerdict, StatisticalAnalyzer, StatisticalMetrics};
use crate::patterns::PatternDetector;

/// A detected distribution-level pattern (currently only mean shift).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPattern {
    pub pattern_type: String,
    pub description: String,
    /// Confidence in [0, 1] that the shift is real.
    pub confidence: f64,
    pub severity: Severity,
    pub current_mean: f64,
    pub historical_mean: f64,
    pub shift_percentage: f64,
}

/// Runs `anomaly` rules and the pattern heuristics over one document.
pub struct AnomalyDetector {
    analyzer: StatisticalAnalyzer,
    patterns: PatternDetector,
}

impl AnomalyDetector {
    pub fn new(analyzer: StatisticalAnalyzer, patterns: PatternDetector) -> Self {
        Self { analyzer, patterns }
    }

    /// Evaluate every `anomaly` rule against the historical baseline, then
    /// (when `context.auto_detect_anomalies` is set) sweep the pattern
    /// heuristics.
    pub async fn detect(
        &self,
        document: &Value,
        rules: &[Rule],
        context: &ValidationContext,
        history: Option<&dyn SampleHistory>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        for rule in rules {
            let RuleKind::AnomalyStat {
                field,
                method,
                threshold,
                history_days,
            } = &rule.kind
            else {
                continue;
            };

            let Some(value) = get_path(document, field).and_then(as_number) else {
                continue;
            };

            let (Some(history), Some(org)) = (history, context.organization_id.as_deref()) else {
                debug!(rule = %rule.name, "no history provider or organization id; skipping anomaly rule");
                continue;
            };

            let Some(metrics) = self
                .analyzer
                .historical_metrics(history, org, field, *history_days)
                .await
            else {
                continue;
            };

            if matches!(method, OutlierMethod::Zscore | OutlierMethod::Both) {
                let verdict = self.analyzer.detect_outlier_zscore(
                    field,
                    value,
                    metrics.mean,
                    metrics.std_dev,
                    *threshold,
                );
                if verdict.is_outlier {
                    violations.push(anomaly_violation(rule, &verdict, &metrics));
                    continue;
                }
            }

            if matches!(method, OutlierMethod::Iqr | OutlierMethod::Both) {
                let verdict = self.analyzer.detect_outlier_iqr(
                    field,
                    value,
                    metrics.q1,
                    metrics.q3,
                    metrics.iqr,
                    *threshold,
                );
                if verdict.is_outlier {
                    violations.push(anomaly_violation(rule, &verdict, &metrics));
                }
            }
        }

        if context.auto_detect_anomalies {
            violations.extend(self.patterns.detect(document));
        }

        violations
    }

    /// Detect a significant relative shift between the means of two value
    /// windows.  Needs at least 5 current and 10 historical values.
    pub fn detect_distribution_shift(
        &self,
        current: &[f64],
        historical: &[f64],
        threshold: f64,
    ) -> Option<ShiftPattern> {
        if current.len() < 5 || historical.len() < 10 {
            return None;
        }

        let current_mean = current.iter().sum::<f64>() / current.len() as f64;
        let historical_mean = historical.iter().sum::<f64>() / historical.len() as f64;

        let shift = if historical_mean == 0.0 {
            current_mean.abs()
        } else {
            ((current_mean - historical_mean) / historical_mean).abs()
        };

        if shift <= threshold {
            return None;
        }

        warn!(shift_pct = shift * 100.0, "distribution shift detected");
        Some(ShiftPattern {
            pattern_type: "distribution_shift".to_string(),
            description: format!(
                "distribution shifted by {:.1}% from the historical baseline",
                shift * 100.0
            ),
            confidence: (shift / threshold).min(1.0),
            severity: if shift > threshold * 2.0 {
                Severity::Error
            } else {
                Severity::Warning
            },
            current_mean,
            historical_mean,
            shift_percentage: shift * 100.0,
        })
    }
}

/// Build the violation for a flagged outlier, carrying the baseline metrics
/// so the caller can render an actionable message.
fn anomaly_violation(
    rule: &Rule,
    verdict: &OutlierVerdict,
    metrics: &StatisticalMetrics,
) -> Violation {
    let message = match verdict.method {
        OutlierTest::Zscore => format!(
            "{} value ({}) is {:.2} standard deviations from the mean ({:.2})",
            verdict.field, verdict.value, verdict.score, metrics.mean
        ),
        OutlierTest::Iqr => format!(
            "{} value ({}) is an outlier (outside IQR range {:.2} to {:.2})",
            verdict.field, verdict.value, metrics.q1, metrics.q3
        ),
    };

    Violation::new(
        &rule.name,
        ViolationKind::Statistical,
        &verdict.field,
        message,
        verdict.severity,
    )
    .with_value(json!(verdict.value))
    .with_hint(CorrectionHint::text(format!(
        "baseline: mean {:.2}, median {:.2}, std_dev {:.2}, q1 {:.2}, q3 {:.2}",
        metrics.mean, metrics.median, metrics.std_dev, metrics.q1, metrics.q3
    )))
    .with_suggestion(format!(
        "Expected range: {:.2} to {:.2} (IQR method)",
        metrics.q1, metrics.q3
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use factum_contracts::CollaboratorError;

    use super::*;

    struct FixedHistory(Vec<f64>);

    #[async_trait]
    impl SampleHistory for FixedHistory {
        async fn numeric_values(
            &self,
            _organization_id: &str,
            _field: &str,
            _days: u32,
        ) -> Result<Vec<f64>, CollaboratorError> {
            Ok(self.0.clone())
        }
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(StatisticalAnalyzer::default(), PatternDetector::default())
    }

    fn anomaly_rule(method: OutlierMethod) -> Rule {
        Rule {
            name: "hours_anomaly".to_string(),
            severity: Severity::Warning,
            kind: RuleKind::AnomalyStat {
                field: "hours".to_string(),
                method,
                threshold: None,
                history_days: 30,
            },
        }
    }

    fn org_context() -> ValidationContext {
        ValidationContext {
            organization_id: Some("org-1".to_string()),
            detect_anomalies: true,
            ..ValidationContext::default()
        }
    }

    /// A value far outside the baseline produces one statistical violation
    /// with the baseline summary attached.
    #[tokio::test]
    async fn flags_zscore_outlier() {
        // Baseline roughly mean 8, modest spread.
        let history = FixedHistory((0..40).map(|i| 7.0 + (i % 5) as f64 * 0.5).collect());
        let violations = detector()
            .detect(
                &json!({ "hours": 30 }),
                &[anomaly_rule(OutlierMethod::Zscore)],
                &org_context(),
                Some(&history),
            )
            .await;

        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.kind, ViolationKind::Statistical);
        assert_eq!(v.severity, Severity::Error);
        assert!(v.message.contains("standard deviations"));
        assert!(v.suggestion.as_deref().unwrap().contains("IQR"));
    }

    /// A typical value produces nothing.
    #[tokio::test]
    async fn typical_value_passes() {
        let history = FixedHistory((0..40).map(|i| 7.0 + (i % 5) as f64 * 0.5).collect());
        let violations = detector()
            .detect(
                &json!({ "hours": 7.5 }),
                &[anomaly_rule(OutlierMethod::Both)],
                &org_context(),
                Some(&history),
            )
            .await;
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    /// With `Both`, a value flagged by z-score is reported once, not twice.
    #[tokio::test]
    async fn both_methods_report_once() {
        let history = FixedHistory((0..40).map(|i| 7.0 + (i % 5) as f64 * 0.5).collect());
        let violations = detector()
            .detect(
                &json!({ "hours": 30 }),
                &[anomaly_rule(OutlierMethod::Both)],
                &org_context(),
                Some(&history),
            )
            .await;
        assert_eq!(violations.len(), 1);
    }

    /// No provider, no organization, or insufficient history all mean the
    /// rule is skipped, not failed.
    #[tokio::test]
    async fn missing_prerequisites_skip() {
        let d = detector();
        let rules = [anomaly_rule(OutlierMethod::Zscore)];
        let doc = json!({ "hours": 30 });

        // No provider at all.
        assert!(d.detect(&doc, &rules, &org_context(), None).await.is_empty());

        // No organization id.
        let history = FixedHistory(vec![8.0; 40]);
        let ctx = ValidationContext::default();
        assert!(d.detect(&doc, &rules, &ctx, Some(&history)).await.is_empty());

        // Too little history for a baseline.
        let short = FixedHistory(vec![8.0; 3]);
        assert!(d
            .detect(&doc, &rules, &org_context(), Some(&short))
            .await
            .is_empty());
    }

    /// Auto-detection sweeps the pattern heuristics on top of the rules.
    #[tokio::test]
    async fn auto_detection_adds_patterns() {
        let ctx = ValidationContext {
            auto_detect_anomalies: true,
            ..org_context()
        };
        let violations = detector()
            .detect(&json!({ "total": 1000 }), &[], &ctx, None)
            .await;
        assert!(violations
            .iter()
            .any(|v| v.rule_name == "auto_pattern_round_number"));
    }

    /// Distribution shift: below threshold none, above threshold warning,
    /// past double error.
    #[test]
    fn distribution_shift_bands() {
        let d = detector();
        let historical = vec![100.0; 20];

        assert!(d
            .detect_distribution_shift(&[105.0; 10], &historical, 0.3)
            .is_none());

        let moderate = d
            .detect_distribution_shift(&[140.0; 10], &historical, 0.3)
            .unwrap();
        assert_eq!(moderate.severity, Severity::Warning);

        let severe = d
            .detect_distribution_shift(&[180.0; 10], &historical, 0.3)
            .unwrap();
        assert_eq!(severe.severity, Severity::Error);
        assert!((severe.confidence - 1.0).abs() < 1e-12);
    }

    /// Short windows never report a shift.
    #[test]
    fn distribution_shift_needs_data() {
        let d = detector();
        assert!(d
            .detect_distribution_shift(&[200.0; 3], &[100.0; 20], 0.3)
            .is_none());
        assert!(d
            .detect_distribution_shift(&[200.0; 10], &[100.0; 5], 0.3)
            .is_none());
    }
}
