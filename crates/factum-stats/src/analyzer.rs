//! Descriptive statistics and classical outlier tests over numeric series.
//!
//! The analyzer computes per-field metrics (mean, median, sample standard
//! deviation, linear-interpolated quartiles), runs z-score and IQR outlier
//! tests against a baseline, and flags drift between two metric snapshots.
//! Historical baselines come from the injected `SampleHistory`
//! collaborator; the analyzer itself caches nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use factum_contracts::traits::SampleHistory;
use factum_contracts::Severity;

/// Statistical metrics for one numeric field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalMetrics {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// 25th percentile.
    pub q1: f64,
    /// 75th percentile.
    pub q3: f64,
    /// Interquartile range (q3 - q1).
    pub iqr: f64,
    /// Values outside the 1.5x IQR fence.
    pub outlier_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Which classical test flagged (or cleared) a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierTest {
    Zscore,
    Iqr,
}

/// Result of one outlier test on one value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierVerdict {
    pub field: String,
    pub value: f64,
    pub is_outlier: bool,
    pub method: OutlierTest,
    /// z-score for the z-score test; distance past the fence for IQR.
    pub score: f64,
    pub threshold: f64,
    pub severity: Severity,
}

/// One metric whose relative change exceeded the drift threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDrift {
    pub metric: String,
    pub current: f64,
    pub historical: f64,
    pub drift_percentage: f64,
    pub severity: Severity,
}

/// Result of comparing a current metrics snapshot to a historical baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub field: String,
    pub has_drift: bool,
    pub drifts: Vec<MetricDrift>,
    pub threshold_percentage: f64,
}

/// Analysis failures. The only one is an empty input series — everything
/// else degrades (single-value series produce degenerate metrics).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("no values provided for field '{field}'")]
    EmptySeries { field: String },
}

/// Descriptive statistics and outlier detection over numeric series.
#[derive(Debug, Clone)]
pub struct StatisticalAnalyzer {
    /// z-score above which a value is an outlier.
    pub z_score_threshold: f64,
    /// IQR fence multiplier.
    pub iqr_multiplier: f64,
    /// Minimum history size for a usable baseline.
    pub min_sample_size: usize,
}

impl Default for StatisticalAnalyzer {
    fn default() -> Self {
        Self {
            z_score_threshold: 3.0,
            iqr_multiplier: 1.5,
            min_sample_size: 10,
        }
    }
}

impl StatisticalAnalyzer {
    pub fn new(z_score_threshold: f64, iqr_multiplier: f64, min_sample_size: usize) -> Self {
        Self {
            z_score_threshold,
            iqr_multiplier,
            min_sample_size,
        }
    }

    /// Compute metrics for a numeric series.
    ///
    /// A single-value series produces degenerate metrics (std_dev 0, all
    /// quantiles equal to the value); an empty series is an error.
    pub fn analyze_field(&self, field: &str, values: &[f64]) -> Result<StatisticalMetrics, StatsError> {
        if values.is_empty() {
            return Err(StatsError::EmptySeries {
                field: field.to_string(),
            });
        }

        if values.len() < 2 {
            return Ok(StatisticalMetrics {
                field: field.to_string(),
                count: 1,
                mean: values[0],
                median: values[0],
                std_dev: 0.0,
                min_value: values[0],
                max_value: values[0],
                q1: values[0],
                q3: values[0],
                iqr: 0.0,
                outlier_count: 0,
                timestamp: Utc::now(),
            });
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let median = quantile(&sorted, 0.5);
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        let std_dev = variance.sqrt();
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;

        let outlier_count = if count >= self.min_sample_size {
            let lower = q1 - self.iqr_multiplier * iqr;
            let upper = q3 + self.iqr_multiplier * iqr;
            values.iter().filter(|v| **v < lower || **v > upper).count()
        } else {
            0
        };

        Ok(StatisticalMetrics {
            field: field.to_string(),
            count,
            mean,
            median,
            std_dev,
            min_value: sorted[0],
            max_value: sorted[count - 1],
            q1,
            q3,
            iqr,
            outlier_count,
            timestamp: Utc::now(),
        })
    }

    /// z-score outlier test: `z = |value - mean| / std_dev`.
    ///
    /// With zero standard deviation, z is 0 when the value equals the mean
    /// and infinite otherwise.  Severity escalates to error past
    /// `1.5 x threshold`.
    pub fn detect_outlier_zscore(
        &self,
        field: &str,
        value: f64,
        mean: f64,
        std_dev: f64,
        threshold: Option<f64>,
    ) -> OutlierVerdict {
        let threshold = threshold.unwrap_or(self.z_score_threshold);

        let z_score = if std_dev == 0.0 {
            if value == mean {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            ((value - mean) / std_dev).abs()
        };

        let severity = if z_score > threshold * 1.5 {
            Severity::Error
        } else if z_score > threshold {
            Severity::Warning
        } else {
            Severity::Info
        };

        OutlierVerdict {
            field: field.to_string(),
            value,
            is_outlier: z_score > threshold,
            method: OutlierTest::Zscore,
            score: z_score,
            threshold,
            severity,
        }
    }

    /// IQR outlier test: flagged outside `[q1 - m*iqr, q3 + m*iqr]`.
    ///
    /// The score is the distance past the violated fence; severity scales
    /// with that distance normalized by the IQR (error beyond 2x, warning
    /// beyond 1x).
    pub fn detect_outlier_iqr(
        &self,
        field: &str,
        value: f64,
        q1: f64,
        q3: f64,
        iqr: f64,
        multiplier: Option<f64>,
    ) -> OutlierVerdict {
        let multiplier = multiplier.unwrap_or(self.iqr_multiplier);
        let lower = q1 - multiplier * iqr;
        let upper = q3 + multiplier * iqr;

        let score = if value < lower {
            lower - value
        } else if value > upper {
            value - upper
        } else {
            0.0
        };

        let normalized = if iqr > 0.0 { score / iqr } else { 0.0 };
        let severity = if normalized > 2.0 {
            Severity::Error
        } else if normalized > 1.0 {
            Severity::Warning
        } else {
            Severity::Info
        };

        OutlierVerdict {
            field: field.to_string(),
            value,
            is_outlier: value < lower || value > upper,
            method: OutlierTest::Iqr,
            score,
            threshold: multiplier * iqr,
            severity,
        }
    }

    /// Fetch a historical baseline through the `SampleHistory` collaborator.
    ///
    /// Returns `None` below the minimum sample size or when the collaborator
    /// fails — a missing baseline is never an error.
    pub async fn historical_metrics(
        &self,
        history: &dyn SampleHistory,
        organization_id: &str,
        field: &str,
        days: u32,
    ) -> Option<StatisticalMetrics> {
        let values = match history.numeric_values(organization_id, field, days).await {
            Ok(values) => values,
            Err(e) => {
                warn!(org = %organization_id, field = %field, error = %e, "history fetch failed");
                return None;
            }
        };

        if values.len() < self.min_sample_size {
            debug!(
                org = %organization_id,
                field = %field,
                samples = values.len(),
                needed = self.min_sample_size,
                "insufficient history for a baseline"
            );
            return None;
        }

        self.analyze_field(field, &values).ok()
    }

    /// Flag metrics (mean, std_dev) whose relative change from the baseline
    /// exceeds `threshold`; severity escalates to error past double the
    /// threshold.
    pub fn detect_drift(
        &self,
        current: &StatisticalMetrics,
        historical: &StatisticalMetrics,
        threshold: f64,
    ) -> DriftReport {
        let mut drifts = Vec::new();

        for (metric, cur, hist) in [
            ("mean", current.mean, historical.mean),
            ("std_dev", current.std_dev, historical.std_dev),
        ] {
            let drift = if hist != 0.0 {
                ((cur - hist) / hist).abs()
            } else {
                0.0
            };
            if drift > threshold {
                drifts.push(MetricDrift {
                    metric: metric.to_string(),
                    current: cur,
                    historical: hist,
                    drift_percentage: drift * 100.0,
                    severity: if drift > threshold * 2.0 {
                        Severity::Error
                    } else {
                        Severity::Warning
                    },
                });
            }
        }

        DriftReport {
            field: current.field.clone(),
            has_drift: !drifts.is_empty(),
            drifts,
            threshold_percentage: threshold * 100.0,
        }
    }
}

/// Quantile by linear-interpolated rank: `index = p * (n - 1)`.
/// `sorted` must be ascending and non-empty.
pub(crate) fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let index = p * (n - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = index - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use factum_contracts::CollaboratorError;

    use super::*;

    // ── analyze_field ─────────────────────────────────────────────────────────

    /// Known small series: quartiles use linear-interpolated rank.
    #[test]
    fn analyze_field_basics() {
        let analyzer = StatisticalAnalyzer::default();
        let metrics = analyzer
            .analyze_field("hours", &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();

        assert_eq!(metrics.count, 5);
        assert!((metrics.mean - 3.0).abs() < 1e-12);
        assert!((metrics.median - 3.0).abs() < 1e-12);
        assert!((metrics.q1 - 2.0).abs() < 1e-12);
        assert!((metrics.q3 - 4.0).abs() < 1e-12);
        assert!((metrics.iqr - 2.0).abs() < 1e-12);
        // Sample standard deviation of 1..5 is sqrt(2.5).
        assert!((metrics.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
    }

    /// Quartile interpolation on an even-length series.
    #[test]
    fn quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.75) - 3.25).abs() < 1e-12);
    }

    /// A single value yields degenerate metrics, not an error.
    #[test]
    fn single_value_series() {
        let metrics = StatisticalAnalyzer::default()
            .analyze_field("x", &[7.0])
            .unwrap();
        assert_eq!(metrics.count, 1);
        assert_eq!(metrics.std_dev, 0.0);
        assert_eq!(metrics.q1, 7.0);
        assert_eq!(metrics.q3, 7.0);
    }

    /// An empty series is the one analysis error.
    #[test]
    fn empty_series_is_error() {
        let err = StatisticalAnalyzer::default()
            .analyze_field("x", &[])
            .unwrap_err();
        assert_eq!(err, StatsError::EmptySeries { field: "x".to_string() });
    }

    /// Outliers past the 1.5x IQR fence are counted once the series reaches
    /// the minimum sample size.
    #[test]
    fn outlier_counting() {
        let analyzer = StatisticalAnalyzer::default();
        let mut values = vec![10.0; 11];
        values.push(1000.0);
        let metrics = analyzer.analyze_field("cost", &values).unwrap();
        assert_eq!(metrics.outlier_count, 1);
    }

    // ── z-score ───────────────────────────────────────────────────────────────

    /// The spec's canonical example: mean 500, std 50, value 1000 is z=10,
    /// an error-severity outlier.
    #[test]
    fn zscore_canonical_outlier() {
        let verdict = StatisticalAnalyzer::default()
            .detect_outlier_zscore("amount", 1000.0, 500.0, 50.0, None);
        assert!(verdict.is_outlier);
        assert!((verdict.score - 10.0).abs() < 1e-12);
        assert_eq!(verdict.severity, Severity::Error);
    }

    /// Between 1x and 1.5x the threshold the severity stays warning.
    #[test]
    fn zscore_warning_band() {
        // z = 4 with threshold 3: outlier, but below 4.5 so warning.
        let verdict = StatisticalAnalyzer::default()
            .detect_outlier_zscore("amount", 700.0, 500.0, 50.0, None);
        assert!(verdict.is_outlier);
        assert_eq!(verdict.severity, Severity::Warning);
    }

    /// Zero variance: equal value is z=0, any other value is infinite.
    #[test]
    fn zscore_zero_stddev() {
        let analyzer = StatisticalAnalyzer::default();
        let same = analyzer.detect_outlier_zscore("x", 5.0, 5.0, 0.0, None);
        assert!(!same.is_outlier);
        assert_eq!(same.score, 0.0);

        let different = analyzer.detect_outlier_zscore("x", 6.0, 5.0, 0.0, None);
        assert!(different.is_outlier);
        assert!(different.score.is_infinite());
        assert_eq!(different.severity, Severity::Error);
    }

    // ── IQR ───────────────────────────────────────────────────────────────────

    /// Values inside the fence are not outliers; far past it they escalate
    /// to error.
    #[test]
    fn iqr_fence_and_severity() {
        let analyzer = StatisticalAnalyzer::default();

        // q1=10, q3=20, iqr=10 -> fence [-5, 35].
        let inside = analyzer.detect_outlier_iqr("x", 30.0, 10.0, 20.0, 10.0, None);
        assert!(!inside.is_outlier);
        assert_eq!(inside.severity, Severity::Info);

        // 50 is 15 past the fence: 1.5 IQRs -> warning.
        let past = analyzer.detect_outlier_iqr("x", 50.0, 10.0, 20.0, 10.0, None);
        assert!(past.is_outlier);
        assert_eq!(past.severity, Severity::Warning);

        // 60 is 25 past the fence: 2.5 IQRs -> error.
        let far = analyzer.detect_outlier_iqr("x", 60.0, 10.0, 20.0, 10.0, None);
        assert!(far.is_outlier);
        assert_eq!(far.severity, Severity::Error);
    }

    // ── drift ─────────────────────────────────────────────────────────────────

    fn metrics_with(mean: f64, std_dev: f64) -> StatisticalMetrics {
        StatisticalMetrics {
            field: "hours".to_string(),
            count: 100,
            mean,
            median: mean,
            std_dev,
            min_value: 0.0,
            max_value: mean * 2.0,
            q1: mean * 0.75,
            q3: mean * 1.25,
            iqr: mean * 0.5,
            outlier_count: 0,
            timestamp: Utc::now(),
        }
    }

    /// Mean drift past the threshold is flagged; past double it escalates.
    #[test]
    fn drift_detection() {
        let analyzer = StatisticalAnalyzer::default();
        let historical = metrics_with(100.0, 10.0);

        let steady = analyzer.detect_drift(&metrics_with(110.0, 10.0), &historical, 0.2);
        assert!(!steady.has_drift);

        let drifted = analyzer.detect_drift(&metrics_with(130.0, 10.0), &historical, 0.2);
        assert!(drifted.has_drift);
        assert_eq!(drifted.drifts[0].metric, "mean");
        assert_eq!(drifted.drifts[0].severity, Severity::Warning);

        let severe = analyzer.detect_drift(&metrics_with(150.0, 10.0), &historical, 0.2);
        assert_eq!(severe.drifts[0].severity, Severity::Error);
    }

    // ── historical_metrics ────────────────────────────────────────────────────

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

    struct BrokenHistory;

    #[async_trait]
    impl SampleHistory for BrokenHistory {
        async fn numeric_values(
            &self,
            _organization_id: &str,
            _field: &str,
            _days: u32,
        ) -> Result<Vec<f64>, CollaboratorError> {
            Err(CollaboratorError::from("connection refused"))
        }
    }

    /// A baseline needs the minimum sample size; collaborator failures are
    /// swallowed.
    #[tokio::test]
    async fn historical_metrics_gating() {
        let analyzer = StatisticalAnalyzer::default();

        let short = FixedHistory(vec![1.0; 5]);
        assert!(analyzer
            .historical_metrics(&short, "org-1", "hours", 30)
            .await
            .is_none());

        let enough = FixedHistory((0..20).map(|i| i as f64).collect());
        let metrics = analyzer
            .historical_metrics(&enough, "org-1", "hours", 30)
            .await
            .unwrap();
        assert_eq!(metrics.count, 20);

        assert!(analyzer
            .historical_metrics(&BrokenHistory, "org-1", "hours", 30)
            .await
            .is_none());
    }
}
