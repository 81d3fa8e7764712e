//! # factum-stats
//!
//! Statistical analysis and anomaly detection for the FACTUM validation
//! engine.
//!
//! Two independent outlier subsystems live here:
//!
//! 1. **Classical** — [`StatisticalAnalyzer`] computes descriptive metrics
//!    and runs z-score / IQR outlier tests against historical baselines;
//!    [`PatternDetector`] flags suspicious constants (round numbers,
//!    placeholders, impossible percentages) with no history at all;
//!    [`AnomalyDetector`] ties both to the rule set.
//! 2. **Learned** — [`MlAnomalyDetector`] keeps one unsupervised
//!    isolation-ensemble model per organization, trained on that tenant's
//!    own records and scored at validation time. An untrained tenant is
//!    never reported as anomalous.

pub mod analyzer;
pub mod detector;
pub mod forest;
pub mod ml;
pub mod patterns;

pub use analyzer::{
    DriftReport, MetricDrift, OutlierTest, OutlierVerdict, StatisticalAnalyzer,
    StatisticalMetrics, StatsError,
};
pub use detector::{AnomalyDetector, ShiftPattern};
pub use forest::IsolationForest;
pub use ml::{MlAnomalyDetector, MlScore, OrgModel, TrainingReport};
pub use patterns::{PatternConfig, PatternDetector};
