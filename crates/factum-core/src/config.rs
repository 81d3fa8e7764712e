//! Engine configuration, loadable from TOML.
//!
//! Every tunable constant in the pipeline lives here with its reference
//! default, so deployments adjust thresholds through configuration rather
//! than code.  Absent keys fall back to the defaults.
//!
//! ```toml
//! z_score_threshold = 3.0
//! iqr_multiplier = 1.5
//! drift_threshold = 0.2
//! fuzzy_threshold = 0.6
//!
//! [patterns]
//! round_numbers = [100.0, 1000.0]
//! placeholder_values = [0.0, -1.0]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use factum_contracts::{FactumError, FactumResult};
use factum_stats::PatternConfig;

/// Tunable constants for the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// z-score above which a value is a statistical outlier.
    pub z_score_threshold: f64,
    /// IQR fence multiplier for the quartile outlier test.
    pub iqr_multiplier: f64,
    /// Minimum historical samples for a usable baseline.
    pub min_sample_size: usize,
    /// Relative change (fraction) above which a metric has drifted.
    pub drift_threshold: f64,
    /// Acceptance threshold for fuzzy option substitution.
    pub fuzzy_threshold: f64,
    /// Default timeout, in seconds, for evaluators doing outbound I/O.
    pub io_timeout_secs: f64,
    /// Constant sets for the pattern anomaly heuristics.
    pub patterns: PatternConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: 3.0,
            iqr_multiplier: 1.5,
            min_sample_size: 10,
            drift_threshold: 0.2,
            fuzzy_threshold: 0.6,
            io_timeout_secs: 10.0,
            patterns: PatternConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse `s` as TOML configuration.
    pub fn from_toml_str(s: &str) -> FactumResult<Self> {
        toml::from_str(s).map_err(|e| FactumError::ConfigError {
            reason: format!("failed to parse engine config TOML: {e}"),
        })
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> FactumResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FactumError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
