//! The validation orchestrator: the public entry point of the pipeline.
//!
//! `validate()` sequences the stages in their fixed order:
//!
//!   rule engine → anomaly detection → auto-correction → status →
//!   confidence
//!
//! Every stage degrades rather than fails — the only error this function
//! returns is a structurally invalid request (a rules argument that is not
//! an array), which is a call-site bug rather than a runtime condition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use factum_contracts::traits::SampleHistory;
use factum_contracts::{
    new_validation_id, FactumError, FactumResult, ValidationContext, ValidationResult,
    ValidationStatus,
};
use factum_correct::AutoCorrector;
use factum_rules::RuleEngine;
use factum_stats::{AnomalyDetector, PatternDetector, StatisticalAnalyzer};

use crate::config::EngineConfig;
use crate::scorer::{ConfidenceLevel, ConfidenceScorer};

/// The FACTUM validation pipeline.
///
/// Construct once at startup with the shared rule engine (which owns the
/// connector registry, ML detector, and collaborator handles) and reuse for
/// the life of the process.
pub struct Validator {
    engine: RuleEngine,
    anomaly: AnomalyDetector,
    corrector: AutoCorrector,
    scorer: ConfidenceScorer,
    history: Option<Arc<dyn SampleHistory>>,
}

impl Validator {
    /// A validator with the default configuration.
    pub fn new(engine: RuleEngine) -> Self {
        Self::with_config(engine, EngineConfig::default())
    }

    /// A validator with explicit configuration.
    pub fn with_config(engine: RuleEngine, config: EngineConfig) -> Self {
        let analyzer = StatisticalAnalyzer::new(
            config.z_score_threshold,
            config.iqr_multiplier,
            config.min_sample_size,
        );
        let patterns = PatternDetector::new(config.patterns.clone());
        Self {
            engine: engine.with_io_timeout(Duration::from_secs_f64(config.io_timeout_secs)),
            anomaly: AnomalyDetector::new(analyzer, patterns),
            corrector: AutoCorrector::with_fuzzy_threshold(config.fuzzy_threshold),
            scorer: ConfidenceScorer::new(),
            history: None,
        }
    }

    /// Inject the historical-sample collaborator (enables `anomaly` rules).
    pub fn with_history(mut self, history: Arc<dyn SampleHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Validate `document` against `rules` under `context`.
    ///
    /// # Errors
    ///
    /// Returns `FactumError::InvalidRequest` when `rules` is not a JSON
    /// array.  Everything else — malformed rules, collaborator outages,
    /// correction failures — is reported in-band as violations.
    pub async fn validate(
        &self,
        document: &Value,
        rules: &Value,
        context: &ValidationContext,
    ) -> FactumResult<ValidationResult> {
        let Some(rule_specs) = rules.as_array() else {
            return Err(FactumError::InvalidRequest {
                reason: "rules must be a JSON array of rule specs".to_string(),
            });
        };

        let started = Instant::now();
        let validation_id = new_validation_id();
        debug!(validation_id = %validation_id, rules = rule_specs.len(), "validation starting");

        // ── Stage 1: rule evaluation ─────────────────────────────────────────
        let mut violations = self.engine.evaluate(document, rule_specs, context).await;

        // ── Stage 2: anomaly detection (opt-in) ──────────────────────────────
        let mut anomalies_detected = 0;
        if context.detect_anomalies {
            let parsed = RuleEngine::parse_rules(rule_specs);
            let anomaly_violations = self
                .anomaly
                .detect(document, &parsed, context, self.history.as_deref())
                .await;
            anomalies_detected = anomaly_violations.len();
            violations.extend(anomaly_violations);
        }

        // ── Stage 3: auto-correction (opt-in, errors only) ───────────────────
        let (corrected_output, corrections_applied) = if violations.is_empty() {
            (None, Vec::new())
        } else {
            self.corrector.fix(document, &violations, context)
        };
        let auto_corrected = corrected_output.is_some();

        // ── Stage 4: status derivation ───────────────────────────────────────
        let status = ValidationStatus::from_violations(&violations);
        let is_valid = status != ValidationStatus::Failed;

        // ── Stage 5: confidence scoring (on by default) ──────────────────────
        let (confidence_score, confidence_level) = if context.calculate_confidence {
            let factors = self.scorer.calculate(
                &violations,
                corrections_applied.len(),
                None,
                ConfidenceScorer::has_reference_violations(&violations),
            );
            let level = ConfidenceLevel::from_score(factors.overall_confidence);
            (
                Some(factors.overall_confidence),
                Some(level.as_str().to_string()),
            )
        } else {
            (None, None)
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            validation_id = %validation_id,
            status = ?status,
            violations = violations.len(),
            auto_corrected,
            latency_ms,
            "validation complete"
        );

        Ok(ValidationResult {
            status,
            is_valid,
            violations,
            auto_corrected,
            corrected_output,
            corrections_applied,
            confidence_score,
            confidence_level,
            anomalies_detected: (anomalies_detected > 0).then_some(anomalies_detected),
            validation_id,
            latency_ms,
            timestamp: Utc::now(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
