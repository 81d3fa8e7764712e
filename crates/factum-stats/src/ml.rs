//! The per-tenant ML anomaly detector.
//!
//! One isolation-ensemble model per organization, learned from that
//! tenant's own historical records.  Models live in an in-memory registry
//! behind a `RwLock` and are swapped wholesale (`Arc` pointer swap) on
//! retrain, so a reader can never observe a half-written model.  An
//! injected [`ModelStore`] optionally persists models across restarts;
//! persistence is best-effort and the in-memory state stays authoritative.
//!
//! Training is triggered externally with a batch of samples — the detector
//! never trains lazily on the request path, and an untrained tenant is
//! never reported as anomalous.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use factum_contracts::traits::ModelStore;
use factum_contracts::value::get_path;

use crate::forest::IsolationForest;

/// Fixed training seed: retraining on the same batch yields the same model.
const TRAINING_SEED: u64 = 42;

/// A trained model together with what it was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgModel {
    pub forest: IsolationForest,
    /// The field list the model was trained on; scoring always uses this
    /// list, not the rule's.
    pub fields: Vec<String>,
    pub n_samples: usize,
    pub contamination: f64,
}

/// Outcome of a `train()` call. Training never raises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub org_id: String,
    pub success: bool,
    pub n_samples: usize,
    pub fields: Vec<String>,
    pub message: String,
}

/// Result of scoring one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlScore {
    pub org_id: String,
    pub is_anomaly: bool,
    /// Offset-adjusted decision value; negative means anomaly.
    pub raw_score: f64,
    pub fields_used: Vec<String>,
    pub reason: String,
}

impl MlScore {
    fn not_anomalous(org_id: &str, fields: &[String], reason: impl Into<String>) -> Self {
        Self {
            org_id: org_id.to_string(),
            is_anomaly: false,
            raw_score: 0.0,
            fields_used: fields.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Registry of per-organization anomaly models.
pub struct MlAnomalyDetector {
    models: RwLock<HashMap<String, Arc<OrgModel>>>,
    store: Option<Box<dyn ModelStore>>,
}

impl Default for MlAnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MlAnomalyDetector {
    /// Memory-only detector; models are lost on restart.
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Detector backed by a persistent model store.
    pub fn with_store(store: Box<dyn ModelStore>) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// True when an in-memory model exists for the organization.
    pub fn is_trained(&self, org_id: &str) -> bool {
        self.models
            .read()
            .expect("model registry lock poisoned")
            .contains_key(org_id)
    }

    /// Train (or retrain) the organization's model.
    ///
    /// Builds a numeric feature matrix by dot-path extraction of `fields`
    /// from each sample, imputing missing or non-numeric cells with the
    /// column mean (0 when the whole column is missing).  Requires at least
    /// two usable rows.  A prior model for the organization is replaced
    /// wholesale.
    pub fn train(
        &self,
        org_id: &str,
        samples: &[Value],
        fields: &[String],
        contamination: f64,
    ) -> TrainingReport {
        let Some(matrix) = vectorize(samples, fields) else {
            return TrainingReport {
                org_id: org_id.to_string(),
                success: false,
                n_samples: samples.len(),
                fields: fields.to_vec(),
                message: format!(
                    "not enough numeric samples to train ({} rows); need at least 2",
                    samples.len()
                ),
            };
        };
        if matrix.len() < 2 {
            return TrainingReport {
                org_id: org_id.to_string(),
                success: false,
                n_samples: samples.len(),
                fields: fields.to_vec(),
                message: format!(
                    "not enough numeric samples to train ({} rows); need at least 2",
                    matrix.len()
                ),
            };
        }

        let n_samples = matrix.len();
        let forest = IsolationForest::fit(&matrix, contamination, TRAINING_SEED);
        let model = Arc::new(OrgModel {
            forest,
            fields: fields.to_vec(),
            n_samples,
            contamination,
        });

        self.models
            .write()
            .expect("model registry lock poisoned")
            .insert(org_id.to_string(), Arc::clone(&model));
        self.persist(org_id, &model);

        info!(org = %org_id, n_samples, ?fields, "anomaly model trained");
        TrainingReport {
            org_id: org_id.to_string(),
            success: true,
            n_samples,
            fields: fields.to_vec(),
            message: format!(
                "isolation ensemble trained on {n_samples} samples, {} features",
                fields.len()
            ),
        }
    }

    /// Score one sample against the organization's model.
    ///
    /// On a cache miss the detector attempts a lazy load from the store
    /// before giving up.  With no model at all, the sample is reported as
    /// not anomalous with an explanatory reason.
    pub fn score(&self, org_id: &str, sample: &Value, fields: &[String]) -> MlScore {
        let model = match self.cached_or_loaded(org_id) {
            Some(model) => model,
            None => {
                return MlScore::not_anomalous(
                    org_id,
                    fields,
                    "model not trained yet; need more historical data",
                );
            }
        };

        let Some(matrix) = vectorize(std::slice::from_ref(sample), &model.fields) else {
            return MlScore::not_anomalous(
                org_id,
                &model.fields,
                "could not extract numeric features from sample",
            );
        };

        let raw = model.forest.decision_function(&matrix[0]);
        let raw = (raw * 10_000.0).round() / 10_000.0;
        let is_anomaly = raw < 0.0;

        debug!(org = %org_id, raw, is_anomaly, "anomaly model scored sample");
        MlScore {
            org_id: org_id.to_string(),
            is_anomaly,
            raw_score: raw,
            fields_used: model.fields.clone(),
            reason: format!(
                "isolation ensemble score {raw:.4}: {} (fields: {})",
                if is_anomaly {
                    "anomaly detected (score < 0)"
                } else {
                    "normal (score >= 0)"
                },
                model.fields.join(", ")
            ),
        }
    }

    /// Number of samples the organization's current model was trained on,
    /// when one exists.
    pub fn trained_samples(&self, org_id: &str) -> Option<usize> {
        self.models
            .read()
            .expect("model registry lock poisoned")
            .get(org_id)
            .map(|m| m.n_samples)
    }

    fn cached_or_loaded(&self, org_id: &str) -> Option<Arc<OrgModel>> {
        if let Some(model) = self
            .models
            .read()
            .expect("model registry lock poisoned")
            .get(org_id)
        {
            return Some(Arc::clone(model));
        }

        let store = self.store.as_ref()?;
        let blob = match store.load(org_id) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(org = %org_id, error = %e, "model store load failed");
                return None;
            }
        };

        match serde_json::from_slice::<OrgModel>(&blob) {
            Ok(model) => {
                let model = Arc::new(model);
                self.models
                    .write()
                    .expect("model registry lock poisoned")
                    .insert(org_id.to_string(), Arc::clone(&model));
                info!(org = %org_id, "anomaly model loaded from store");
                Some(model)
            }
            Err(e) => {
                warn!(org = %org_id, error = %e, "stored model blob is unreadable");
                None
            }
        }
    }

    fn persist(&self, org_id: &str, model: &OrgModel) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match serde_json::to_vec(model) {
            Ok(blob) => {
                if let Err(e) = store.save(org_id, &blob) {
                    warn!(org = %org_id, error = %e, "model store save failed; memory stays authoritative");
                }
            }
            Err(e) => warn!(org = %org_id, error = %e, "model serialization failed"),
        }
    }
}

/// Build a row-major feature matrix from samples by dot-path extraction.
///
/// Missing or non-numeric cells are imputed with the column mean over the
/// batch, or 0 when the whole column is missing.  Returns `None` only for
/// an empty batch.
fn vectorize(samples: &[Value], fields: &[String]) -> Option<Vec<Vec<f64>>> {
    if samples.is_empty() {
        return None;
    }

    let mut matrix: Vec<Vec<Option<f64>>> = Vec::with_capacity(samples.len());
    for sample in samples {
        let row = fields
            .iter()
            .map(|f| {
                get_path(sample, f).and_then(factum_contracts::value::as_number)
            })
            .collect();
        matrix.push(row);
    }

    let mut col_means = vec![0.0f64; fields.len()];
    for (col, mean_slot) in col_means.iter_mut().enumerate() {
        let present: Vec<f64> = matrix.iter().filter_map(|row| row[col]).collect();
        if !present.is_empty() {
            *mean_slot = present.iter().sum::<f64>() / present.len() as f64;
        }
    }

    Some(
        matrix
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(col, cell)| cell.unwrap_or(col_means[col]))
                    .collect()
            })
            .collect(),
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use factum_contracts::CollaboratorError;

    use super::*;

    /// In-memory model store fake.
    #[derive(Default)]
    struct MapStore {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        fail_saves: bool,
    }

    impl ModelStore for MapStore {
        fn load(&self, org_id: &str) -> Result<Option<Vec<u8>>, CollaboratorError> {
            Ok(self.blobs.lock().unwrap().get(org_id).cloned())
        }

        fn save(&self, org_id: &str, blob: &[u8]) -> Result<(), CollaboratorError> {
            if self.fail_saves {
                return Err(CollaboratorError::from("disk full"));
            }
            self.blobs
                .lock()
                .unwrap()
                .insert(org_id.to_string(), blob.to_vec());
            Ok(())
        }
    }

    /// 200 typical samples with hours in [6, 9].
    fn typical_samples() -> Vec<Value> {
        (0..200)
            .map(|i| {
                let hours = 6.0 + 3.0 * ((i * 37 % 100) as f64 / 100.0);
                json!({ "hours": hours, "total_cost": hours * 20.0 })
            })
            .collect()
    }

    fn fields() -> Vec<String> {
        vec!["hours".to_string(), "total_cost".to_string()]
    }

    /// Train on typical data: an extreme sample scores anomalous, a typical
    /// one does not.
    #[test]
    fn train_and_score() {
        let detector = MlAnomalyDetector::new();
        let report = detector.train("org-1", &typical_samples(), &fields(), 0.05);
        assert!(report.success, "{}", report.message);
        assert_eq!(report.n_samples, 200);
        assert!(detector.is_trained("org-1"));

        let outlier = detector.score("org-1", &json!({ "hours": 30, "total_cost": 150 }), &fields());
        assert!(outlier.is_anomaly, "reason: {}", outlier.reason);
        assert!(outlier.raw_score < 0.0);

        let typical = detector.score("org-1", &json!({ "hours": 7.5, "total_cost": 150 }), &fields());
        assert!(!typical.is_anomaly, "reason: {}", typical.reason);
    }

    /// An untrained org is never anomalous and never panics.
    #[test]
    fn untrained_org_is_never_anomalous() {
        let detector = MlAnomalyDetector::new();
        let score = detector.score("org-missing", &json!({ "hours": 30 }), &fields());
        assert!(!score.is_anomaly);
        assert_eq!(score.raw_score, 0.0);
        assert!(score.reason.contains("not trained"));
    }

    /// Fewer than two rows fails with a structured report, not a panic.
    #[test]
    fn insufficient_data_reported() {
        let detector = MlAnomalyDetector::new();
        let report = detector.train("org-1", &[json!({ "hours": 7 })], &fields(), 0.05);
        assert!(!report.success);
        assert!(report.message.contains("need at least 2"));
        assert!(!detector.is_trained("org-1"));
    }

    /// Scoring uses the trained field list even when the rule passes a
    /// different one.
    #[test]
    fn scoring_uses_trained_fields() {
        let detector = MlAnomalyDetector::new();
        detector.train("org-1", &typical_samples(), &fields(), 0.05);
        let score = detector.score(
            "org-1",
            &json!({ "hours": 7.5, "total_cost": 150 }),
            &["unrelated".to_string()],
        );
        assert_eq!(score.fields_used, fields());
        assert!(!score.is_anomaly);
    }

    /// A second detector sharing the store lazily loads the trained model.
    #[test]
    fn lazy_load_from_store() {
        let store = Arc::new(MapStore::default());

        struct SharedStore(Arc<MapStore>);
        impl ModelStore for SharedStore {
            fn load(&self, org_id: &str) -> Result<Option<Vec<u8>>, CollaboratorError> {
                self.0.load(org_id)
            }
            fn save(&self, org_id: &str, blob: &[u8]) -> Result<(), CollaboratorError> {
                self.0.save(org_id, blob)
            }
        }

        let trainer = MlAnomalyDetector::with_store(Box::new(SharedStore(Arc::clone(&store))));
        trainer.train("org-1", &typical_samples(), &fields(), 0.05);

        let reader = MlAnomalyDetector::with_store(Box::new(SharedStore(store)));
        assert!(!reader.is_trained("org-1"));
        let score = reader.score("org-1", &json!({ "hours": 30, "total_cost": 150 }), &fields());
        assert!(score.is_anomaly, "reason: {}", score.reason);
        assert!(reader.is_trained("org-1"));
    }

    /// A failing store is logged and ignored; the in-memory model keeps
    /// working.
    #[test]
    fn store_failure_is_best_effort() {
        let detector = MlAnomalyDetector::with_store(Box::new(MapStore {
            blobs: Mutex::new(HashMap::new()),
            fail_saves: true,
        }));
        let report = detector.train("org-1", &typical_samples(), &fields(), 0.05);
        assert!(report.success);
        let score = detector.score("org-1", &json!({ "hours": 7.5, "total_cost": 150 }), &fields());
        assert!(!score.is_anomaly);
    }

    /// Retraining replaces the model wholesale.
    #[test]
    fn retrain_replaces_model() {
        let detector = MlAnomalyDetector::new();
        detector.train("org-1", &typical_samples(), &fields(), 0.05);
        assert_eq!(detector.trained_samples("org-1"), Some(200));

        let smaller: Vec<Value> = typical_samples().into_iter().take(50).collect();
        detector.train("org-1", &smaller, &fields(), 0.05);
        assert_eq!(detector.trained_samples("org-1"), Some(50));
    }

    /// Missing cells impute with the column mean, whole-missing columns
    /// with zero.
    #[test]
    fn vectorize_imputation() {
        let samples = vec![
            json!({ "a": 2.0, "b": "x" }),
            json!({ "a": 4.0 }),
            json!({ "c": 1.0 }),
        ];
        let matrix = vectorize(&samples, &["a".to_string(), "b".to_string()]).unwrap();
        // Column a mean is 3.0; column b is entirely non-numeric -> 0.
        assert_eq!(matrix[0], vec![2.0, 0.0]);
        assert_eq!(matrix[1], vec![4.0, 0.0]);
        assert_eq!(matrix[2], vec![3.0, 0.0]);
    }
}
