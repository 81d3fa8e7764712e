//! A small isolation-ensemble outlier model.
//!
//! Standard isolation-forest construction: each tree is grown on a random
//! subsample (psi = min(256, n)) by picking a random feature and a random
//! split point until the height limit ceil(log2(psi)) or a single point
//! remains.  Anomalous points isolate quickly, so their expected path
//! length across the ensemble is short.
//!
//! Scoring convention: the anomaly score
//! `s(x) = 2^(-E[h(x)] / c(psi))` is negated into `score_samples`, and the
//! decision value subtracts an offset fixed at training time as the
//! contamination quantile of the training scores.  **A negative decision
//! value means anomaly.**

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Number of trees in the ensemble.
const N_TREES: usize = 100;
/// Maximum subsample size per tree.
const MAX_SUBSAMPLE: usize = 256;

/// Euler-Mascheroni constant, for the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    /// An unsplit set of `size` points.
    Leaf { size: usize },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A trained isolation ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// Subsample size each tree was grown on.
    subsample: usize,
    /// Decision offset: the contamination quantile of training scores.
    offset: f64,
    n_features: usize,
}

impl IsolationForest {
    /// Fit the ensemble on a row-major feature matrix.
    ///
    /// `rows` must be non-empty and rectangular.  `contamination` is the
    /// expected anomaly fraction in the training data and fixes the
    /// decision offset.  The RNG is seeded for reproducible training.
    pub fn fit(rows: &[Vec<f64>], contamination: f64, seed: u64) -> Self {
        let n = rows.len();
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        let subsample = n.min(MAX_SUBSAMPLE);
        let height_limit = (subsample as f64).log2().ceil().max(1.0) as usize;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..n).collect();

        let mut trees = Vec::with_capacity(N_TREES);
        for _ in 0..N_TREES {
            indices.shuffle(&mut rng);
            let sample: Vec<usize> = indices[..subsample].to_vec();
            trees.push(build_tree(rows, &sample, 0, height_limit, &mut rng));
        }

        let mut forest = Self {
            trees,
            subsample,
            offset: 0.0,
            n_features,
        };

        // Fix the decision offset so the bottom `contamination` fraction of
        // the training data scores negative.
        let mut scores: Vec<f64> = rows.iter().map(|r| forest.score_sample(r)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        forest.offset = crate::analyzer::quantile(&scores, contamination.clamp(0.0, 0.5));
        forest
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The anomaly score `s(x)` in (0, 1); higher is more anomalous.
    pub fn anomaly_score(&self, row: &[f64]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| path_length(t, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.subsample);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    /// `score_samples`: the negated anomaly score; lower is more anomalous.
    pub fn score_sample(&self, row: &[f64]) -> f64 {
        -self.anomaly_score(row)
    }

    /// Offset-adjusted decision value. Negative means anomaly.
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.score_sample(row) - self.offset
    }
}

/// Grow one tree over `sample` (indices into `rows`).
fn build_tree(
    rows: &[Vec<f64>],
    sample: &[usize],
    depth: usize,
    height_limit: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    // Pick among features that still vary within this sample; a fully
    // constant sample cannot be split further.
    let n_features = rows[sample[0]].len();
    let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
    for feature in 0..n_features {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in sample {
            let v = rows[i][feature];
            min = min.min(v);
            max = max.max(v);
        }
        if max > min {
            candidates.push((feature, min, max));
        }
    }
    let Some(&(feature, min, max)) = candidates.as_slice().choose(rng) else {
        return Node::Leaf { size: sample.len() };
    };

    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) =
        sample.iter().partition(|&&i| rows[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(rows, &left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(rows, &right, depth + 1, height_limit, rng)),
    }
}

/// Path length of `row` through one tree, with the standard leaf-size
/// adjustment.
fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let value = row.get(*feature).copied().unwrap_or(0.0);
            if value < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points:
/// `c(n) = 2 H(n-1) - 2 (n-1) / n`, with `c(0) = c(1) = 0`.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    let harmonic = (n - 1.0).ln() + EULER_GAMMA;
    2.0 * harmonic - 2.0 * (n - 1.0) / n
}

// ── Tests ─────────────────────────────────────────────────────────────────────
