//! Collaborator contracts: the five external services the pipeline calls
//! but never implements.
//!
//! The core treats each of these as a pluggable interface — production
//! wiring injects real implementations (a SQL lookup, an embedding service,
//! a search API, a history query, a blob store); tests and the demo inject
//! in-memory fakes.  Every failure crossing one of these boundaries is
//! converted into a `warning` violation by the caller, never propagated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CollaboratorError;

/// "Does `value` exist in `table`.`column`, optionally scoped to a tenant?"
///
/// Implementations own their transaction hygiene: a failed query MUST be
/// rolled back before this method returns, so later rules in the same
/// request are unaffected.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        organization_id: Option<&str>,
    ) -> Result<bool, CollaboratorError>;
}

/// Cosine similarity of two texts, clamped to [0, 1].
#[async_trait]
pub trait TextSimilarity: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, CollaboratorError>;
}

/// One search result from the fact-check search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    /// Cleaned text snippet (no markup).
    pub snippet: String,
    /// The provider's own relevance score, in [0, 1].
    pub relevance: f64,
}

/// Web search used to ground fact checks.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// `depth` is provider-defined (`"basic"` or `"advanced"` by convention).
    async fn search(
        &self,
        query: &str,
        depth: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CollaboratorError>;
}

/// Historical numeric values of one field for one tenant over a trailing
/// window of days, newest first. Used by the statistical analyzer.
#[async_trait]
pub trait SampleHistory: Send + Sync {
    async fn numeric_values(
        &self,
        organization_id: &str,
        field: &str,
        days: u32,
    ) -> Result<Vec<f64>, CollaboratorError>;
}

/// Blob storage for trained anomaly models, keyed by organization id.
///
/// Persistence is best-effort: callers log failures and keep the in-memory
/// model authoritative for the rest of the process lifetime.
pub trait ModelStore: Send + Sync {
    fn load(&self, org_id: &str) -> Result<Option<Vec<u8>>, CollaboratorError>;
    fn save(&self, org_id: &str, blob: &[u8]) -> Result<(), CollaboratorError>;
}
