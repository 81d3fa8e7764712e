//! Search-grounded fact checking.
//!
//! Pipeline: claim text → search provider (top-N snippets + source URLs) →
//! cosine similarity of each snippet against the claim → `web_confidence` =
//! mean of the top-3 semantic scores → verdict.
//!
//! Both the search and the similarity scoring go through collaborator
//! traits, so the pipeline itself carries no API keys and `verify()` never
//! raises: provider failures and empty result sets map to an `Uncertain`
//! verdict with the failure recorded in `error`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use factum_contracts::traits::{SearchProvider, TextSimilarity};

/// Mean top-3 score at or above which a claim is `Supported`.
const SUPPORTED_THRESHOLD: f64 = 0.65;
/// Mean top-3 score at or below which a claim is `Contradicted`.
const CONTRADICTED_THRESHOLD: f64 = 0.30;
/// Snippets are truncated to this many characters in the result for
/// readability.
const SNIPPET_LIMIT: usize = 400;

/// Verdict of a web-grounded fact check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebVerdict {
    Supported,
    Uncertain,
    Contradicted,
}

impl std::fmt::Display for WebVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebVerdict::Supported => write!(f, "SUPPORTED"),
            WebVerdict::Uncertain => write!(f, "UNCERTAIN"),
            WebVerdict::Contradicted => write!(f, "CONTRADICTED"),
        }
    }
}

/// One scored evidence source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// The search provider's own relevance score.
    pub relevance: f64,
    /// Our cosine similarity of the snippet to the claim.
    pub semantic_score: f64,
}

/// Complete result of one fact check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebVerification {
    pub claim: String,
    /// Confidence in [0, 1] that the claim is supported by the sources.
    pub web_confidence: f64,
    pub verdict: WebVerdict,
    /// Sources sorted by semantic score, best first.
    pub sources: Vec<WebSource>,
    /// Set when the search itself failed or returned nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebVerification {
    fn uncertain(claim: &str, error: impl Into<String>) -> Self {
        Self {
            claim: claim.to_string(),
            web_confidence: 0.0,
            verdict: WebVerdict::Uncertain,
            sources: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The fact-check pipeline over injected search and similarity providers.
pub struct WebVerifier {
    search: Arc<dyn SearchProvider>,
    similarity: Arc<dyn TextSimilarity>,
}

impl WebVerifier {
    pub fn new(search: Arc<dyn SearchProvider>, similarity: Arc<dyn TextSimilarity>) -> Self {
        Self { search, similarity }
    }

    /// Verify a factual claim against live sources.  Never raises.
    pub async fn verify(
        &self,
        claim: &str,
        search_depth: &str,
        max_results: usize,
    ) -> WebVerification {
        let hits = match self.search.search(claim, search_depth, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "web search failed");
                return WebVerification::uncertain(claim, format!("search failed: {e}"));
            }
        };

        if hits.is_empty() {
            return WebVerification::uncertain(claim, "no search results returned");
        }

        // Score every snippet against the claim. A snippet whose similarity
        // call fails is dropped rather than failing the whole check.
        let mut sources: Vec<WebSource> = Vec::with_capacity(hits.len());
        for hit in hits {
            if hit.snippet.is_empty() {
                continue;
            }
            match self.similarity.similarity(claim, &hit.snippet).await {
                Ok(score) => {
                    let snippet = if hit.snippet.len() > SNIPPET_LIMIT {
                        hit.snippet.chars().take(SNIPPET_LIMIT).collect()
                    } else {
                        hit.snippet
                    };
                    sources.push(WebSource {
                        url: hit.url,
                        title: hit.title,
                        snippet,
                        relevance: hit.relevance,
                        semantic_score: score.clamp(0.0, 1.0),
                    });
                }
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "snippet similarity failed; dropping source");
                }
            }
        }

        if sources.is_empty() {
            return WebVerification::uncertain(claim, "no scorable search results");
        }

        sources.sort_by(|a, b| {
            b.semantic_score
                .partial_cmp(&a.semantic_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top = &sources[..sources.len().min(3)];
        let web_confidence = {
            let mean = top.iter().map(|s| s.semantic_score).sum::<f64>() / top.len() as f64;
            (mean * 10_000.0).round() / 10_000.0
        };

        let verdict = if web_confidence >= SUPPORTED_THRESHOLD {
            WebVerdict::Supported
        } else if web_confidence <= CONTRADICTED_THRESHOLD {
            WebVerdict::Contradicted
        } else {
            WebVerdict::Uncertain
        };

        debug!(web_confidence, verdict = %verdict, sources = sources.len(), "fact check complete");

        WebVerification {
            claim: claim.to_string(),
            web_confidence,
            verdict,
            sources,
            error: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
