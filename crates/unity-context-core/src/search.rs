//! Similarity retrieval with threshold filtering and relevance banding.
//!
//! The retrieval primitive operates entirely through the [`VectorStore`] and
//! [`EmbeddingProvider`] traits. The calling application builds a
//! [`RetrievalRequest`] and passes the store and provider it owns.
//!
//! # Algorithm
//!
//! 1. Embed the query text.
//! 2. Ask the store for the `top_k` nearest neighbours under the filter.
//! 3. Drop every hit scoring below `min_score`.
//! 4. Band the rest: `> 0.85` high, `> 0.75` medium, otherwise low.
//! 5. Sort by score (desc), then id (asc).

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::embedding::EmbeddingProvider;
use crate::error::Error;
use crate::models::IndexedDocument;
use crate::store::{ScoredDocument, StoreFilter, VectorStore};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SCORE: f32 = 0.7;
const HIGH_BAND_FLOOR: f32 = 0.85;
const MEDIUM_BAND_FLOOR: f32 = 0.75;

/// Coarse classification of a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceBand {
    High,
    Medium,
    Low,
}

impl RelevanceBand {
    pub fn from_score(score: f32) -> Self {
        if score > HIGH_BAND_FLOOR {
            RelevanceBand::High
        } else if score > MEDIUM_BAND_FLOOR {
            RelevanceBand::Medium
        } else {
            RelevanceBand::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelevanceBand::High => "high",
            RelevanceBand::Medium => "medium",
            RelevanceBand::Low => "low",
        }
    }
}

impl fmt::Display for RelevanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A banded hit, derived at query time and never persisted.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: IndexedDocument,
    pub score: f32,
    pub relevance: RelevanceBand,
}

/// Bundles all inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub top_k: usize,
    pub min_score: f32,
    pub filter: Option<StoreFilter>,
}

impl<'a> RetrievalRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            filter: None,
        }
    }
}

/// Embed the query, search the store, and band what clears the threshold.
///
/// Embedding or store failures propagate as [`Error::Upstream`].
pub async fn retrieve(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    req: &RetrievalRequest<'_>,
) -> Result<Vec<SearchResult>> {
    if req.query.trim().is_empty() || req.top_k == 0 {
        return Ok(Vec::new());
    }

    let vector = embedder
        .embed(req.query)
        .await
        .map_err(|e| Error::upstream("embedding provider", format!("{:#}", e)))?;

    let hits = store
        .query(&vector, req.top_k, req.filter.as_ref())
        .await
        .map_err(|e| Error::upstream("vector store", format!("{:#}", e)))?;

    Ok(rank_hits(hits, req.min_score))
}

/// Drop hits below `min_score`, band the rest, and sort by descending score.
pub fn rank_hits(hits: Vec<ScoredDocument>, min_score: f32) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .filter(|h| h.score >= min_score)
        .map(|h| SearchResult {
            relevance: RelevanceBand::from_score(h.score),
            score: h.score,
            document: h.document,
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, DocumentMetadata};

    fn hit(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            score,
            document: IndexedDocument {
                id: id.into(),
                content: String::new(),
                embedding: vec![],
                metadata: DocumentMetadata {
                    project_id: "p".into(),
                    project_name: "P".into(),
                    file_type: AssetKind::Script,
                    file_path: format!("{}.cs", id),
                    language: "csharp".into(),
                    tool_version: "unknown".into(),
                    chunk_index: 0,
                    class_name: None,
                    namespace: None,
                    methods: vec![],
                    dependencies: vec![],
                    created_at: 0,
                    updated_at: 0,
                },
            },
        }
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(RelevanceBand::from_score(0.99), RelevanceBand::High);
        assert_eq!(RelevanceBand::from_score(0.8501), RelevanceBand::High);
        assert_eq!(RelevanceBand::from_score(0.85), RelevanceBand::Medium);
        assert_eq!(RelevanceBand::from_score(0.76), RelevanceBand::Medium);
        assert_eq!(RelevanceBand::from_score(0.75), RelevanceBand::Low);
        assert_eq!(RelevanceBand::from_score(0.70), RelevanceBand::Low);
    }

    #[test]
    fn test_band_total_over_unit_interval() {
        for i in 0..=1000 {
            let s = i as f32 / 1000.0;
            let band = RelevanceBand::from_score(s);
            match band {
                RelevanceBand::High => assert!(s > 0.85),
                RelevanceBand::Medium => assert!(s > 0.75 && s <= 0.85),
                RelevanceBand::Low => assert!(s <= 0.75),
            }
        }
    }

    #[test]
    fn test_rank_drops_below_threshold_and_sorts() {
        let ranked = rank_hits(
            vec![hit("low", 0.72), hit("gone", 0.69), hit("top", 0.9), hit("mid", 0.8)],
            DEFAULT_MIN_SCORE,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid", "low"]);
        let bands: Vec<RelevanceBand> = ranked.iter().map(|r| r.relevance).collect();
        assert_eq!(
            bands,
            vec![RelevanceBand::High, RelevanceBand::Medium, RelevanceBand::Low]
        );
    }

    #[test]
    fn test_band_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RelevanceBand::Medium).unwrap(),
            "\"medium\""
        );
    }
}
