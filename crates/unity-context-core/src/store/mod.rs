//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the contract the indexing pipeline writes
//! through and the retrieval engine reads through. The store is the only
//! source of truth for indexed documents; callers hold no long-lived
//! references to what they upserted.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert_batch`](VectorStore::upsert_batch) | Insert or replace up to [`MAX_UPSERT_BATCH`] records |
//! | [`query`](VectorStore::query) | Filtered nearest-neighbour search by cosine similarity |
//! | [`list_ids`](VectorStore::list_ids) | Ids of every record matching a filter |
//! | [`delete_one`](VectorStore::delete_one) | Remove a record by id |
//! | [`delete_many`](VectorStore::delete_many) | Remove every record matching a filter |
//! | [`stats`](VectorStore::stats) | Record count and vector dimension |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{AssetKind, DocumentMetadata, IndexedDocument};

/// Largest number of records accepted by a single upsert call.
pub const MAX_UPSERT_BATCH: usize = 100;

/// Conjunction of equality predicates over document metadata.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFilter {
    pub project_id: Option<String>,
    pub file_type: Option<AssetKind>,
    pub file_path: Option<String>,
}

impl StoreFilter {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn file_type(kind: AssetKind) -> Self {
        Self {
            file_type: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_file_type(mut self, kind: AssetKind) -> Self {
        self.file_type = Some(kind);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.project_id.is_none() && self.file_type.is_none() && self.file_path.is_none()
    }

    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        self.project_id
            .as_deref()
            .map_or(true, |p| p == meta.project_id)
            && self.file_type.map_or(true, |k| k == meta.file_type)
            && self
                .file_path
                .as_deref()
                .map_or(true, |p| p == meta.file_path)
    }
}

/// A query hit with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: IndexedDocument,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub count: usize,
    pub dimension: usize,
}

/// Storage backend for indexed documents.
///
/// Implementations must be `Send + Sync`; callers share them behind an `Arc`
/// and issue overlapping calls without any lock of their own.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id. Fails if `records.len() > MAX_UPSERT_BATCH`.
    async fn upsert_batch(&self, records: &[IndexedDocument]) -> Result<()>;

    /// Return up to `top_k` records ordered by descending similarity.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&StoreFilter>,
    ) -> Result<Vec<ScoredDocument>>;

    /// Ids of every record matching `filter`, in no particular order.
    async fn list_ids(&self, filter: &StoreFilter) -> Result<Vec<String>>;

    async fn delete_one(&self, id: &str) -> Result<()>;

    /// Remove every record matching `filter`, returning how many went.
    ///
    /// An empty filter is rejected rather than treated as "delete all".
    async fn delete_many(&self, filter: &StoreFilter) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;
}
