//! In-memory [`VectorStore`] for tests and single-process runs.
//!
//! Records live in a `HashMap` behind a `parking_lot::RwLock`. Queries are
//! brute-force cosine similarity over every record matching the filter.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::Error;
use crate::models::IndexedDocument;

use super::{ScoredDocument, StoreFilter, StoreStats, VectorStore, MAX_UPSERT_BATCH};

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, IndexedDocument>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, sorted by id.
    pub fn documents(&self) -> Vec<IndexedDocument> {
        let mut docs: Vec<IndexedDocument> = self.records.read().values().cloned().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_batch(&self, records: &[IndexedDocument]) -> Result<()> {
        if records.len() > MAX_UPSERT_BATCH {
            return Err(Error::BatchTooLarge {
                size: records.len(),
                max: MAX_UPSERT_BATCH,
            }
            .into());
        }

        let mut stored = self.records.write();
        let expected = stored
            .values()
            .next()
            .or_else(|| records.first())
            .map(|d| d.embedding.len());
        for record in records {
            let dims = expected.unwrap_or(record.embedding.len());
            if record.embedding.len() != dims {
                bail!(
                    "vector dimension mismatch for {}: expected {}, got {}",
                    record.id,
                    dims,
                    record.embedding.len()
                );
            }
        }
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&StoreFilter>,
    ) -> Result<Vec<ScoredDocument>> {
        let stored = self.records.read();
        let mut hits: Vec<ScoredDocument> = stored
            .values()
            .filter(|d| filter.map_or(true, |f| f.matches(&d.metadata)))
            .map(|d| ScoredDocument {
                score: cosine_similarity(vector, &d.embedding),
                document: d.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn list_ids(&self, filter: &StoreFilter) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|d| filter.matches(&d.metadata))
            .map(|d| d.id.clone())
            .collect())
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    async fn delete_many(&self, filter: &StoreFilter) -> Result<u64> {
        if filter.is_empty() {
            bail!("refusing to delete with an empty filter");
        }
        let mut stored = self.records.write();
        let before = stored.len();
        stored.retain(|_, d| !filter.matches(&d.metadata));
        Ok((before - stored.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let stored = self.records.read();
        Ok(StoreStats {
            count: stored.len(),
            dimension: stored.values().next().map_or(0, |d| d.embedding.len()),
        })
    }
}
