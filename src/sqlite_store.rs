//! SQLite-backed [`VectorStore`].
//!
//! One row per indexed document: the payload, its metadata as JSON, and the
//! embedding as a little-endian `f32` BLOB. Similarity is brute-force cosine
//! over the rows that pass the filter, which is adequate for single-project
//! corpora of a few thousand chunks.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use unity_context_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use unity_context_core::models::{DocumentMetadata, IndexedDocument};
use unity_context_core::store::{
    ScoredDocument, StoreFilter, StoreStats, VectorStore, MAX_UPSERT_BATCH,
};
use unity_context_core::Error;

use crate::db;

/// Filter columns bound as nullable parameters: `NULL` matches every row.
const FILTER_CLAUSE: &str = "(?1 IS NULL OR project_id = ?1) \
     AND (?2 IS NULL OR file_type = ?2) \
     AND (?3 IS NULL OR file_path = ?3)";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open vector store at {}", path.display()))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_documents (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dims INTEGER NOT NULL,
                metadata_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_documents_project ON vector_documents(project_id, file_type)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_documents_path ON vector_documents(project_id, file_path)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM vector_documents LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }
}

fn filter_binds(filter: Option<&StoreFilter>) -> (Option<String>, Option<String>, Option<String>) {
    match filter {
        Some(f) => (
            f.project_id.clone(),
            f.file_type.map(|k| k.as_str().to_string()),
            f.file_path.clone(),
        ),
        None => (None, None, None),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_batch(&self, records: &[IndexedDocument]) -> Result<()> {
        if records.len() > MAX_UPSERT_BATCH {
            return Err(Error::BatchTooLarge {
                size: records.len(),
                max: MAX_UPSERT_BATCH,
            }
            .into());
        }
        let Some(first) = records.first() else {
            return Ok(());
        };

        let expected = self
            .stored_dimension()
            .await?
            .unwrap_or(first.embedding.len());
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
            bail!(
                "embedding dimension mismatch for {}: expected {}, got {}",
                bad.id,
                expected,
                bad.embedding.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for doc in records {
            let metadata_json = serde_json::to_string(&doc.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vector_documents (id, project_id, file_type, file_path, content,
                                              embedding, dims, metadata_json, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    project_id = excluded.project_id,
                    file_type = excluded.file_type,
                    file_path = excluded.file_path,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.metadata.project_id)
            .bind(doc.metadata.file_type.as_str())
            .bind(&doc.metadata.file_path)
            .bind(&doc.content)
            .bind(vec_to_blob(&doc.embedding))
            .bind(doc.embedding.len() as i64)
            .bind(&metadata_json)
            .bind(doc.metadata.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&StoreFilter>,
    ) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let (project_id, file_type, file_path) = filter_binds(filter);

        let rows = sqlx::query(&format!(
            "SELECT id, content, embedding, metadata_json FROM vector_documents WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(project_id)
        .bind(file_type)
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            let score = cosine_similarity(vector, &embedding);
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for {}", row.get::<String, _>("id")))?;
            hits.push(ScoredDocument {
                document: IndexedDocument {
                    id: row.get("id"),
                    content: row.get("content"),
                    embedding,
                    metadata,
                },
                score,
            });
        }

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
        let (project_id, file_type, file_path) = filter_binds(Some(filter));
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM vector_documents WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(project_id)
        .bind(file_type)
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vector_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, filter: &StoreFilter) -> Result<u64> {
        if filter.is_empty() {
            bail!("delete_many requires a non-empty filter");
        }
        let (project_id, file_type, file_path) = filter_binds(Some(filter));
        let result = sqlx::query(&format!(
            "DELETE FROM vector_documents WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(project_id)
        .bind(file_type)
        .bind(file_path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            count: count as usize,
            dimension: self.stored_dimension().await?.unwrap_or(0),
        })
    }
}
