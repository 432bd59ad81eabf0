//! Shared fixtures for the integration tests: Unity project trees,
//! deterministic embedders and a call-counting store.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use unity_context::access::SourceAccess;
use unity_context::config::{Config, IndexMode};
use unity_context::indexer::Indexer;
use unity_context_core::embedding::EmbeddingProvider;
use unity_context_core::models::{AssetKind, DocumentMetadata, IndexedDocument};
use unity_context_core::store::memory::InMemoryVectorStore;
use unity_context_core::store::{ScoredDocument, StoreFilter, StoreStats, VectorStore};

pub const EDITOR_VERSION: &str = "2022.3.10f1";

/// Bag-of-words hashed into a small vector. Shared words mean higher
/// similarity; the last component keeps every vector non-zero.
pub struct HashEmbedder;

pub const HASH_DIMS: usize = 32;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        HASH_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; HASH_DIMS];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            vector[hash as usize % (HASH_DIMS - 1)] += 1.0;
        }
        vector[HASH_DIMS - 1] = 1.0;
        Ok(vector)
    }
}

/// Embeds every text as the unit x-axis. Documents stored with
/// `(s, sqrt(1 - s²))` then score exactly `s` against any query.
pub struct AxisEmbedder;

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn model_name(&self) -> &str {
        "axis-test"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

/// Every call fails, as an unreachable embedding endpoint would.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    fn dims(&self) -> usize {
        HASH_DIMS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("embedding endpoint unavailable")
    }
}

/// [`HashEmbedder`] that sleeps on every call and records how many calls
/// were running at once.
#[derive(Default)]
pub struct SlowEmbedder {
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow-test"
    }

    fn dims(&self) -> usize {
        HASH_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        HashEmbedder.embed(text).await
    }
}

pub fn vector_scoring(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).sqrt()]
}

/// Counts every call before delegating to an in-memory store. Upserts can
/// be switched to fail.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryVectorStore,
    pub upserts: AtomicUsize,
    pub queries: AtomicUsize,
    pub deletes: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub largest_batch: AtomicUsize,
    pub fail_upserts: AtomicBool,
}

impl CountingStore {
    pub fn failing_upserts() -> Self {
        let store = Self::default();
        store.fail_upserts.store(true, Ordering::SeqCst);
        store
    }

    pub fn total_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
            + self.queries.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in [
            &self.upserts,
            &self.queries,
            &self.deletes,
            &self.stats_calls,
            &self.largest_batch,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn upsert_batch(&self, records: &[IndexedDocument]) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(records.len(), Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            bail!("vector store rejected the batch");
        }
        self.inner.upsert_batch(records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&StoreFilter>,
    ) -> Result<Vec<ScoredDocument>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(vector, top_k, filter).await
    }

    async fn list_ids(&self, filter: &StoreFilter) -> Result<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.list_ids(filter).await
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_one(id).await
    }

    async fn delete_many(&self, filter: &StoreFilter) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_many(filter).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stats().await
    }
}

pub fn script_source(name: &str) -> String {
    format!(
        "using UnityEngine;\n\nnamespace Game\n{{\n    public class {name} : MonoBehaviour\n    {{\n        private float _speed = 5f;\n\n        private void Update()\n        {{\n            transform.Translate(Vector3.forward * _speed * Time.deltaTime);\n        }}\n    }}\n}}\n"
    )
}

/// A Unity project with a version descriptor and one script per name under
/// `Assets/Scripts`.
pub fn unity_project(scripts: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("Assets/Scripts")).unwrap();
    fs::create_dir_all(dir.path().join("ProjectSettings")).unwrap();
    fs::write(
        dir.path().join("ProjectSettings/ProjectVersion.txt"),
        format!(
            "m_EditorVersion: {}\nm_EditorVersionWithRevision: {} (ff3792e53c62)\n",
            EDITOR_VERSION, EDITOR_VERSION
        ),
    )
    .unwrap();
    for name in scripts {
        write_script(dir.path(), name);
    }
    dir
}

pub fn write_script(root: &Path, name: &str) {
    fs::write(
        root.join(format!("Assets/Scripts/{}.cs", name)),
        script_source(name),
    )
    .unwrap();
}

pub fn config(mode: IndexMode) -> Config {
    let mut config = Config::default();
    config.indexing.mode = mode;
    config.retrieval.min_score = 0.0;
    config
}

pub fn indexer(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: &Config,
) -> (Arc<SourceAccess>, Arc<Indexer>) {
    let access = Arc::new(SourceAccess::new());
    let indexer = Indexer::new(store, embedder, Arc::clone(&access), config).unwrap();
    (access, Arc::new(indexer))
}

pub fn seeded_document(
    id: &str,
    project_id: &str,
    kind: AssetKind,
    file_path: &str,
    content: &str,
    embedding: Vec<f32>,
) -> IndexedDocument {
    IndexedDocument {
        id: id.to_string(),
        content: content.to_string(),
        embedding,
        metadata: DocumentMetadata {
            project_id: project_id.to_string(),
            project_name: "Demo".to_string(),
            file_type: kind,
            file_path: file_path.to_string(),
            language: kind.language().to_string(),
            tool_version: EDITOR_VERSION.to_string(),
            chunk_index: 0,
            class_name: None,
            namespace: None,
            methods: Vec::new(),
            dependencies: Vec::new(),
            created_at: 0,
            updated_at: 0,
        },
    }
}
