//! Vector store selection.

use anyhow::{bail, Result};
use std::sync::Arc;

pub use unity_context_core::store::memory::InMemoryVectorStore;
pub use unity_context_core::store::{
    ScoredDocument, StoreFilter, StoreStats, VectorStore, MAX_UPSERT_BATCH,
};

use crate::config::StoreConfig;
use crate::sqlite_store::SqliteVectorStore;

/// Open the backend named by `config.backend`.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorStore::open(&config.path).await?)),
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        other => bail!("Unknown store backend: {}", other),
    }
}
