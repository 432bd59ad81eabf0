//! Project indexing pipeline.
//!
//! Orchestrates scan → extract → chunk → embed → store for a whole Unity
//! project and for single files:
//!
//! ```text
//! Assets/**/*.cs ──▶ read ──▶ extract_metadata ──▶ chunk_source ──┐
//! Assets/**/*.prefab ──▶ placeholder description ─────────────────┤
//! Assets/**/*.unity  ──▶ placeholder description ─────────────────┤
//!                                                                 ▼
//!                           embed (bounded concurrency) ──▶ upsert_batch (≤100)
//! ```
//!
//! Per-file failures are logged and counted in [`IndexReport::errors`];
//! they never abort the run. Embedding or store failures are fatal.
//!
//! # Document ids
//!
//! In [`IndexMode::Replace`] ids are derived from the project and the
//! file's relative path (`{pathDigest}-{baseName}-chunk-{n}`). New
//! documents are written first; only once every batch has landed are the
//! leftover ids of the project (or file) deleted. A failed run therefore
//! never removes documents committed by an earlier one, and re-indexing an
//! unchanged tree leaves the document count unchanged. In
//! [`IndexMode::Append`] every run mints a random token per file and
//! nothing is deleted.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use unity_context_core::chunk::{chunk_paragraphs, chunk_source};
use unity_context_core::extract::extract_metadata;
use unity_context_core::models::{
    AssetKind, DocumentMetadata, IndexReport, IndexedDocument, ProjectIdentity, SourceUnit,
    UnitMetadata,
};

use crate::access::{FileFilter, SourceAccess};
use crate::config::{ChunkingConfig, Config, IndexMode, IndexingConfig};
use crate::embedding::EmbeddingProvider;
use crate::store::{StoreFilter, VectorStore};

const PROJECT_DESCRIPTOR: &str = "ProjectSettings/ProjectVersion.txt";
const UNKNOWN_VERSION: &str = "unknown";

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    access: Arc<SourceAccess>,
    chunking: ChunkingConfig,
    indexing: IndexingConfig,
    excludes: GlobSet,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        access: Arc<SourceAccess>,
        config: &Config,
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.indexing.exclude_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            store,
            embedder,
            access,
            chunking: config.chunking.clone(),
            indexing: config.indexing.clone(),
            excludes: builder.build()?,
        })
    }

    pub fn mode(&self) -> IndexMode {
        self.indexing.mode
    }

    /// Allow `root` and work out who the project is.
    ///
    /// A missing or unreadable `ProjectSettings/ProjectVersion.txt` yields
    /// version `"unknown"`.
    pub fn resolve_project(&self, root: &Path) -> Result<ProjectIdentity> {
        let root = self.access.allow(root)?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());

        let unity_version = match self.access.read_file(&root.join(PROJECT_DESCRIPTOR)) {
            Ok(unit) => parse_editor_version(&unit.raw_content)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            Err(e) => {
                debug!(root = %root.display(), error = %e, "no project descriptor");
                UNKNOWN_VERSION.to_string()
            }
        };

        Ok(ProjectIdentity {
            id: hex_digest(root.to_string_lossy().as_bytes(), 16),
            name,
            root,
            unity_version,
        })
    }

    /// Index every script, prefab and scene under `root`.
    pub async fn index_project(&self, root: &Path) -> Result<IndexReport> {
        let project = self.resolve_project(root)?;
        info!(
            project = %project.name,
            root = %project.root.display(),
            unity_version = %project.unity_version,
            mode = ?self.indexing.mode,
            "indexing project"
        );

        let mut written = HashSet::new();
        let mut report = self.index_scripts(&project, &mut written).await?;
        report.merge(
            self.index_placeholders(&project, AssetKind::Prefab, &mut written)
                .await?,
        );
        report.merge(
            self.index_placeholders(&project, AssetKind::Scene, &mut written)
                .await?,
        );
        self.prune_stale(&StoreFilter::project(&project.id), &written)
            .await?;

        info!(
            project = %project.name,
            total_files = report.total_files,
            indexed = report.indexed,
            errors = report.errors,
            "indexing complete"
        );
        Ok(report)
    }

    async fn index_scripts(
        &self,
        project: &ProjectIdentity,
        written: &mut HashSet<String>,
    ) -> Result<IndexReport> {
        let files = self.list(&project.root, &["**/*.cs"])?;
        let mut report = IndexReport {
            total_files: files.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for path in &files {
            match self.script_documents(project, path) {
                Ok(docs) => {
                    if !docs.is_empty() {
                        report.indexed += 1;
                    }
                    pending.extend(docs);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "failed to index script");
                    report.errors += 1;
                }
            }
            if pending.len() >= self.indexing.upsert_batch_size {
                self.write_documents(std::mem::take(&mut pending), written)
                    .await?;
            }
        }
        self.write_documents(pending, written).await?;

        Ok(report)
    }

    async fn index_placeholders(
        &self,
        project: &ProjectIdentity,
        kind: AssetKind,
        written: &mut HashSet<String>,
    ) -> Result<IndexReport> {
        let glob = match kind {
            AssetKind::Prefab => "**/*.prefab",
            AssetKind::Scene => "**/*.unity",
            _ => return Ok(IndexReport::default()),
        };
        let files = self.list(&project.root, &[glob])?;
        let mut report = IndexReport {
            total_files: files.len(),
            ..Default::default()
        };

        let mut pending = Vec::with_capacity(files.len());
        for path in &files {
            match self.placeholder_document(project, path, kind) {
                Ok(doc) => {
                    report.indexed += 1;
                    pending.push(doc);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "failed to index asset");
                    report.errors += 1;
                }
            }
        }
        self.write_documents(pending, written).await?;

        Ok(report)
    }

    /// Re-read one script and replace its documents. Returns how many
    /// documents were written.
    pub async fn reindex_file(&self, project: &ProjectIdentity, path: &Path) -> Result<usize> {
        let docs = self.script_documents(project, path)?;
        let count = docs.len();
        let mut written = HashSet::with_capacity(count);
        self.write_documents(docs, &mut written).await?;
        let rel = relative_path(&project.root, path);
        self.prune_stale(
            &StoreFilter::project(&project.id).with_file_path(rel),
            &written,
        )
        .await?;
        debug!(path = %path.display(), documents = count, "reindexed file");
        Ok(count)
    }

    /// Drop the documents of a deleted file. In append mode this only logs.
    pub async fn remove_file(&self, project: &ProjectIdentity, path: &Path) -> Result<u64> {
        match self.indexing.mode {
            IndexMode::Append => {
                info!(path = %path.display(), "file removed; append mode keeps its documents");
                Ok(0)
            }
            IndexMode::Replace => {
                let rel = relative_path(&project.root, path);
                let removed = self
                    .store
                    .delete_many(&StoreFilter::project(&project.id).with_file_path(rel))
                    .await
                    .context("Failed to remove documents of deleted file")?;
                info!(path = %path.display(), removed, "removed documents of deleted file");
                Ok(removed)
            }
        }
    }

    /// Index Markdown and plain-text API documentation under `dir` as
    /// `documentation` documents grouped under `label`.
    pub async fn index_documentation(&self, dir: &Path, label: &str) -> Result<IndexReport> {
        let root = self.access.allow(dir)?;
        let project = ProjectIdentity {
            id: format!("docs-{}", hex_digest(label.as_bytes(), 12)),
            name: label.to_string(),
            root,
            unity_version: UNKNOWN_VERSION.to_string(),
        };

        let files = self.list(&project.root, &["**/*.md", "**/*.txt"])?;
        let mut report = IndexReport {
            total_files: files.len(),
            ..Default::default()
        };

        let mut written = HashSet::new();
        let mut pending = Vec::new();
        for path in &files {
            let unit = match self.access.read_file(path) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "failed to read documentation");
                    report.errors += 1;
                    continue;
                }
            };
            let chunks = chunk_paragraphs(&unit.raw_content, self.chunking.max_chunk_chars);
            let docs = self.build_documents(
                &project,
                &unit,
                AssetKind::Documentation,
                &UnitMetadata::default(),
                chunks,
            );
            if !docs.is_empty() {
                report.indexed += 1;
            }
            pending.extend(docs);
            if pending.len() >= self.indexing.upsert_batch_size {
                self.write_documents(std::mem::take(&mut pending), &mut written)
                    .await?;
            }
        }
        self.write_documents(pending, &mut written).await?;
        self.prune_stale(&StoreFilter::project(&project.id), &written)
            .await?;

        info!(
            label,
            total_files = report.total_files,
            indexed = report.indexed,
            errors = report.errors,
            "documentation indexed"
        );
        Ok(report)
    }

    /// Whether `path` is a script the maintainer should react to: a `.cs`
    /// file under `root`, outside the exclude globs and dot-directories.
    pub fn is_watched_script(&self, root: &Path, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("cs") {
            return false;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            return false;
        };
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return false;
        }
        !self.excludes.is_match(rel.to_string_lossy().replace('\\', "/"))
    }

    fn list(&self, root: &Path, globs: &[&str]) -> Result<Vec<PathBuf>> {
        let filter = FileFilter::include(globs).excluding(&self.indexing.exclude_globs);
        self.access.list_files(root, &filter)
    }

    fn script_documents(
        &self,
        project: &ProjectIdentity,
        path: &Path,
    ) -> Result<Vec<IndexedDocument>> {
        let unit = self.access.read_file(path)?;
        let metadata = extract_metadata(&unit.raw_content);
        let chunks = chunk_source(&unit.raw_content, self.chunking.max_chunk_chars);
        Ok(self.build_documents(project, &unit, AssetKind::Script, &metadata, chunks))
    }

    fn placeholder_document(
        &self,
        project: &ProjectIdentity,
        path: &Path,
        kind: AssetKind,
    ) -> Result<IndexedDocument> {
        if !self.access.is_allowed(path) {
            anyhow::bail!("{} is outside the project root", path.display());
        }
        let rel = relative_path(&project.root, path);
        let unit = SourceUnit {
            path: path.to_path_buf(),
            raw_content: String::new(),
            size_bytes: 0,
            modified_at: Utc::now(),
        };
        let label = match kind {
            AssetKind::Scene => "Unity scene",
            _ => "Unity prefab",
        };
        let description = format!("{} {} at {}", label, unit.base_name(), rel);
        self.build_documents(project, &unit, kind, &UnitMetadata::default(), vec![description])
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no document built for {}", path.display()))
    }

    fn build_documents(
        &self,
        project: &ProjectIdentity,
        unit: &SourceUnit,
        kind: AssetKind,
        metadata: &UnitMetadata,
        chunks: Vec<String>,
    ) -> Vec<IndexedDocument> {
        let rel = relative_path(&project.root, &unit.path);
        let base = unit.base_name();
        let token = match self.indexing.mode {
            IndexMode::Replace => hex_digest(format!("{}\0{}", project.id, rel).as_bytes(), 12),
            IndexMode::Append => uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
        };
        let now = Utc::now().timestamp();

        chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| IndexedDocument {
                id: format!("{}-{}-chunk-{}", token, base, ordinal),
                content,
                embedding: Vec::new(),
                metadata: DocumentMetadata {
                    project_id: project.id.clone(),
                    project_name: project.name.clone(),
                    file_type: kind,
                    file_path: rel.clone(),
                    language: kind.language().to_string(),
                    tool_version: project.unity_version.clone(),
                    chunk_index: ordinal,
                    class_name: metadata.primary_type_name.clone(),
                    namespace: metadata.namespace.clone(),
                    methods: metadata.member_names.clone(),
                    dependencies: metadata.imported_dependencies.clone(),
                    created_at: now,
                    updated_at: now,
                },
            })
            .collect()
    }

    /// Embed with bounded concurrency, then upsert batch after batch. Ids
    /// of every batch that lands are added to `written`.
    async fn write_documents(
        &self,
        mut docs: Vec<IndexedDocument>,
        written: &mut HashSet<String>,
    ) -> Result<()> {
        for batch in docs.chunks_mut(self.indexing.upsert_batch_size) {
            let jobs: Vec<_> = batch
                .iter()
                .map(|doc| {
                    let embedder = Arc::clone(&self.embedder);
                    let text = doc.content.clone();
                    async move { embedder.embed(&text).await }
                })
                .collect();
            let vectors: Vec<Vec<f32>> = stream::iter(jobs)
                .buffered(self.indexing.embed_concurrency)
                .try_collect()
                .await
                .context("Failed to embed documents")?;
            for (doc, vector) in batch.iter_mut().zip(vectors) {
                doc.embedding = vector;
            }

            self.store
                .upsert_batch(batch)
                .await
                .with_context(|| format!("Failed to upsert batch of {} documents", batch.len()))?;
            written.extend(batch.iter().map(|doc| doc.id.clone()));
            debug!(count = batch.len(), "upserted batch");
        }
        Ok(())
    }

    /// In replace mode, delete documents under `scope` that the run just
    /// finished did not write. Append mode keeps everything.
    async fn prune_stale(&self, scope: &StoreFilter, written: &HashSet<String>) -> Result<u64> {
        if self.indexing.mode == IndexMode::Append {
            return Ok(0);
        }
        let existing = self
            .store
            .list_ids(scope)
            .await
            .context("Failed to list previous documents")?;
        let mut removed = 0;
        for id in existing.iter().filter(|id| !written.contains(*id)) {
            self.store
                .delete_one(id)
                .await
                .with_context(|| format!("Failed to delete stale document {}", id))?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "pruned stale documents");
        }
        Ok(removed)
    }
}

/// `m_EditorVersion: 2022.3.10f1` → `2022.3.10f1`.
fn parse_editor_version(descriptor: &str) -> Option<String> {
    descriptor.lines().find_map(|line| {
        line.trim()
            .strip_prefix("m_EditorVersion:")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// `/`-separated path of `path` relative to `root`.
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn hex_digest(bytes: &[u8], len: usize) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..len.min(hex.len())].to_string()
}
