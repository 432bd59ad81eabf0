//! Sandboxed file access.
//!
//! [`SourceAccess`] reads, lists and watches files only beneath roots that
//! were explicitly allowed. Every call is checked against the allow-list
//! before it touches the filesystem and fails with
//! [`Error::AccessDenied`] otherwise.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use walkdir::WalkDir;

use unity_context_core::models::SourceUnit;
use unity_context_core::Error;

/// Kind of a file-system change, as seen by the index maintainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Add,
    Change,
    Unlink,
}

impl FileEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileEventKind::Add => "add",
            FileEventKind::Change => "change",
            FileEventKind::Unlink => "unlink",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Which files [`SourceAccess::list_files`] returns. Globs are matched
/// against the path relative to the listed root.
#[derive(Debug, Clone)]
pub struct FileFilter {
    pub recursive: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl FileFilter {
    pub fn include(globs: &[&str]) -> Self {
        Self {
            recursive: true,
            include_globs: globs.iter().map(|g| g.to_string()).collect(),
            exclude_globs: Vec::new(),
        }
    }

    pub fn excluding(mut self, globs: &[String]) -> Self {
        self.exclude_globs.extend(globs.iter().cloned());
        self
    }
}

/// A live file-system subscription. Dropping it stops event delivery.
pub struct FileSubscription {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileSubscription {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Default)]
pub struct SourceAccess {
    roots: RwLock<Vec<PathBuf>>,
}

impl SourceAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow every root in `roots`. Roots that do not exist are skipped
    /// with a warning.
    pub fn with_roots(roots: &[PathBuf]) -> Self {
        let access = Self::new();
        for root in roots {
            if let Err(e) = access.allow(root) {
                warn!(root = %root.display(), error = %e, "skipping allowed root");
            }
        }
        access
    }

    /// Add `root` to the allow-list and return its canonical form.
    pub fn allow(&self, root: &Path) -> Result<PathBuf> {
        let canonical = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve root: {}", root.display()))?;
        let mut roots = self.roots.write();
        if !roots.contains(&canonical) {
            debug!(root = %canonical.display(), "allowed root");
            roots.push(canonical.clone());
        }
        Ok(canonical)
    }

    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        self.roots.read().clone()
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        let resolved = resolve(path);
        self.roots.read().iter().any(|root| resolved.starts_with(root))
    }

    fn check(&self, path: &Path) -> Result<PathBuf> {
        let resolved = resolve(path);
        if self.roots.read().iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(Error::AccessDenied {
                path: path.to_path_buf(),
            }
            .into())
        }
    }

    /// Read one file as UTF-8 text.
    pub fn read_file(&self, path: &Path) -> Result<SourceUnit> {
        let resolved = self.check(path)?;
        let bytes = std::fs::read(&resolved)
            .with_context(|| format!("Failed to read {}", resolved.display()))?;
        let raw_content = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", resolved.display()))?;
        let meta = std::fs::metadata(&resolved)?;
        let modified_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(SourceUnit {
            path: resolved,
            size_bytes: meta.len(),
            raw_content,
            modified_at,
        })
    }

    /// List files under `root` matching `filter`, sorted by path.
    pub fn list_files(&self, root: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
        let root = self.check(root)?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let include_set = build_globset(&filter.include_globs)?;
        let exclude_set = build_globset(&filter.exclude_globs)?;

        let mut walker = WalkDir::new(&root);
        if !filter.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !filter.include_globs.is_empty() && !include_set.is_match(&rel_str) {
                continue;
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Subscribe to changes under `root`. Events are sent on `tx` until the
    /// returned subscription is dropped.
    pub fn watch(&self, root: &Path, tx: UnboundedSender<FileEvent>) -> Result<FileSubscription> {
        let root = self.check(root)?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for file_event in translate(&event) {
                        // Receiver gone means the session is closing.
                        let _ = tx.send(file_event);
                    }
                }
                Err(e) => warn!(error = %e, "watcher error"),
            }
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        Ok(FileSubscription {
            root,
            _watcher: watcher,
        })
    }
}

/// Canonical path where possible; for files that no longer exist, the
/// canonical parent joined with the file name.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn translate(event: &Event) -> Vec<FileEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => Some(FileEventKind::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEventKind::Add),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileEventKind::Change),
        EventKind::Remove(_) => Some(FileEventKind::Unlink),
        _ => None,
    };
    let Some(kind) = kind else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .map(|path| {
            // Renames with both ends reported, and modify events for paths
            // that are already gone, are resolved by existence.
            let kind = match kind {
                FileEventKind::Change | FileEventKind::Add if !path.exists() => {
                    FileEventKind::Unlink
                }
                FileEventKind::Unlink if path.exists() => FileEventKind::Add,
                k => k,
            };
            FileEvent {
                path: path.clone(),
                kind,
            }
        })
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Assets/Scripts/AI")).unwrap();
        fs::create_dir_all(dir.path().join("Library")).unwrap();
        fs::write(dir.path().join("Assets/Scripts/Player.cs"), "class Player {}").unwrap();
        fs::write(dir.path().join("Assets/Scripts/AI/Enemy.cs"), "class Enemy {}").unwrap();
        fs::write(dir.path().join("Assets/Scripts/notes.txt"), "notes").unwrap();
        fs::write(dir.path().join("Library/Cache.cs"), "class Cache {}").unwrap();
        dir
    }

    #[test]
    fn test_denies_outside_roots() {
        let dir = project();
        let access = SourceAccess::new();
        let err = access
            .read_file(&dir.path().join("Assets/Scripts/Player.cs"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_denies_parent_escape() {
        let dir = project();
        let access = SourceAccess::new();
        access.allow(&dir.path().join("Assets")).unwrap();
        let escaped = dir.path().join("Assets/../Library/Cache.cs");
        assert!(!access.is_allowed(&escaped));
        assert!(access.read_file(&escaped).is_err());
    }

    #[test]
    fn test_read_file() {
        let dir = project();
        let access = SourceAccess::new();
        access.allow(dir.path()).unwrap();
        let unit = access
            .read_file(&dir.path().join("Assets/Scripts/Player.cs"))
            .unwrap();
        assert_eq!(unit.raw_content, "class Player {}");
        assert_eq!(unit.size_bytes, 15);
        assert_eq!(unit.base_name(), "Player");
    }

    #[test]
    fn test_read_rejects_invalid_utf8() {
        let dir = project();
        let bad = dir.path().join("Assets/Scripts/Bad.cs");
        fs::write(&bad, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        let access = SourceAccess::new();
        access.allow(dir.path()).unwrap();
        let err = access.read_file(&bad).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_list_files_with_globs() {
        let dir = project();
        let access = SourceAccess::new();
        let root = access.allow(dir.path()).unwrap();

        let filter = FileFilter::include(&["**/*.cs"]).excluding(&["Library/**".to_string()]);
        let files = access.list_files(&root, &filter).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["Assets/Scripts/AI/Enemy.cs", "Assets/Scripts/Player.cs"]);
    }

    #[test]
    fn test_list_files_non_recursive() {
        let dir = project();
        let access = SourceAccess::new();
        access.allow(dir.path()).unwrap();
        let scripts = dir.path().join("Assets/Scripts");
        let mut filter = FileFilter::include(&["*.cs"]);
        filter.recursive = false;
        let files = access.list_files(&scripts, &filter).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("Player.cs"));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = project();
        let access = SourceAccess::new();
        access.allow(dir.path()).unwrap();
        let files = access
            .list_files(&dir.path().join("Assets/Nope"), &FileFilter::include(&["**/*"]))
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_translate_events() {
        let dir = project();
        let existing = dir.path().join("Assets/Scripts/Player.cs");
        let gone = dir.path().join("Assets/Scripts/Gone.cs");

        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(existing.clone());
        assert_eq!(translate(&modify)[0].kind, FileEventKind::Change);

        let modify_gone = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(gone.clone());
        assert_eq!(translate(&modify_gone)[0].kind, FileEventKind::Unlink);

        let remove = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(gone.clone());
        assert_eq!(translate(&remove)[0].kind, FileEventKind::Unlink);

        let access_ev = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(existing);
        assert!(translate(&access_ev).is_empty());
    }
}
