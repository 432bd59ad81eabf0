//! Incremental index maintenance.
//!
//! [`IndexMaintainer::watch_project`] opens one file-system subscription per
//! session and runs an event loop that:
//!
//! - drops events for non-scripts, dot-paths and excluded directories;
//! - coalesces bursts per path inside the debounce window, keeping the
//!   latest event kind;
//! - runs at most one re-index per path at a time; an event arriving while
//!   that path is in flight is held until the run finishes.
//!
//! Stopping a session drops the subscription, which ends the loop. Work
//! already dispatched runs to completion.

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, error, info};

use unity_context_core::models::ProjectIdentity;

use crate::access::{FileEvent, FileEventKind, FileSubscription, SourceAccess};
use crate::indexer::Indexer;

/// What happened to one file after a change event was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Reindexed { documents: usize },
    Removed { documents: u64 },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub session_id: String,
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub outcome: ChangeOutcome,
}

pub type ChangeCallback = Arc<dyn Fn(&ChangeNotice) + Send + Sync>;

/// Public view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSession {
    pub id: String,
    pub root_path: PathBuf,
    pub is_active: bool,
}

struct ActiveSession {
    root: PathBuf,
    _subscription: FileSubscription,
}

pub struct IndexMaintainer {
    indexer: Arc<Indexer>,
    access: Arc<SourceAccess>,
    debounce: Duration,
    sessions: Mutex<HashMap<String, ActiveSession>>,
}

impl IndexMaintainer {
    pub fn new(indexer: Arc<Indexer>, access: Arc<SourceAccess>, debounce: Duration) -> Self {
        Self {
            indexer,
            access,
            debounce,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `root`. Must be called from within a tokio runtime.
    pub fn watch_project(&self, root: &Path, on_change: Option<ChangeCallback>) -> Result<String> {
        let project = self.indexer.resolve_project(root)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.access.watch(&project.root, tx)?;
        let id = uuid::Uuid::new_v4().to_string();

        let event_loop = SessionLoop {
            session_id: id.clone(),
            indexer: Arc::clone(&self.indexer),
            project: Arc::new(project),
            debounce: self.debounce,
            on_change,
        };
        let root = event_loop.project.root.clone();
        tokio::spawn(event_loop.run(rx));

        info!(session = %id, root = %root.display(), "watching project");
        self.sessions.lock().insert(
            id.clone(),
            ActiveSession {
                root,
                _subscription: subscription,
            },
        );
        Ok(id)
    }

    /// Close the session. Unknown ids are ignored.
    pub fn stop_watching(&self, id: &str) {
        if let Some(session) = self.sessions.lock().remove(id) {
            info!(session = %id, root = %session.root.display(), "stopped watching");
        }
    }

    pub fn sessions(&self) -> Vec<WatchSession> {
        let mut sessions: Vec<WatchSession> = self
            .sessions
            .lock()
            .iter()
            .map(|(id, s)| WatchSession {
                id: id.clone(),
                root_path: s.root.clone(),
                is_active: true,
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }
}

struct SessionLoop {
    session_id: String,
    indexer: Arc<Indexer>,
    project: Arc<ProjectIdentity>,
    debounce: Duration,
    on_change: Option<ChangeCallback>,
}

impl SessionLoop {
    async fn run(self, mut rx: UnboundedReceiver<FileEvent>) {
        let this = Arc::new(self);
        let mut pending: HashMap<PathBuf, (FileEventKind, Instant)> = HashMap::new();
        let mut in_flight: HashSet<PathBuf> = HashSet::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut tick = tokio::time::interval((this.debounce / 2).max(Duration::from_millis(10)));

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        if this.indexer.is_watched_script(&this.project.root, &event.path) {
                            debug!(path = %event.path.display(), kind = event.kind.as_str(), "change queued");
                            pending.insert(event.path, (event.kind, Instant::now()));
                        }
                    }
                    None => break,
                },
                Some(path) = done_rx.recv() => {
                    in_flight.remove(&path);
                }
                _ = tick.tick() => {}
            }

            let now = Instant::now();
            let due: Vec<PathBuf> = pending
                .iter()
                .filter(|(path, (_, at))| {
                    now.duration_since(*at) >= this.debounce && !in_flight.contains(*path)
                })
                .map(|(path, _)| path.clone())
                .collect();

            for path in due {
                let Some((kind, _)) = pending.remove(&path) else {
                    continue;
                };
                in_flight.insert(path.clone());
                let worker = Arc::clone(&this);
                let done = done_tx.clone();
                tokio::spawn(async move {
                    worker.process(&path, kind).await;
                    let _ = done.send(path);
                });
            }
        }

        debug!(session = %this.session_id, dropped = pending.len(), "watch session loop ended");
    }

    async fn process(&self, path: &Path, kind: FileEventKind) {
        let outcome = match kind {
            FileEventKind::Add | FileEventKind::Change => {
                match self.indexer.reindex_file(&self.project, path).await {
                    Ok(documents) => ChangeOutcome::Reindexed { documents },
                    Err(e) => ChangeOutcome::Failed {
                        message: format!("{:#}", e),
                    },
                }
            }
            FileEventKind::Unlink => match self.indexer.remove_file(&self.project, path).await {
                Ok(documents) => ChangeOutcome::Removed { documents },
                Err(e) => ChangeOutcome::Failed {
                    message: format!("{:#}", e),
                },
            },
        };

        if let ChangeOutcome::Failed { message } = &outcome {
            error!(path = %path.display(), kind = kind.as_str(), error = %message, "incremental reindex failed");
        }

        if let Some(callback) = &self.on_change {
            callback(&ChangeNotice {
                session_id: self.session_id.clone(),
                path: path.to_path_buf(),
                kind,
                outcome,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use unity_context_core::embedding::EmbeddingProvider;
    use unity_context_core::store::memory::InMemoryVectorStore;

    /// Counts calls and sleeps so overlapping runs would be observable.
    struct SlowEmbedder {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    fn setup() -> (TempDir, Arc<SlowEmbedder>, Arc<InMemoryVectorStore>, Arc<Indexer>) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Assets/Scripts")).unwrap();
        std::fs::write(
            dir.path().join("Assets/Scripts/Player.cs"),
            "public class Player { }",
        )
        .unwrap();
        let embedder = Arc::new(SlowEmbedder {
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let access = Arc::new(SourceAccess::new());
        let indexer = Arc::new(
            Indexer::new(store.clone(), embedder.clone(), access, &Config::default()).unwrap(),
        );
        (dir, embedder, store, indexer)
    }

    fn spawn_loop(
        indexer: Arc<Indexer>,
        root: &Path,
        debounce: Duration,
    ) -> (
        mpsc::UnboundedSender<FileEvent>,
        Arc<Mutex<Vec<ChangeNotice>>>,
        tokio::task::JoinHandle<()>,
        PathBuf,
    ) {
        let project = indexer.resolve_project(root).unwrap();
        let root = project.root.clone();
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        let event_loop = SessionLoop {
            session_id: "test".to_string(),
            indexer,
            project: Arc::new(project),
            debounce,
            on_change: Some(Arc::new(move |n: &ChangeNotice| sink.lock().push(n.clone()))),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(event_loop.run(rx));
        (tx, notices, handle, root)
    }

    async fn wait_for(notices: &Arc<Mutex<Vec<ChangeNotice>>>, count: usize) {
        for _ in 0..200 {
            if notices.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_burst_coalesces_to_one_reindex() {
        let (dir, embedder, store, indexer) = setup();
        let (tx, notices, _handle, root) =
            spawn_loop(indexer, dir.path(), Duration::from_millis(100));
        let script = root.join("Assets/Scripts/Player.cs");

        for _ in 0..5 {
            tx.send(FileEvent {
                path: script.clone(),
                kind: FileEventKind::Change,
            })
            .unwrap();
        }
        wait_for(&notices, 1).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let notices = notices.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].outcome, ChangeOutcome::Reindexed { documents: 1 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_path_never_overlaps() {
        let (dir, embedder, _store, indexer) = setup();
        let (tx, notices, _handle, root) =
            spawn_loop(indexer, dir.path(), Duration::from_millis(10));
        let script = root.join("Assets/Scripts/Player.cs");

        tx.send(FileEvent {
            path: script.clone(),
            kind: FileEventKind::Change,
        })
        .unwrap();
        // Arrives while the first run is still embedding.
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(FileEvent {
            path: script.clone(),
            kind: FileEventKind::Change,
        })
        .unwrap();

        wait_for(&notices, 2).await;
        assert_eq!(notices.lock().len(), 2);
        assert_eq!(embedder.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ignores_dot_paths_and_non_scripts() {
        let (dir, embedder, _store, indexer) = setup();
        let (tx, notices, _handle, root) =
            spawn_loop(indexer, dir.path(), Duration::from_millis(10));

        for rel in ["Assets/.hidden/Thing.cs", "Assets/Scripts/readme.md", "Library/Cache.cs"] {
            tx.send(FileEvent {
                path: root.join(rel),
                kind: FileEventKind::Change,
            })
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(notices.lock().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_ends_when_sender_dropped() {
        let (dir, _embedder, _store, indexer) = setup();
        let (tx, _notices, handle, _root) =
            spawn_loop(indexer, dir.path(), Duration::from_millis(10));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should end")
            .unwrap();
    }
}
