//! File watcher for real-time updates.
//!
//! Raw notify events are funnelled into a tokio task, debounced, classified
//! against the last directory snapshot, and turned into at most one
//! notification per changed file plus at most one tree update per batch.

use crate::classify::{classify, Change, ChangeKind};
use crate::debounce::{Debouncer, SettledBatch};
use crate::snapshot::SnapshotStore;
use crate::tree::{TreeBuilder, TreeOptions};
use fmemo_core::{ChangeNotification, ParsedDocument};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Raw events buffered between the notify thread and the watch task.
const EVENT_BUFFER: usize = 1024;

/// Receives the notifications a watcher produces.
pub trait ChangeSink: Send + Sync + 'static {
    fn publish(&self, notification: ChangeNotification);
}

impl<T: ChangeSink + ?Sized> ChangeSink for Arc<T> {
    fn publish(&self, notification: ChangeNotification) {
        (**self).publish(notification)
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("initial scan of {path} failed: {source}")]
    InitialScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("watched root {0} is gone")]
    RootLost(PathBuf),

    #[error("watch task failed: {0}")]
    TaskFailed(String),
}

/// Options for a [`ChangeWatcher`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period before a burst of events is processed.
    pub debounce: Duration,

    /// How the tree is rebuilt after structural changes.
    pub tree: TreeOptions,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            tree: TreeOptions::default(),
        }
    }
}

type EventRx = mpsc::Receiver<notify::Result<Event>>;

/// Watches a memo root and reports changes to a [`ChangeSink`].
pub struct ChangeWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), WatchError>>>,
}

impl ChangeWatcher {
    /// Starts watching `root`.
    ///
    /// The initial tree is built and installed in `snapshot` before this
    /// returns. Must be called from within a tokio runtime.
    pub async fn start(
        root: &Path,
        options: WatchOptions,
        sink: Arc<dyn ChangeSink>,
        snapshot: Arc<SnapshotStore>,
    ) -> Result<Self, WatchError> {
        let root = root.canonicalize().map_err(|e| WatchError::Init {
            path: root.to_path_buf(),
            source: notify::Error::io(e).add_path(root.to_path_buf()),
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                // The task is gone once the receiver closes; nothing to do then.
                let _ = tx.blocking_send(res);
            })
            .map_err(|source| WatchError::Init {
                path: root.clone(),
                source,
            })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Init {
                path: root.clone(),
                source,
            })?;

        let mut this = Self::with_events(root, options, sink, snapshot, rx).await?;
        this.watcher = Some(watcher);
        info!("Watching {} for changes", this.root.display());
        Ok(this)
    }

    /// Runs the watch loop over an arbitrary event source.
    pub(crate) async fn with_events(
        root: PathBuf,
        options: WatchOptions,
        sink: Arc<dyn ChangeSink>,
        snapshot: Arc<SnapshotStore>,
        events: EventRx,
    ) -> Result<Self, WatchError> {
        let builder = TreeBuilder::new(options.tree);

        let scan_builder = builder.clone();
        let scan_root = root.clone();
        let initial = tokio::task::spawn_blocking(move || scan_builder.build(&scan_root))
            .await
            .map_err(|e| WatchError::TaskFailed(e.to_string()))?
            .map_err(|source| WatchError::InitialScan {
                path: root.clone(),
                source,
            })?;
        let tree = snapshot.replace(initial);
        debug!(
            "Initial tree for {}: {} memo files",
            root.display(),
            tree.file_count()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(
            WatchLoop {
                root: root.clone(),
                builder,
                sink,
                snapshot,
                debouncer: Debouncer::new(options.debounce),
                events,
                shutdown: shutdown_rx,
            }
            .run(),
        );

        Ok(Self {
            root,
            watcher: None,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Canonical path of the watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watch task is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops watching. Pending, unsettled events are discarded.
    pub fn stop(&mut self) {
        self.watcher = None;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Waits for the watch task to end and returns how it ended.
    pub async fn wait(mut self) -> Result<(), WatchError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| WatchError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchLoop {
    root: PathBuf,
    builder: TreeBuilder,
    sink: Arc<dyn ChangeSink>,
    snapshot: Arc<SnapshotStore>,
    debouncer: Debouncer,
    events: EventRx,
    shutdown: oneshot::Receiver<()>,
}

impl WatchLoop {
    async fn run(mut self) -> Result<(), WatchError> {
        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                _ = &mut self.shutdown => {
                    debug!("Watcher for {} stopped", self.root.display());
                    return Ok(());
                }
                event = self.events.recv() => match event {
                    Some(Ok(event)) => self.record(event),
                    Some(Err(e)) => warn!("Watch error: {}", e),
                    None => {
                        debug!("Event source for {} closed", self.root.display());
                        return Ok(());
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(batch) = self.debouncer.take_settled(Instant::now()) {
                        self.settle(batch).await?;
                    }
                }
            }
        }
    }

    fn record(&mut self, event: Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        let now = Instant::now();
        if event.need_rescan() {
            self.debouncer.push(self.root.clone(), now);
        }
        self.debouncer.push_all(event.paths, now);
    }

    async fn settle(&mut self, batch: SettledBatch) -> Result<(), WatchError> {
        if !root_exists(&self.root).await {
            return Err(self.lose_root());
        }

        let changes = self.classify(batch.paths.clone()).await?;
        debug!(
            "Settled {} events on {} paths into {} changes",
            batch.raw_events,
            batch.paths.len(),
            changes.len()
        );

        let mut structural = false;
        for change in changes {
            match change.kind {
                ChangeKind::Structural => structural = true,
                ChangeKind::Content => structural |= self.reparse(change).await?,
            }
        }

        if structural {
            self.rebuild().await?;
        }
        Ok(())
    }

    async fn classify(&self, paths: Vec<PathBuf>) -> Result<Vec<Change>, WatchError> {
        let root = self.root.clone();
        let known = self.snapshot.tree();
        let filter = self.builder.options().extensions.clone();
        blocking(move || classify(&root, &paths, &known, &filter)).await
    }

    /// Re-parses one file and publishes it. Returns true if the file turned
    /// out to be gone, which makes the change structural after all.
    async fn reparse(&self, change: Change) -> Result<bool, WatchError> {
        let builder = self.builder.clone();
        let path = change.path.clone();
        let result: fmemo_core::Result<ParsedDocument> =
            blocking(move || builder.build_file(&path)).await?;

        match result {
            Ok(doc) => {
                if doc.is_degraded() {
                    warn!(
                        "{} parsed with {} warnings",
                        change.rel,
                        doc.warnings.len()
                    );
                }
                debug!("Re-parsed {} ({} nodes)", change.rel, doc.node_count());
                self.sink.publish(ChangeNotification::FileUpdated {
                    file_path: change.rel,
                    memos: doc.memos,
                });
                Ok(false)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => {
                warn!("Failed to re-parse {}: {}", change.rel, e);
                Ok(false)
            }
        }
    }

    async fn rebuild(&mut self) -> Result<(), WatchError> {
        let builder = self.builder.clone();
        let root = self.root.clone();
        let tree = match blocking(move || builder.build(&root)).await? {
            Ok(tree) => tree,
            Err(e) => {
                if !root_exists(&self.root).await {
                    return Err(self.lose_root());
                }
                warn!("Failed to rebuild tree for {}: {}", self.root.display(), e);
                self.snapshot.mark_stale();
                return Ok(());
            }
        };

        let changed = *self.snapshot.tree() != tree;
        let tree = self.snapshot.replace(tree);
        if changed {
            info!("Directory tree changed: {} memo files", tree.file_count());
            self.sink.publish(ChangeNotification::DirectoryUpdated {
                tree: (*tree).clone(),
            });
        } else {
            debug!("Rebuild left the tree unchanged");
        }
        Ok(())
    }

    fn lose_root(&self) -> WatchError {
        error!(
            "Watched root {} is no longer available, stopping",
            self.root.display()
        );
        self.snapshot.mark_stale();
        WatchError::RootLost(self.root.clone())
    }
}

async fn root_exists(root: &Path) -> bool {
    tokio::fs::metadata(root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn blocking<T, F>(f: F) -> Result<T, WatchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WatchError::TaskFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmemo_core::{DirectoryTree, MemoNode};
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;
    use tokio::time::{sleep, timeout};

    const WINDOW: Duration = Duration::from_millis(50);

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<ChangeNotification>>,
    }

    impl ChangeSink for RecordingSink {
        fn publish(&self, notification: ChangeNotification) {
            self.seen.lock().push(notification);
        }
    }

    impl RecordingSink {
        fn take(&self) -> Vec<ChangeNotification> {
            std::mem::take(&mut *self.seen.lock())
        }

        async fn wait_for(&self, count: usize) {
            timeout(Duration::from_secs(5), async {
                while self.seen.lock().len() < count {
                    sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("timed out waiting for notifications");
        }
    }

    struct Harness {
        root: PathBuf,
        sink: Arc<RecordingSink>,
        snapshot: Arc<SnapshotStore>,
        events: mpsc::Sender<notify::Result<Event>>,
        watcher: ChangeWatcher,
    }

    async fn harness(root: &Path) -> Harness {
        let root = root.canonicalize().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let snapshot = Arc::new(SnapshotStore::new());
        let (tx, rx) = mpsc::channel(64);
        let options = WatchOptions {
            debounce: WINDOW,
            ..WatchOptions::default()
        };
        let watcher = ChangeWatcher::with_events(
            root.clone(),
            options,
            sink.clone(),
            snapshot.clone(),
            rx,
        )
        .await
        .unwrap();
        Harness {
            root,
            sink,
            snapshot,
            events: tx,
            watcher,
        }
    }

    fn event(kind: EventKind, path: PathBuf) -> notify::Result<Event> {
        Ok(Event::new(kind).add_path(path))
    }

    fn modified(path: PathBuf) -> notify::Result<Event> {
        event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), path)
    }

    #[tokio::test]
    async fn test_burst_of_writes_yields_one_update() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        let h = harness(dir.path()).await;
        assert_eq!(h.snapshot.tree().files, vec!["a.md"]);

        let file = h.root.join("a.md");
        fs::write(&file, "# A\n## B").unwrap();
        for _ in 0..5 {
            h.events.send(modified(file.clone())).await.unwrap();
        }

        h.sink.wait_for(1).await;
        sleep(WINDOW * 4).await;
        let seen = h.sink.take();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            ChangeNotification::FileUpdated { file_path, memos } => {
                assert_eq!(file_path, "a.md");
                assert_eq!(
                    memos,
                    &vec![MemoNode::new(1, "A").with_child(MemoNode::new(2, "B"))]
                );
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_file_updates_directory() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path()).await;
        assert!(h.snapshot.tree().files.is_empty());

        fs::create_dir(h.root.join("notes")).unwrap();
        let file = h.root.join("notes/new.md");
        fs::write(&file, "# New").unwrap();
        h.events
            .send(event(EventKind::Create(CreateKind::Folder), h.root.join("notes")))
            .await
            .unwrap();
        h.events
            .send(event(EventKind::Create(CreateKind::File), file))
            .await
            .unwrap();

        h.sink.wait_for(1).await;
        sleep(WINDOW * 4).await;
        let seen = h.sink.take();
        assert_eq!(seen.len(), 1);
        let expected = DirectoryTree {
            path: String::new(),
            files: vec![],
            subdirectories: vec![DirectoryTree {
                path: "notes".into(),
                files: vec!["new.md".into()],
                subdirectories: vec![],
            }],
        };
        assert_eq!(
            seen[0],
            ChangeNotification::DirectoryUpdated {
                tree: expected.clone()
            }
        );
        assert_eq!(*h.snapshot.tree(), expected);
    }

    #[tokio::test]
    async fn test_save_by_rename_is_a_file_update_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# Old").unwrap();
        let h = harness(dir.path()).await;
        let generation = h.snapshot.generation();

        let tmp = h.root.join("a.md.tmp");
        let file = h.root.join("a.md");
        fs::write(&tmp, "# Saved").unwrap();
        h.events
            .send(event(EventKind::Create(CreateKind::File), tmp.clone()))
            .await
            .unwrap();
        fs::rename(&tmp, &file).unwrap();
        h.events
            .send(event(EventKind::Remove(RemoveKind::File), tmp))
            .await
            .unwrap();
        h.events.send(modified(file)).await.unwrap();

        h.sink.wait_for(1).await;
        sleep(WINDOW * 4).await;
        let seen = h.sink.take();
        assert_eq!(
            seen,
            vec![ChangeNotification::FileUpdated {
                file_path: "a.md".into(),
                memos: vec![MemoNode::new(1, "Saved")],
            }]
        );
        assert_eq!(h.snapshot.generation(), generation);
    }

    #[tokio::test]
    async fn test_access_events_are_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        let h = harness(dir.path()).await;

        h.events
            .send(event(
                EventKind::Access(notify::event::AccessKind::Read),
                h.root.join("a.md"),
            ))
            .await
            .unwrap();
        sleep(WINDOW * 4).await;
        assert!(h.sink.take().is_empty());
        assert!(h.watcher.is_running());
    }

    #[tokio::test]
    async fn test_losing_root_ends_the_watch() {
        let parent = tempdir().unwrap();
        let root = parent.path().join("memos");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.md"), "# A").unwrap();
        let h = harness(&root).await;
        assert!(!h.snapshot.is_stale());

        fs::remove_dir_all(&h.root).unwrap();
        h.events
            .send(event(EventKind::Remove(RemoveKind::Folder), h.root.clone()))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(5), h.watcher.wait())
            .await
            .unwrap();
        assert!(matches!(result, Err(WatchError::RootLost(_))));
        assert!(h.snapshot.is_stale());
        assert!(h.sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_cleanly() {
        let dir = tempdir().unwrap();
        let mut h = harness(dir.path()).await;
        assert!(h.watcher.is_running());
        h.watcher.stop();
        let result = timeout(Duration::from_secs(5), h.watcher.wait())
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_start_on_missing_root_fails() {
        let dir = tempdir().unwrap();
        let result = ChangeWatcher::start(
            &dir.path().join("missing"),
            WatchOptions::default(),
            Arc::new(RecordingSink::default()),
            Arc::new(SnapshotStore::new()),
        )
        .await;
        assert!(matches!(result, Err(WatchError::Init { .. })));
    }

    #[tokio::test]
    async fn test_start_watches_the_real_filesystem() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let snapshot = Arc::new(SnapshotStore::new());
        let options = WatchOptions {
            debounce: WINDOW,
            ..WatchOptions::default()
        };
        let watcher = ChangeWatcher::start(dir.path(), options, sink.clone(), snapshot.clone())
            .await
            .unwrap();
        assert!(!snapshot.is_stale());

        fs::write(watcher.root().join("fresh.md"), "# Fresh").unwrap();
        sink.wait_for(1).await;
        assert!(sink
            .take()
            .iter()
            .any(|n| matches!(n, ChangeNotification::DirectoryUpdated { .. })));
        assert_eq!(snapshot.tree().files, vec!["fresh.md"]);
    }
}
