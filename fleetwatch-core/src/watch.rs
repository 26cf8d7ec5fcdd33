//! Transcript discovery and tailing
//!
//! The [`DirectoryWatcher`] finds transcript files under a root directory
//! and runs one tailer task per file. Files are found two ways:
//!
//! - **Push**: a recursive `notify` watcher on the root forwards changed
//!   paths as they happen.
//! - **Poll**: a periodic glob rescan catches anything the push path missed
//!   and nudges every tailer, since change notifications are not reliable on
//!   every platform.
//!
//! Each tailer is woken through a capacity-1 channel, so a burst of
//! notifications for one file collapses into a single read.

use crate::broadcast::{Broadcaster, PublishOutcome};
use crate::classify::classify;
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use crate::tail::TailCursor;
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Parse one transcript line, classify it for the session owning `source`,
/// and publish the resulting event.
///
/// Returns `None` when the line is not JSON or produced no event.
pub async fn ingest_line(
    registry: &SessionRegistry,
    broadcaster: &Broadcaster,
    source: &Path,
    line: &str,
) -> Option<PublishOutcome> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::trace!(path = %source.display(), error = %e, "Skipping non-JSON line");
            return None;
        }
    };

    let now = Utc::now();
    let event = registry.apply(source, now, |session| classify(&value, session, now))?;
    Some(broadcaster.publish(event).await)
}

/// Watches a directory tree and tails every matching file in it
pub struct DirectoryWatcher {
    root: PathBuf,
    extension: String,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    /// Wake handle per attached file
    tailers: Mutex<HashMap<PathBuf, mpsc::Sender<()>>>,
    /// Installed once the root exists
    fs_watcher: Mutex<Option<RecommendedWatcher>>,
    fs_tx: mpsc::UnboundedSender<PathBuf>,
    fs_rx: Mutex<Option<mpsc::UnboundedReceiver<PathBuf>>>,
}

impl DirectoryWatcher {
    pub fn new(
        root: PathBuf,
        extension: impl Into<String>,
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        Self {
            root,
            extension: extension.into(),
            registry,
            broadcaster,
            tailers: Mutex::new(HashMap::new()),
            fs_watcher: Mutex::new(None),
            fs_tx,
            fs_rx: Mutex::new(Some(fs_rx)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` has the watched extension
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Start tailing `path` from its current end.
    ///
    /// Idempotent: returns true only when a new tailer was started. Must be
    /// called from within a tokio runtime.
    pub fn attach(&self, path: &Path) -> bool {
        if !self.matches(path) {
            return false;
        }

        let path = &tailer_key(path);
        let mut tailers = self.tailers.lock();
        if tailers.contains_key(path) {
            return false;
        }

        let cursor = match TailCursor::at_end(path) {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot attach file");
                return false;
            }
        };

        let (wake_tx, wake_rx) = mpsc::channel(1);
        tailers.insert(path.to_path_buf(), wake_tx);

        tracing::info!(path = %path.display(), offset = cursor.offset(), "Watching transcript");

        tokio::spawn(run_tailer(
            cursor,
            wake_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.broadcaster),
        ));
        true
    }

    /// Ask the tailer for `path` to read; returns false if not attached.
    pub fn wake(&self, path: &Path) -> bool {
        match self.tailers.lock().get(&tailer_key(path)) {
            Some(tx) => {
                // A full channel means a read is already pending
                let _ = tx.try_send(());
                true
            }
            None => false,
        }
    }

    /// Nudge every attached tailer
    pub fn wake_all(&self) {
        for tx in self.tailers.lock().values() {
            let _ = tx.try_send(());
        }
    }

    /// Number of attached files
    pub fn attached_count(&self) -> usize {
        self.tailers.lock().len()
    }

    pub fn is_attached(&self, path: &Path) -> bool {
        self.tailers.lock().contains_key(&tailer_key(path))
    }

    /// React to a path reported by the filesystem watcher.
    pub fn handle_fs_event(&self, path: &Path) {
        if !self.matches(path) {
            return;
        }
        if !self.attach(path) {
            self.wake(path);
        }
    }

    /// Scan the root for matching files, attaching any new ones.
    ///
    /// Also installs the filesystem watcher once the root exists and nudges
    /// every tailer. Returns the number of newly attached files.
    pub fn rescan(&self) -> Result<usize> {
        if !self.root.is_dir() {
            tracing::debug!(root = %self.root.display(), "Watch root does not exist yet");
            return Ok(0);
        }

        self.ensure_fs_watcher();

        let pattern = format!(
            "{}/**/*.{}",
            glob::Pattern::escape(&self.root.display().to_string()),
            self.extension
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("invalid watch pattern {}: {}", pattern, e)))?;

        let mut attached = 0;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    if self.attach(&path) {
                        attached += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Unreadable entry during rescan"),
            }
        }

        self.wake_all();

        if attached > 0 {
            tracing::debug!(attached, total = self.attached_count(), "Rescan attached files");
        }
        Ok(attached)
    }

    /// Run discovery until the task is aborted.
    ///
    /// Rescans every `rescan_interval` and dispatches filesystem
    /// notifications in between.
    pub async fn run(&self, rescan_interval: Duration) -> Result<()> {
        let mut fs_events = self
            .fs_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Watch(notify::Error::generic("watcher is already running")))?;

        let mut ticker = tokio::time::interval(rescan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.rescan() {
                        tracing::warn!(error = %e, "Rescan failed");
                    }
                }
                Some(path) = fs_events.recv() => self.handle_fs_event(&path),
            }
        }
    }

    fn ensure_fs_watcher(&self) {
        let mut slot = self.fs_watcher.lock();
        if slot.is_some() {
            return;
        }

        let tx = self.fs_tx.clone();
        let extension = self.extension.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                for path in event.paths {
                    if path.extension().and_then(|e| e.to_str()) == Some(extension.as_str()) {
                        let _ = tx.send(path);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Filesystem watcher error"),
        });

        let installed = watcher.and_then(|mut watcher| {
            watcher.watch(&self.root, RecursiveMode::Recursive)?;
            Ok(watcher)
        });

        match installed {
            Ok(watcher) => {
                tracing::info!(root = %self.root.display(), "Filesystem watcher installed");
                *slot = Some(watcher);
            }
            Err(e) => {
                // Rescans keep working; the next one tries again
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to install filesystem watcher");
            }
        }
    }
}

/// Tailers are keyed by canonical path, since notifications and glob
/// results may spell the same file differently.
fn tailer_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Any | EventKind::Create(_) | EventKind::Modify(_))
}

/// Read and publish new lines each time the tailer is woken.
async fn run_tailer(
    mut cursor: TailCursor,
    mut wake: mpsc::Receiver<()>,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
) {
    while wake.recv().await.is_some() {
        // Drain the backlog one bounded chunk at a time
        loop {
            let read = tokio::task::spawn_blocking(move || {
                let lines = cursor.read_new_lines();
                (cursor, lines)
            })
            .await;

            let lines = match read {
                Ok((returned, lines)) => {
                    cursor = returned;
                    lines
                }
                Err(e) => {
                    tracing::error!(error = %e, "Tailer read task failed");
                    return;
                }
            };

            match lines {
                Ok(lines) if lines.is_empty() => break,
                Ok(lines) => {
                    for line in lines {
                        ingest_line(&registry, &broadcaster, cursor.path(), &line).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %cursor.path().display(), error = %e, "Failed to read transcript");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MemorySink;
    use crate::types::EventKind as ActivityKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn watcher_for(root: &Path) -> (DirectoryWatcher, MemorySink, Arc<SessionRegistry>) {
        let sink = MemorySink::new();
        // No rate limit, so back-to-back lines are all observable
        let broadcaster = Arc::new(Broadcaster::new(Box::new(sink.clone()), Duration::ZERO));
        let registry = Arc::new(SessionRegistry::new());
        let watcher = DirectoryWatcher::new(
            root.to_path_buf(),
            "jsonl",
            Arc::clone(&registry),
            broadcaster,
        );
        (watcher, sink, registry)
    }

    fn append(path: &Path, line: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        writeln!(file, "{}", line).unwrap();
    }

    async fn wait_for_events(sink: &MemorySink, count: usize) {
        for _ in 0..200 {
            if sink.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_ingest_line_classifies_and_publishes() {
        let dir = TempDir::new().unwrap();
        let (watcher, sink, registry) = watcher_for(dir.path());
        let source = dir.path().join("proj").join("s.jsonl");

        let outcome = ingest_line(
            &registry,
            &watcher.broadcaster,
            &source,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/x/main.rs"}}]}}"#,
        )
        .await;

        assert_eq!(outcome, Some(PublishOutcome::Sent));
        assert_eq!(sink.events()[0].detail.as_deref(), Some("main.rs"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_line_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let (watcher, sink, registry) = watcher_for(dir.path());
        let source = dir.path().join("s.jsonl");

        assert!(ingest_line(&registry, &watcher.broadcaster, &source, "not json").await.is_none());
        assert!(sink.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (watcher, _sink, _registry) = watcher_for(dir.path());
        let path = dir.path().join("a.jsonl");
        append(&path, "{}");

        assert!(watcher.attach(&path));
        assert!(!watcher.attach(&path));
        assert_eq!(watcher.attached_count(), 1);
    }

    #[tokio::test]
    async fn test_attach_rejects_other_extensions_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let (watcher, _sink, _registry) = watcher_for(dir.path());
        let txt = dir.path().join("notes.txt");
        append(&txt, "hello");

        assert!(!watcher.attach(&txt));
        assert!(!watcher.attach(&dir.path().join("missing.jsonl")));
        assert_eq!(watcher.attached_count(), 0);
    }

    #[tokio::test]
    async fn test_rescan_finds_nested_files() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("projects").join("-home-me-app");
        std::fs::create_dir_all(&nested).unwrap();
        append(&nested.join("one.jsonl"), "{}");
        append(&dir.path().join("two.jsonl"), "{}");
        append(&dir.path().join("skip.log"), "{}");

        let (watcher, _sink, _registry) = watcher_for(dir.path());

        assert_eq!(watcher.rescan().unwrap(), 2);
        assert_eq!(watcher.rescan().unwrap(), 0);
        assert!(watcher.is_attached(&nested.join("one.jsonl")));
    }

    #[tokio::test]
    async fn test_rescan_missing_root_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let (watcher, _sink, _registry) = watcher_for(&dir.path().join("later"));
        assert_eq!(watcher.rescan().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rescan_root_with_glob_metacharacters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("fleet [prod]*?");
        std::fs::create_dir_all(root.join("proj")).unwrap();
        append(&root.join("proj").join("s.jsonl"), "{}");

        let (watcher, _sink, _registry) = watcher_for(&root);

        assert_eq!(watcher.rescan().unwrap(), 1);
        assert!(watcher.is_attached(&root.join("proj").join("s.jsonl")));
    }

    #[tokio::test]
    async fn test_woken_tailer_publishes_appended_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        append(&path, r#"{"type":"result"}"#);

        let (watcher, sink, _registry) = watcher_for(dir.path());
        assert!(watcher.attach(&path));

        append(&path, r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#);
        tokio::time::sleep(Duration::from_millis(5)).await;
        append(&path, r#"{"type":"result"}"#);
        watcher.wake(&path);

        wait_for_events(&sink, 2).await;
        let events = sink.events();
        // The record written before attaching is never replayed
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ActivityKind::Thinking);
        assert_eq!(events[1].kind, ActivityKind::Complete);
    }
}
