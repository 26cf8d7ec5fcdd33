//! Fleet monitor
//!
//! Wires the pieces together and drives the periodic work:
//!
//! | Task         | Interval            | Work                                    |
//! |--------------|---------------------|-----------------------------------------|
//! | discovery    | `rescan_interval`   | glob rescan + filesystem notifications  |
//! | idle sweeper | `sweep_interval`    | mark stale sessions idle, announce each |
//! | summary      | `summary_interval`  | fleet snapshot, retry online announce   |
//! | stdin        | -                   | classify piped lines as one session     |
//!
//! Every task is aborted when the shutdown future resolves.

use crate::broadcast::{BroadcastSink, BroadcastStats, Broadcaster, PublishOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::types::ActivityEvent;
use crate::watch::{ingest_line, DirectoryWatcher};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

/// Pseudo transcript path for lines read from stdin
pub const STDIN_SOURCE: &str = "<stdin>";

/// Owns the registry, broadcaster and watcher for one run
pub struct Monitor {
    config: Config,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    watcher: Arc<DirectoryWatcher>,
}

impl Monitor {
    pub fn new(config: Config, sink: Box<dyn BroadcastSink>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(sink, config.broadcast.min_interval()));
        let watcher = Arc::new(DirectoryWatcher::new(
            config.watch.resolved_root(),
            config.watch.extension.trim_start_matches('.'),
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
        ));

        Self {
            config,
            registry,
            broadcaster,
            watcher,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn watcher(&self) -> &Arc<DirectoryWatcher> {
        &self.watcher
    }

    /// Mark stale sessions idle and publish one `status_change` per session.
    ///
    /// Transitions are paced through the rate limiter rather than dropped,
    /// since a session marked idle is never announced again. Returns the
    /// events the sink accepted.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Vec<ActivityEvent> {
        let threshold = chrono::Duration::seconds(self.config.sessions.idle_threshold_secs as i64);
        let idle = self.registry.mark_idle_if_stale(now, threshold);

        let mut delivered = Vec::with_capacity(idle.len());
        for session in &idle {
            tracing::info!(session_id = %session.id, project = %session.project, "Session idle");
            let event = ActivityEvent::status_change(session);
            if self.broadcaster.publish_paced(event.clone()).await == PublishOutcome::Sent {
                delivered.push(event);
            }
        }
        delivered
    }

    /// Publish a fleet summary, first retrying the online announcement if
    /// it has not gone out yet.
    pub async fn summary_once(&self) -> ActivityEvent {
        if !self.broadcaster.is_online() {
            self.broadcaster.announce_online().await;
        }

        let event = ActivityEvent::fleet_summary(&self.registry.snapshot());
        tracing::debug!(
            total = event.total_count.unwrap_or_default(),
            active = event.active_count.unwrap_or_default(),
            "Fleet summary"
        );
        self.broadcaster.publish_paced(event.clone()).await;
        event
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> Result<BroadcastStats> {
        self.run_until(shutdown_signal()).await
    }

    /// Run every task until `shutdown` resolves, then abort them.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<BroadcastStats> {
        tracing::info!(
            root = %self.watcher.root().display(),
            sink = self.broadcaster.sink_name(),
            "Starting fleet monitor"
        );

        self.broadcaster.announce_online().await;

        let attached = self.watcher.rescan()?;
        tracing::info!(files = attached, "Initial scan complete");

        let mut tasks = vec![
            self.spawn_discovery(),
            self.spawn_sweeper(),
            self.spawn_summary(),
        ];
        if self.config.watch.read_stdin && !std::io::stdin().is_terminal() {
            tasks.push(self.spawn_stdin());
        }

        shutdown.await;
        tracing::info!("Shutting down");

        for task in &tasks {
            task.abort();
        }

        Ok(self.broadcaster.stats())
    }

    fn spawn_discovery(&self) -> JoinHandle<()> {
        let watcher = Arc::clone(&self.watcher);
        let interval = self.config.watch.rescan_interval();
        tokio::spawn(async move {
            if let Err(e) = watcher.run(interval).await {
                tracing::error!(error = %e, "Discovery stopped");
            }
        })
    }

    fn spawn_sweeper(&self) -> JoinHandle<()> {
        let monitor = self.handle();
        let interval = self.config.sessions.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.sweep_once(Utc::now()).await;
            }
        })
    }

    fn spawn_summary(&self) -> JoinHandle<()> {
        let monitor = self.handle();
        let interval = self.config.sessions.summary_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.summary_once().await;
            }
        })
    }

    fn spawn_stdin(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let broadcaster = Arc::clone(&self.broadcaster);
        tokio::spawn(async move {
            tracing::info!("Reading transcript lines from stdin");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        ingest_line(&registry, &broadcaster, Path::new(STDIN_SOURCE), &line).await;
                    }
                    Ok(None) => {
                        tracing::info!("Stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        })
    }

    /// Cheap clone for spawned tasks
    fn handle(&self) -> Monitor {
        Monitor {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            broadcaster: Arc::clone(&self.broadcaster),
            watcher: Arc::clone(&self.watcher),
        }
    }
}

/// Resolves on the first Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MemorySink;
    use crate::types::{EventKind, SessionStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    fn monitor(root: &Path) -> (Monitor, MemorySink) {
        let mut config = Config::default();
        config.watch.root = Some(root.to_path_buf());
        config.watch.read_stdin = false;
        config.broadcast.min_interval_ms = 1;

        let sink = MemorySink::new();
        (Monitor::new(config, Box::new(sink.clone())), sink)
    }

    #[tokio::test]
    async fn test_sweep_announces_each_idle_session_once() {
        let dir = TempDir::new().unwrap();
        let (monitor, sink) = monitor(dir.path());
        let start = Utc::now();
        monitor.registry().apply(Path::new("p/a.jsonl"), start, |_| ());

        let later = start + chrono::Duration::seconds(61);
        let events = monitor.sweep_once(later).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::StatusChange);
        assert_eq!(events[0].status, Some(SessionStatus::Idle));
        assert_eq!(sink.len(), 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(monitor.sweep_once(later).await.is_empty());
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_delivers_every_transition_under_rate_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.watch.root = Some(dir.path().to_path_buf());
        config.watch.read_stdin = false;
        let sink = MemorySink::new();
        let monitor = Monitor::new(config, Box::new(sink.clone()));

        let start = Utc::now();
        for name in ["p/a.jsonl", "p/b.jsonl", "q/c.jsonl"] {
            monitor.registry().apply(Path::new(name), start, |_| ());
        }

        let events = monitor.sweep_once(start + chrono::Duration::seconds(61)).await;

        assert_eq!(events.len(), 3);
        assert_eq!(sink.len(), 3);
        assert_eq!(monitor.broadcaster().stats().dropped, 0);
    }

    #[tokio::test]
    async fn test_sweep_before_threshold_is_silent() {
        let dir = TempDir::new().unwrap();
        let (monitor, sink) = monitor(dir.path());
        let start = Utc::now();
        monitor.registry().apply(Path::new("p/a.jsonl"), start, |_| ());

        let events = monitor.sweep_once(start + chrono::Duration::seconds(59)).await;
        assert!(events.is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_summary_announces_online_first() {
        let dir = TempDir::new().unwrap();
        let (monitor, sink) = monitor(dir.path());
        let now = Utc::now();
        monitor.registry().apply(Path::new("p/a.jsonl"), now, |_| ());
        monitor.registry().apply(Path::new("p/b.jsonl"), now, |_| ());

        let summary = monitor.summary_once().await;

        assert_eq!(summary.total_count, Some(2));
        assert_eq!(summary.active_count, Some(2));
        let kinds: Vec<EventKind> = sink.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::StreamerOnline, EventKind::FleetSummary]);
    }

    #[tokio::test]
    async fn test_run_until_stops_and_reports_stats() {
        let dir = TempDir::new().unwrap();
        let (monitor, sink) = monitor(dir.path());

        let stats = monitor
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(stats.sent, 1);
        assert_eq!(sink.events()[0].kind, EventKind::StreamerOnline);
    }
}
