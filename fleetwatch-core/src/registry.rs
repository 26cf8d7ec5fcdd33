//! Session registry
//!
//! Single source of truth for tracked sessions, keyed by transcript path.
//! Tailers, the idle sweeper and the summary task all go through this type;
//! readers only ever receive copies.

use crate::project::project_label;
use crate::types::{Session, SessionStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Generate a short opaque session identifier
pub fn new_session_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Thread-safe map of transcript path to session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<PathBuf, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the session for `path`, creating it if this is the
    /// first time the path is seen.
    pub fn get_or_create(&self, path: &Path) -> Session {
        self.apply(path, Utc::now(), |session| session.clone())
    }

    /// Run `f` against the session for `path` while holding the registry lock.
    ///
    /// The session is created first (starting at `now`) if it does not exist.
    pub fn apply<R>(&self, path: &Path, now: DateTime<Utc>, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(path.to_path_buf()).or_insert_with(|| {
            let (project, source) = project_label(path);
            let session = Session::new(new_session_id(), path.to_path_buf(), project, source, now);
            tracing::info!(
                session_id = %session.id,
                project = %session.project,
                "New session"
            );
            session
        });
        f(session)
    }

    /// Copy of a session, if the path is known
    pub fn get(&self, path: &Path) -> Option<Session> {
        self.sessions.lock().get(path).cloned()
    }

    /// Point-in-time copy of every session, oldest first
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Move every active session silent for longer than `threshold` to idle.
    ///
    /// Returns copies of exactly the sessions that transitioned. Sessions
    /// already idle are never returned twice.
    pub fn mark_idle_if_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> Vec<Session> {
        let mut sessions = self.sessions.lock();
        let mut transitioned: Vec<Session> = sessions
            .values_mut()
            .filter(|s| s.is_stale(now, threshold))
            .map(|s| {
                s.status = SessionStatus::Idle;
                s.clone()
            })
            .collect();
        transitioned.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        transitioned
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
