//! Core domain types for fleetwatch
//!
//! These types represent the in-memory state of the monitor: agent sessions
//! and the activity events published for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================
// Sessions
// ============================================

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Classified activity within the idle threshold
    Active,
    /// No activity for longer than the idle threshold
    Idle,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "idle" => Ok(SessionStatus::Idle),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

/// Where a session's project label came from.
///
/// Variants are ordered from least to most specific; a label is only
/// replaced by one from a higher-ranked source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSource {
    /// Generic literal, nothing better was available
    Fallback,
    /// Name of the transcript's parent directory
    ParentDir,
    /// Directory under a user `Documents` folder
    Documents,
    /// Encoded project directory under a `projects` folder
    TranscriptDir,
    /// Working directory recorded in the transcript itself
    WorkingDir,
}

/// One independently tracked agent run, keyed by its transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Short opaque identifier, stable for the process lifetime
    pub id: String,
    /// Transcript file this session was discovered from (never published)
    pub source_path: PathBuf,
    /// Human-readable project label
    pub project: String,
    /// How `project` was derived
    pub project_source: ProjectSource,
    /// When the session was first observed
    pub start_time: DateTime<Utc>,
    /// When the most recent event was classified
    pub last_activity: DateTime<Utc>,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// Label of the last classified action
    pub current_action: Option<String>,
}

impl Session {
    /// Create a new active session first observed at `now`
    pub fn new(
        id: String,
        source_path: PathBuf,
        project: String,
        project_source: ProjectSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_path,
            project,
            project_source,
            start_time: now,
            last_activity: now,
            status: SessionStatus::Active,
            current_action: None,
        }
    }

    /// Record activity at `now`, returning the session to active.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.status = SessionStatus::Active;
    }

    /// Replace the project label if `source` is more specific than the current one.
    ///
    /// Returns true if the label changed.
    pub fn improve_project(&mut self, project: String, source: ProjectSource) -> bool {
        if source <= self.project_source || project.is_empty() {
            return false;
        }
        self.project = project;
        self.project_source = source;
        true
    }

    /// Whether an active session has been silent for longer than `threshold`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.status == SessionStatus::Active
            && now.signed_duration_since(self.last_activity) > threshold
    }
}

// ============================================
// Activity Events
// ============================================

/// Kind of activity event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Action,
    Thinking,
    Complete,
    StatusChange,
    FleetSummary,
    StreamerOnline,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Action => "action",
            EventKind::Thinking => "thinking",
            EventKind::Complete => "complete",
            EventKind::StatusChange => "status_change",
            EventKind::FleetSummary => "fleet_summary",
            EventKind::StreamerOnline => "streamer_online",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse visual area the renderer places an event in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Center,
    Read,
    Write,
    Terminal,
    Search,
    Agents,
    Web,
}

/// Per-session entry carried by a fleet summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub project: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            project: session.project.clone(),
            status: session.status,
            start_time: session.start_time,
            last_activity: session.last_activity,
            current_action: session.current_action.clone(),
        }
    }
}

/// A redacted, classified unit of output published downstream.
///
/// Text fields hold fixed labels or redacted fragments only; raw paths,
/// commands, URLs and model output never reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_start: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,

    /// Full registry state (fleet summaries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionSummary>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,

    /// Set by the broadcaster at the moment of publish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ActivityEvent {
    fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            session_id: None,
            project: None,
            session_start: None,
            action: None,
            icon: None,
            detail: None,
            zone: None,
            status: None,
            sessions: None,
            active_count: None,
            idle_count: None,
            total_count: None,
            timestamp: None,
        }
    }

    /// Event attributed to a single session, carrying its identity and status
    pub fn for_session(kind: EventKind, session: &Session) -> Self {
        Self {
            session_id: Some(session.id.clone()),
            project: Some(session.project.clone()),
            session_start: Some(session.start_time),
            status: Some(session.status),
            ..Self::empty(kind)
        }
    }

    /// Attach the display fields
    pub fn with_display(mut self, action: &str, icon: &str, zone: Zone, detail: Option<String>) -> Self {
        self.action = Some(action.to_string());
        self.icon = Some(icon.to_string());
        self.zone = Some(zone);
        self.detail = detail;
        self
    }

    /// Session went idle
    pub fn status_change(session: &Session) -> Self {
        let mut event = Self::for_session(EventKind::StatusChange, session).with_display(
            "Idle",
            "💤",
            Zone::Center,
            Some("No recent activity".to_string()),
        );
        event.status = Some(SessionStatus::Idle);
        event
    }

    /// Fleet-wide snapshot of every known session
    pub fn fleet_summary(sessions: &[Session]) -> Self {
        let active = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Active)
            .count();
        let idle = sessions.len() - active;

        let mut event = Self::empty(EventKind::FleetSummary).with_display(
            "Fleet Summary",
            "📊",
            Zone::Center,
            Some(format!("{} active, {} idle", active, idle)),
        );
        event.sessions = Some(sessions.iter().map(SessionSummary::from).collect());
        event.active_count = Some(active);
        event.idle_count = Some(idle);
        event.total_count = Some(sessions.len());
        event
    }

    /// System event announcing the streamer is connected
    pub fn streamer_online() -> Self {
        Self::empty(EventKind::StreamerOnline).with_display(
            "Fleet Streamer Online",
            "🚀",
            Zone::Center,
            Some("Watching for activity...".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(now: DateTime<Utc>) -> Session {
        Session::new(
            "abc12345".to_string(),
            PathBuf::from("/t/projects/-home-me-app/s.jsonl"),
            "app".to_string(),
            ProjectSource::TranscriptDir,
            now,
        )
    }

    #[test]
    fn test_session_status_roundtrip_str() {
        assert_eq!("idle".parse::<SessionStatus>(), Ok(SessionStatus::Idle));
        assert_eq!(SessionStatus::Active.to_string(), "active");
        assert!("busy".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_improve_project_only_upgrades() {
        let mut session = session_at(Utc::now());

        assert!(!session.improve_project("parent".to_string(), ProjectSource::ParentDir));
        assert_eq!(session.project, "app");

        assert!(session.improve_project("real-app".to_string(), ProjectSource::WorkingDir));
        assert_eq!(session.project, "real-app");
        assert_eq!(session.project_source, ProjectSource::WorkingDir);

        // Same rank does not overwrite
        assert!(!session.improve_project("other".to_string(), ProjectSource::WorkingDir));
        assert_eq!(session.project, "real-app");
    }

    #[test]
    fn test_is_stale_ignores_idle_sessions() {
        let start = Utc::now();
        let mut session = session_at(start);
        let later = start + chrono::Duration::seconds(120);
        let threshold = chrono::Duration::seconds(60);

        assert!(session.is_stale(later, threshold));
        session.status = SessionStatus::Idle;
        assert!(!session.is_stale(later, threshold));
    }

    #[test]
    fn test_event_serializes_camel_case_without_empty_fields() {
        let session = session_at(Utc::now());
        let event = ActivityEvent::status_change(&session);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "status_change");
        assert_eq!(json["sessionId"], "abc12345");
        assert_eq!(json["status"], "idle");
        assert!(json.get("sessionStart").is_some());
        assert!(json.get("timestamp").is_none());
        assert!(json.get("sessions").is_none());
        // The transcript path is never part of an event
        assert!(!json.to_string().contains("/t/projects"));
    }

    #[test]
    fn test_fleet_summary_counts() {
        let now = Utc::now();
        let mut idle = session_at(now);
        idle.status = SessionStatus::Idle;
        let sessions = vec![session_at(now), session_at(now), idle];

        let event = ActivityEvent::fleet_summary(&sessions);
        assert_eq!(event.kind, EventKind::FleetSummary);
        assert_eq!(event.active_count, Some(2));
        assert_eq!(event.idle_count, Some(1));
        assert_eq!(event.total_count, Some(3));
        assert_eq!(event.sessions.as_ref().map(Vec::len), Some(3));
        assert!(event.session_id.is_none());
    }
}
