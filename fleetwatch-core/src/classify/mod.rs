//! Transcript record classification
//!
//! Converts one decoded transcript line into at most one [`ActivityEvent`],
//! updating the owning [`Session`] as a side effect.
//!
//! # Record shapes
//!
//! Only two shapes produce events:
//!
//! - `{"type": "assistant", "message": {"content": [...]}}` - the first
//!   `tool_use` block or non-empty `text` block decides the event
//! - `{"type": "result"}` - the agent finished a turn
//!
//! Everything else (user turns, system records, summaries, malformed
//! records) is ignored.
//!
//! # Redaction
//!
//! Event text is built from fixed labels plus the fragments produced by the
//! [`redact`] module. Model text, command lines, full paths and URLs are
//! never copied into an event.

pub mod redact;
pub mod tools;

use crate::project::label_from_cwd;
use crate::types::{ActivityEvent, EventKind, ProjectSource, Session, Zone};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

pub use tools::{lookup, DetailRule, ToolSpec, TOOL_TABLE};

/// What a transcript record means for the fleet view
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    /// The agent invoked a tool
    ToolUse { name: String, input: Value },
    /// The agent produced text
    Text,
    /// The agent finished
    Result,
    /// Not relevant, or not decodable
    Unrecognized,
}

/// A decoded transcript record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    /// Working directory recorded alongside the record, if any
    pub cwd: Option<String>,
}

// Raw serde shapes. Every field is optional so unexpected records decode
// instead of failing.

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    cwd: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Option<RawContent>,
}

// Blocks stay as raw values and are decoded one at a time, so a malformed
// block cannot hide its siblings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<Value>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

impl Record {
    /// Decode a transcript line. Never fails; anything unexpected is
    /// [`RecordKind::Unrecognized`].
    pub fn decode(value: &Value) -> Self {
        let raw = match RawRecord::deserialize(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::trace!(error = %e, "Undecodable record");
                return Self {
                    kind: RecordKind::Unrecognized,
                    cwd: None,
                };
            }
        };

        let kind = match raw.record_type.as_deref() {
            Some("assistant") => raw
                .message
                .and_then(|m| m.content)
                .map(decode_content)
                .unwrap_or(RecordKind::Unrecognized),
            Some("result") => RecordKind::Result,
            _ => RecordKind::Unrecognized,
        };

        Self { kind, cwd: raw.cwd }
    }
}

fn decode_content(content: RawContent) -> RecordKind {
    let blocks = match content {
        RawContent::Blocks(blocks) => blocks,
        RawContent::Text(text) if !text.trim().is_empty() => return RecordKind::Text,
        RawContent::Text(_) => return RecordKind::Unrecognized,
    };

    for block in &blocks {
        match ContentBlock::deserialize(block) {
            Ok(ContentBlock::ToolUse {
                name: Some(name),
                input,
            }) if !name.is_empty() => return RecordKind::ToolUse { name, input },
            Ok(ContentBlock::Text { text: Some(text) }) if !text.trim().is_empty() => {
                return RecordKind::Text
            }
            Ok(_) => {}
            Err(e) => tracing::trace!(error = %e, "Skipping undecodable content block"),
        }
    }

    RecordKind::Unrecognized
}

/// Classify one transcript line for `session`.
///
/// When an event is produced the session is marked active at `now`, its
/// current action is updated, and a recorded `cwd` may upgrade its project
/// label. Unrecognized records leave the session untouched.
pub fn classify(value: &Value, session: &mut Session, now: DateTime<Utc>) -> Option<ActivityEvent> {
    let record = Record::decode(value);

    let (kind, action, icon, zone, detail) = match &record.kind {
        RecordKind::ToolUse { name, input } => match lookup(name) {
            Some(spec) => (
                EventKind::Action,
                spec.action.to_string(),
                spec.icon,
                spec.zone,
                Some(spec.detail.apply(input)),
            ),
            None => (
                EventKind::Action,
                redact::truncate_chars(name, 32),
                tools::UNKNOWN_TOOL_ICON,
                Zone::Center,
                Some(tools::UNKNOWN_TOOL_DETAIL.to_string()),
            ),
        },
        RecordKind::Text => (
            EventKind::Thinking,
            "Thinking".to_string(),
            "🧠",
            Zone::Center,
            Some("Processing...".to_string()),
        ),
        RecordKind::Result => (
            EventKind::Complete,
            "Complete".to_string(),
            "✅",
            Zone::Center,
            None,
        ),
        RecordKind::Unrecognized => return None,
    };

    session.touch(now);
    session.current_action = match kind {
        EventKind::Complete => None,
        _ => Some(action.clone()),
    };

    if let Some(label) = record.cwd.as_deref().and_then(label_from_cwd) {
        if session.improve_project(label, ProjectSource::WorkingDir) {
            tracing::debug!(session_id = %session.id, project = %session.project, "Project label upgraded");
        }
    }

    Some(ActivityEvent::for_session(kind, session).with_display(&action, icon, zone, detail))
}
