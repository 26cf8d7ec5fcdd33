//! Tool lookup table

use super::redact::{categorize_command, redact_path, redact_url};
use crate::types::Zone;
use serde_json::Value;

/// How the detail fragment is derived from a tool's input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRule {
    /// Base name of the path in this input field
    Path(&'static str),
    /// Category of the shell command in this input field
    Command(&'static str),
    /// Host of the URL in this input field
    Url(&'static str),
    /// Fixed label, input ignored
    Fixed(&'static str),
}

impl DetailRule {
    /// Produce the redacted detail for a tool input.
    pub fn apply(&self, input: &Value) -> String {
        match *self {
            DetailRule::Path(field) => redact_path(string_field(input, field)),
            DetailRule::Command(field) => categorize_command(string_field(input, field)).to_string(),
            DetailRule::Url(field) => redact_url(string_field(input, field)),
            DetailRule::Fixed(label) => label.to_string(),
        }
    }
}

/// Display mapping for one known tool
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub action: &'static str,
    pub icon: &'static str,
    pub zone: Zone,
    pub detail: DetailRule,
}

const fn tool(
    name: &'static str,
    action: &'static str,
    icon: &'static str,
    zone: Zone,
    detail: DetailRule,
) -> ToolSpec {
    ToolSpec {
        name,
        action,
        icon,
        zone,
        detail,
    }
}

pub const TOOL_TABLE: &[ToolSpec] = &[
    tool("Read", "Reading", "📖", Zone::Read, DetailRule::Path("file_path")),
    tool("Write", "Writing", "✍️", Zone::Write, DetailRule::Path("file_path")),
    tool("Edit", "Editing", "🔧", Zone::Write, DetailRule::Path("file_path")),
    tool("MultiEdit", "Editing", "🔧", Zone::Write, DetailRule::Path("file_path")),
    tool("NotebookEdit", "Editing", "📓", Zone::Write, DetailRule::Path("notebook_path")),
    tool("LS", "Listing", "📂", Zone::Read, DetailRule::Path("path")),
    tool("Bash", "Terminal", "💻", Zone::Terminal, DetailRule::Command("command")),
    tool("Glob", "Searching", "🔍", Zone::Search, DetailRule::Fixed("file pattern")),
    tool("Grep", "Searching", "🔍", Zone::Search, DetailRule::Fixed("code search")),
    tool("Task", "Spawning Agent", "🤖", Zone::Agents, DetailRule::Fixed("sub-agent")),
    tool("WebSearch", "Web Search", "🌐", Zone::Web, DetailRule::Fixed("web query")),
    tool("WebFetch", "Fetching", "🌐", Zone::Web, DetailRule::Url("url")),
    tool("TodoWrite", "Planning", "📝", Zone::Center, DetailRule::Fixed("task list")),
];

/// Icon, zone and detail used for tools missing from the table
pub const UNKNOWN_TOOL_ICON: &str = "⚡";
pub const UNKNOWN_TOOL_DETAIL: &str = "working...";

/// Find the table entry for a tool name.
pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    TOOL_TABLE.iter().find(|spec| spec.name == name)
}

fn string_field<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str)
}
