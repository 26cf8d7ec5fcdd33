//! Project label derivation
//!
//! Sessions are labelled from their transcript path, best rule first:
//!
//! 1. Encoded project directory under `projects/`
//!    (`~/.claude/projects/-home-me-dev-app/<id>.jsonl` → `app`)
//! 2. Directory under a user `Documents` folder
//!    (`~/Documents/app/transcript.jsonl` → `app`)
//! 3. The transcript's parent directory name
//! 4. `unknown`
//!
//! A `cwd` recorded inside the transcript outranks all of these.

use crate::types::ProjectSource;
use std::path::{Component, Path};

/// Maximum characters in a displayed project label
pub const MAX_LABEL_CHARS: usize = 24;

const FALLBACK_LABEL: &str = "unknown";

/// Derive a display label for the transcript at `path`.
pub fn project_label(path: &Path) -> (String, ProjectSource) {
    let components: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(label) = directory_after(&components, "projects").and_then(decode_project_dir) {
        return (truncate_label(&label), ProjectSource::TranscriptDir);
    }

    if let Some(label) = directory_after(&components, "Documents") {
        return (truncate_label(label), ProjectSource::Documents);
    }

    if let Some(parent) = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy())
        .filter(|n| !n.is_empty())
    {
        return (truncate_label(&parent), ProjectSource::ParentDir);
    }

    (FALLBACK_LABEL.to_string(), ProjectSource::Fallback)
}

/// Label from a working directory recorded in a transcript record.
pub fn label_from_cwd(cwd: &str) -> Option<String> {
    cwd.rsplit(|c: char| c == '/' || c == '\\')
        .find(|part| !part.is_empty())
        .map(truncate_label)
}

/// Truncate to [`MAX_LABEL_CHARS`] characters.
pub fn truncate_label(label: &str) -> String {
    label.chars().take(MAX_LABEL_CHARS).collect()
}

/// The directory directly below the last `marker` component, provided it is
/// a directory and not the transcript file itself.
fn directory_after<'a>(components: &'a [String], marker: &str) -> Option<&'a str> {
    let idx = components.iter().rposition(|c| c == marker)?;
    if idx + 2 < components.len() {
        Some(components[idx + 1].as_str())
    } else {
        None
    }
}

/// Decode a directory name where path separators were replaced by dashes.
///
/// `-home-me-dev-app` → `app`, `C--Users-me-Documents-suite-hub` → `suite-hub`.
fn decode_project_dir(encoded: &str) -> Option<String> {
    const DOCUMENTS: &str = "-Documents-";

    let label = match encoded.rfind(DOCUMENTS) {
        Some(pos) => &encoded[pos + DOCUMENTS.len()..],
        None => encoded
            .trim_matches('-')
            .rsplit('-')
            .next()
            .unwrap_or_default(),
    };

    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}
