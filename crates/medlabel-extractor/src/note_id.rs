//! Note identifier extraction from label filenames

use once_cell::sync::Lazy;
use regex::Regex;

use medlabel_core::{MedLabelError, Result};

static NOTE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"NoteID-([0-9A-Za-z-]+)").expect("valid note id pattern"));

/// Extract the note id from a string containing `NoteID-<id>`.
///
/// The first marker followed by at least one `[0-9A-Za-z-]` character
/// wins; the id runs until the first character outside that class.
pub fn extract_note_id(s: &str) -> Result<String> {
    NOTE_ID_PATTERN
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MedLabelError::IdentifierMissing {
            input: s.to_string(),
        })
}
