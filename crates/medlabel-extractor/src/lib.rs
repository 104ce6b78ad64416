//! medlabel Extractor - Label text extraction pipeline
//!
//! Joins clinician-annotated medication labels with the clinical note
//! they were drawn from. Each label file names its note through a
//! `NoteID-<id>` marker in the filename; each label row carries 1-based
//! character positions into that note's text.
//!
//! ```text
//!  label dir ──► batch ──► note_id ──► NoteLookup ──► join ──► render
//!                            │                          │
//!                        filename                 labels + offsets
//! ```

use medlabel_core::Note;

pub mod batch;
pub mod join;
pub mod labels;
pub mod note_id;
pub mod notes;
pub mod offsets;
pub mod render;

pub use batch::{
    collect_note_ids, list_label_files, run_from_config, BatchReport, BatchRunner, FileFailure,
    FileOutcome,
};
pub use join::{JoinedFile, LabelJoiner};
pub use labels::{inspect_label_file, read_label_table, LabelFileSummary, LabelSchema};
pub use note_id::extract_note_id;
pub use notes::NoteIndex;
pub use offsets::{label_char_range, parse_position, CharBoundaries};
pub use render::render;

/// Trait for note sources the joiner can look identifiers up in
pub trait NoteLookup: Send + Sync {
    /// Find a note by identifier, `None` when absent
    fn find(&self, note_id: &str) -> Option<&Note>;
}

impl NoteLookup for [Note] {
    fn find(&self, note_id: &str) -> Option<&Note> {
        self.iter().find(|n| n.note_id == note_id)
    }
}

impl NoteLookup for Vec<Note> {
    fn find(&self, note_id: &str) -> Option<&Note> {
        self.as_slice().find(note_id)
    }
}
