//! Label-to-note text join
//!
//! For one label file: recover the note id from the filename, look the
//! note up, and add a `Text` column holding the trimmed span of note text
//! each row points at.

use std::path::Path;

use medlabel_core::{LabelTable, MedLabelError, Note, OffsetPolicy, Result, TEXT_COLUMN};

use crate::labels::{read_label_table, LabelSchema};
use crate::note_id::extract_note_id;
use crate::offsets::{label_char_range, CharBoundaries};
use crate::NoteLookup;

/// One label file joined with its note
#[derive(Debug, Clone)]
pub struct JoinedFile {
    pub note_id: String,
    pub table: LabelTable,
}

/// Joins label tables against a note source
pub struct LabelJoiner<'a, L: NoteLookup + ?Sized> {
    notes: &'a L,
    offset_policy: OffsetPolicy,
}

impl<'a, L: NoteLookup + ?Sized> LabelJoiner<'a, L> {
    /// Create a joiner with the strict offset policy
    pub fn new(notes: &'a L) -> Self {
        Self {
            notes,
            offset_policy: OffsetPolicy::Strict,
        }
    }

    /// Set the offset policy
    pub fn with_offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.offset_policy = policy;
        self
    }

    /// Look up the note a label file belongs to
    pub fn note_for(&self, note_id: &str, file: &str) -> Result<&'a Note> {
        self.notes
            .find(note_id)
            .ok_or_else(|| MedLabelError::NoteNotFound {
                note_id: note_id.to_string(),
                file: file.to_string(),
            })
    }

    /// Join one label file in `dir` with its note
    pub fn join_file(&self, dir: &Path, filename: &str) -> Result<JoinedFile> {
        let note_id = extract_note_id(filename)?;
        let note = self.note_for(&note_id, filename)?;
        let table = read_label_table(&dir.join(filename))?;

        tracing::debug!(
            file = filename,
            note_id = %note_id,
            rows = table.len(),
            "Joining label file"
        );

        let table = self.join_table(note, table, filename)?;
        Ok(JoinedFile { note_id, table })
    }

    /// Add the `Text` column to a label table already paired with its note.
    ///
    /// Rows and existing columns are kept in order; an existing `Text`
    /// column is overwritten in place.
    pub fn join_table(&self, note: &Note, mut table: LabelTable, file: &str) -> Result<LabelTable> {
        let schema = LabelSchema::resolve(&table, file)?;
        let boundaries = CharBoundaries::new(&note.text);

        let mut texts = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let (start, end) = schema.positions(&table, row, file)?;
            let span = boundaries
                .slice(label_char_range(start, end), self.offset_policy)
                .ok_or_else(|| MedLabelError::OffsetOutOfRange {
                    file: file.to_string(),
                    row,
                    start,
                    end,
                    len: boundaries.char_count(),
                })?;
            texts.push(span.trim().to_string());
        }

        table.set_column(TEXT_COLUMN, texts)?;
        Ok(table)
    }
}
