//! Notes table loading and lookup
//!
//! Reads the discharge notes CSV (plain or gzip-compressed) into an
//! identifier index. Only the id and text columns are kept.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use medlabel_core::{DuplicatePolicy, MedLabelError, Note, NotesConfig, Result};

use crate::NoteLookup;

/// Notes in file order with an identifier index
#[derive(Debug, Clone, Default)]
pub struct NoteIndex {
    notes: Vec<Note>,
    index: HashMap<String, usize>,
    duplicates: usize,
}

impl NoteIndex {
    /// Build an index from in-memory notes
    pub fn from_notes(
        notes: impl IntoIterator<Item = Note>,
        policy: DuplicatePolicy,
    ) -> Result<Self> {
        let mut index = Self::default();
        for note in notes {
            index.insert(note, policy, "<memory>")?;
        }
        Ok(index)
    }

    /// Load a notes CSV from disk. Paths ending in `.gz` are decompressed.
    ///
    /// When `wanted` is given, rows for other identifiers are skipped
    /// without being kept in memory.
    pub fn load(
        path: &Path,
        layout: &NotesConfig,
        policy: DuplicatePolicy,
        wanted: Option<&HashSet<String>>,
    ) -> Result<Self> {
        let source = path.display().to_string();
        let file = File::open(path).map_err(|e| MedLabelError::Io {
            path: source.clone(),
            source: e,
        })?;

        let is_gzip = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let index = if is_gzip {
            let decoder = MultiGzDecoder::new(BufReader::new(file));
            Self::from_reader(decoder, &source, layout, policy, wanted)?
        } else {
            Self::from_reader(BufReader::new(file), &source, layout, policy, wanted)?
        };

        tracing::info!(
            path = %source,
            notes = index.len(),
            duplicates = index.duplicates(),
            "Loaded notes table"
        );
        Ok(index)
    }

    /// Read notes from any CSV stream with a header row
    pub fn from_reader<R: Read>(
        reader: R,
        source: &str,
        layout: &NotesConfig,
        policy: DuplicatePolicy,
        wanted: Option<&HashSet<String>>,
    ) -> Result<Self> {
        let csv_error = |e: csv::Error| MedLabelError::Csv {
            path: source.to_string(),
            source: e,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers().map_err(csv_error)?.clone();
        let id_idx = headers
            .iter()
            .position(|h| h == layout.id_column)
            .ok_or_else(|| {
                MedLabelError::schema(source, format!("missing '{}' column", layout.id_column))
            })?;
        let text_idx = headers
            .iter()
            .position(|h| h == layout.text_column)
            .ok_or_else(|| {
                MedLabelError::schema(
                    source,
                    format!("missing '{}' column", layout.text_column),
                )
            })?;

        let mut index = Self::default();
        for (row_no, result) in reader.records().enumerate() {
            let record = result.map_err(csv_error)?;
            let note_id = record.get(id_idx).unwrap_or("");

            if let Some(wanted) = wanted {
                if !wanted.contains(note_id) {
                    continue;
                }
            }

            let text = record.get(text_idx).ok_or_else(|| {
                MedLabelError::schema(
                    source,
                    format!("row {row_no} has no '{}' value", layout.text_column),
                )
            })?;

            index.insert(Note::new(note_id, text), policy, source)?;
        }

        Ok(index)
    }

    fn insert(&mut self, note: Note, policy: DuplicatePolicy, source: &str) -> Result<()> {
        if self.index.contains_key(&note.note_id) {
            self.duplicates += 1;
            return match policy {
                DuplicatePolicy::FirstMatch => {
                    tracing::warn!(
                        note_id = %note.note_id,
                        "Duplicate note identifier, keeping first row"
                    );
                    Ok(())
                }
                DuplicatePolicy::Reject => Err(MedLabelError::DuplicateNoteId {
                    note_id: note.note_id,
                    path: source.to_string(),
                }),
            };
        }

        self.index.insert(note.note_id.clone(), self.notes.len());
        self.notes.push(note);
        Ok(())
    }

    /// Number of distinct notes
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Rows dropped because their identifier was already present
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Notes in file order
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }
}

impl NoteLookup for NoteIndex {
    fn find(&self, note_id: &str) -> Option<&Note> {
        self.index.get(note_id).map(|&i| &self.notes[i])
    }
}
