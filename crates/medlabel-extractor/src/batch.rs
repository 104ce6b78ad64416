//! Batch processing over a directory of label files
//!
//! Label files are processed in filename order and their joined tables
//! concatenated in that same order, whether the per-file work runs
//! sequentially or on the rayon pool.

use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use medlabel_core::{
    AppConfig, ConfigError, ErrorMode, JoinConfig, LabelTable, MedLabelError, OffsetPolicy, Result,
};

use crate::join::{JoinedFile, LabelJoiner};
use crate::note_id::extract_note_id;
use crate::notes::NoteIndex;
use crate::NoteLookup;

// ============================================================================
// File discovery
// ============================================================================

/// List regular files in `dir`, sorted by name.
///
/// Subdirectories are ignored. Names that are not valid UTF-8 are skipped
/// with a warning since they cannot carry a readable note id.
pub fn list_label_files(dir: &Path) -> Result<Vec<String>> {
    let io_error = |e: std::io::Error| MedLabelError::Io {
        path: dir.display().to_string(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(name) => tracing::warn!(name = ?name, "Skipping non UTF-8 file name"),
        }
    }

    files.sort();
    Ok(files)
}

/// Note ids referenced by label filenames; names without one are ignored
pub fn collect_note_ids(files: &[String]) -> HashSet<String> {
    files
        .iter()
        .filter_map(|f| extract_note_id(f).ok())
        .collect()
}

// ============================================================================
// Batch report
// ============================================================================

/// A label file that joined successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub note_id: String,
    pub rows: usize,
}

/// A label file that failed to join
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Joined rows of every successful file, in filename order
    pub table: LabelTable,
    pub outcomes: Vec<FileOutcome>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    /// Files that joined successfully
    pub fn files_processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Total joined rows
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ============================================================================
// Batch runner
// ============================================================================

/// Runs the joiner over many label files
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    offset_policy: OffsetPolicy,
    error_mode: ErrorMode,
    parallel: bool,
}

impl BatchRunner {
    /// Create a sequential runner that continues past failures
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &JoinConfig) -> Self {
        Self {
            offset_policy: config.offset_policy,
            error_mode: config.error_mode,
            parallel: config.parallel,
        }
    }

    pub fn with_offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.offset_policy = policy;
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Join every label file in `dir`
    pub fn run<L: NoteLookup + ?Sized>(&self, notes: &L, dir: &Path) -> Result<BatchReport> {
        let files = list_label_files(dir)?;
        self.run_files(notes, dir, &files)
    }

    /// Join the given label files from `dir`, in the order given
    pub fn run_files<L: NoteLookup + ?Sized>(
        &self,
        notes: &L,
        dir: &Path,
        files: &[String],
    ) -> Result<BatchReport> {
        let joiner = LabelJoiner::new(notes).with_offset_policy(self.offset_policy);
        let join_one = |file: &String| -> Result<FileOutcomeTable> {
            let JoinedFile { note_id, table } = joiner.join_file(dir, file)?;
            Ok(FileOutcomeTable {
                outcome: FileOutcome {
                    file: file.clone(),
                    note_id,
                    rows: table.len(),
                },
                table,
            })
        };

        let mut report = BatchReport::default();
        let mut tables = Vec::new();

        if self.parallel {
            let results: Vec<Result<FileOutcomeTable>> = files.par_iter().map(join_one).collect();
            for (file, result) in files.iter().zip(results) {
                self.record(file, result, &mut report, &mut tables)?;
            }
        } else {
            for file in files {
                self.record(file, join_one(file), &mut report, &mut tables)?;
            }
        }

        report.table = LabelTable::concat(tables);

        tracing::info!(
            files = files.len(),
            joined = report.files_processed(),
            failed = report.failures.len(),
            rows = report.rows(),
            "Batch join finished"
        );
        Ok(report)
    }

    fn record(
        &self,
        file: &str,
        result: Result<FileOutcomeTable>,
        report: &mut BatchReport,
        tables: &mut Vec<LabelTable>,
    ) -> Result<()> {
        match result {
            Ok(joined) => {
                tables.push(joined.table);
                report.outcomes.push(joined.outcome);
                Ok(())
            }
            Err(e) if self.error_mode == ErrorMode::Abort => Err(e),
            Err(e) => {
                tracing::warn!(file, error = %e, "Label file failed");
                report.failures.push(FileFailure {
                    file: file.to_string(),
                    error: e.to_string(),
                });
                Ok(())
            }
        }
    }
}

struct FileOutcomeTable {
    outcome: FileOutcome,
    table: LabelTable,
}

/// Run the whole pipeline described by `config`.
///
/// Lists the label directory, loads the notes table (restricted to ids
/// named by label files when `prefilter_notes` is set) and joins every file.
pub fn run_from_config(config: &AppConfig) -> Result<BatchReport> {
    let notes_path = config
        .input
        .notes_path
        .as_deref()
        .ok_or_else(|| ConfigError::MissingRequired("notes path".to_string()))?;
    let label_dir = config
        .input
        .label_dir
        .as_deref()
        .ok_or_else(|| ConfigError::MissingRequired("label directory".to_string()))?;

    let files = list_label_files(label_dir)?;
    let wanted = config
        .join
        .prefilter_notes
        .then(|| collect_note_ids(&files));

    let notes = NoteIndex::load(
        notes_path,
        &config.notes,
        config.join.duplicate_policy,
        wanted.as_ref(),
    )?;

    BatchRunner::from_config(&config.join).run_files(&notes, label_dir, &files)
}
