//! Label file loading and schema checks

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;

use medlabel_core::{LabelTable, MedLabelError, Result, END_POSITION, START_POSITION};

use crate::note_id::extract_note_id;
use crate::offsets::parse_position;

/// Read a label CSV, keeping every column as text
pub fn read_label_table(path: &Path) -> Result<LabelTable> {
    let source = path.display().to_string();
    let file = File::open(path).map_err(|e| MedLabelError::Io {
        path: source.clone(),
        source: e,
    })?;
    label_table_from_reader(BufReader::new(file), &source)
}

/// Read a label table from any CSV stream with a header row
pub fn label_table_from_reader<R: Read>(reader: R, source: &str) -> Result<LabelTable> {
    let csv_error = |e: csv::Error| MedLabelError::Csv {
        path: source.to_string(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = LabelTable::new(headers);
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        table.push_row(record.iter().map(|v| v.to_string()).collect());
    }

    Ok(table)
}

/// Resolved position columns of a label table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSchema {
    start_idx: usize,
    end_idx: usize,
}

impl LabelSchema {
    /// Locate the `Start Position` and `End Position` columns
    pub fn resolve(table: &LabelTable, file: &str) -> Result<Self> {
        let find = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| MedLabelError::schema(file, format!("missing '{name}' column")))
        };

        Ok(Self {
            start_idx: find(START_POSITION)?,
            end_idx: find(END_POSITION)?,
        })
    }

    /// Parse the raw start and end positions of one row
    pub fn positions(&self, table: &LabelTable, row: usize, file: &str) -> Result<(i64, i64)> {
        let cells = table
            .rows()
            .get(row)
            .ok_or_else(|| MedLabelError::schema(file, format!("row {row} does not exist")))?;

        let parse = |idx: usize, name: &str| {
            let raw = &cells[idx];
            parse_position(raw).ok_or_else(|| {
                MedLabelError::schema(
                    file,
                    format!("row {row}: '{name}' value '{raw}' is not an integer"),
                )
            })
        };

        Ok((
            parse(self.start_idx, START_POSITION)?,
            parse(self.end_idx, END_POSITION)?,
        ))
    }
}

/// Result of checking a label file without its note
#[derive(Debug, Clone, Serialize)]
pub struct LabelFileSummary {
    pub file: String,
    pub note_id: String,
    pub rows: usize,
}

/// Check one label file's name and schema.
///
/// Verifies the filename carries a note id, the position columns exist,
/// every position parses and every span satisfies `1 <= start <= end + 1`.
/// Bounds against the note text are only known at join time.
pub fn inspect_label_file(dir: &Path, filename: &str) -> Result<LabelFileSummary> {
    let note_id = extract_note_id(filename)?;
    let table = read_label_table(&dir.join(filename))?;
    let schema = LabelSchema::resolve(&table, filename)?;

    for row in 0..table.len() {
        let (start, end) = schema.positions(&table, row, filename)?;
        if start < 1 || start - 1 > end {
            return Err(MedLabelError::schema(
                filename,
                format!("row {row}: span {start}..{end} is inverted or starts before 1"),
            ));
        }
    }

    Ok(LabelFileSummary {
        file: filename.to_string(),
        note_id,
        rows: table.len(),
    })
}
