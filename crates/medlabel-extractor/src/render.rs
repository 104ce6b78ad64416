//! Output rendering for joined label tables
//!
//! All presentation choices (format, escaping, column alignment) live
//! here; the join itself never formats anything.

use std::io::Write;

use serde::ser::{Serialize, SerializeMap, Serializer};

use medlabel_core::{LabelTable, MedLabelError, OutputFormat, Result};

/// Write `table` to `writer` in the requested format
pub fn render<W: Write>(table: &LabelTable, format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Csv => render_csv(table, writer),
        OutputFormat::Json => render_json(table, writer),
        OutputFormat::Table => render_text(table, writer),
    }
}

fn render_error(e: impl std::fmt::Display) -> MedLabelError {
    MedLabelError::Render(e.to_string())
}

// ============================================================================
// CSV
// ============================================================================

fn render_csv<W: Write>(table: &LabelTable, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if !table.headers().is_empty() {
        writer.write_record(table.headers()).map_err(render_error)?;
    }
    for row in table.rows() {
        writer.write_record(row).map_err(render_error)?;
    }
    writer.flush().map_err(render_error)?;
    Ok(())
}

// ============================================================================
// JSON
// ============================================================================

/// One row serialized as an object with keys in column order
struct RowObject<'a> {
    headers: &'a [String],
    row: &'a [String],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (key, value) in self.headers.iter().zip(self.row) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn render_json<W: Write>(table: &LabelTable, mut writer: W) -> Result<()> {
    let rows: Vec<RowObject<'_>> = table
        .rows()
        .iter()
        .map(|row| RowObject {
            headers: table.headers(),
            row,
        })
        .collect();

    serde_json::to_writer_pretty(&mut writer, &rows).map_err(render_error)?;
    writeln!(writer).map_err(render_error)?;
    Ok(())
}

// ============================================================================
// Plain-text table
// ============================================================================

/// Escape control characters so every row stays on one line
fn display_cell(value: &str) -> String {
    value
        .replace('\r', "\\r")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

/// Aligned table with a leading row index, no truncation of any kind
fn render_text<W: Write>(table: &LabelTable, mut writer: W) -> Result<()> {
    let index: Vec<String> = (0..table.len()).map(|i| i.to_string()).collect();
    let cells: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| row.iter().map(|v| display_cell(v)).collect())
        .collect();

    let index_width = index.iter().map(|i| i.len()).max().unwrap_or(0);
    let mut widths: Vec<usize> = table.headers().iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut header_line = " ".repeat(index_width);
    for (header, &width) in table.headers().iter().zip(&widths) {
        header_line.push_str(&format!("  {header:>width$}"));
    }
    writeln!(writer, "{}", header_line.trim_end()).map_err(render_error)?;

    for (i, row) in index.iter().zip(&cells) {
        let mut line = format!("{i:<index_width$}");
        for (cell, &width) in row.iter().zip(&widths) {
            line.push_str(&format!("  {cell:>width$}"));
        }
        writeln!(writer, "{line}").map_err(render_error)?;
    }

    Ok(())
}
