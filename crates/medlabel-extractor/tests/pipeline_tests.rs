//! Pipeline Integration Tests
//!
//! Runs the full notes + label directory join over temporary files.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use medlabel_core::{
    AppConfig, DuplicatePolicy, ErrorMode, MedLabelError, OffsetPolicy, OutputFormat, TEXT_COLUMN,
};
use medlabel_extractor::{render, run_from_config, BatchRunner, NoteIndex};

const NOTES_CSV: &str = "note_id,subject_id,hadm_id,note_type,text\n\
    10001-DS-1,10001,20001,DS,\"The patient was given ibuprofen daily.\"\n\
    10002-DS-3,10002,20002,DS,\"Discharge meds:\n  metoprolol 25 mg BID\n\"\n\
    10003-DS-7,10003,20003,DS,\"Unlabelled note.\"\n";

fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn write_gzip(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

struct Fixture {
    _root: tempfile::TempDir,
    config: AppConfig,
}

fn fixture(notes_name: &str) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let notes_path = root.path().join(notes_name);
    if notes_name.ends_with(".gz") {
        write_gzip(&notes_path, NOTES_CSV);
    } else {
        write_file(root.path(), notes_name, NOTES_CSV);
    }

    let labels = root.path().join("labels");
    fs::create_dir(&labels).unwrap();
    write_file(
        &labels,
        "NoteID-10001-DS-1.csv",
        "Category,Start Position,End Position\nDrug,23,31\nFrequency,33,37\n",
    );
    write_file(
        &labels,
        "NoteID-10002-DS-3.csv",
        "Category,Start Position,End Position\nDrug,16,28\nDose,29,34\n",
    );

    let mut config = AppConfig::default();
    config.input.notes_path = Some(notes_path);
    config.input.label_dir = Some(labels);

    Fixture {
        _root: root,
        config,
    }
}

#[test]
fn test_pipeline_joins_all_files() {
    let fx = fixture("discharge.csv");
    let report = run_from_config(&fx.config).unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.files_processed(), 2);
    assert_eq!(report.rows(), 4);

    let texts: Vec<&str> = (0..report.rows())
        .map(|row| report.table.get(row, TEXT_COLUMN).unwrap())
        .collect();
    assert_eq!(texts, vec!["ibuprofen", "daily", "metoprolol", "25 mg"]);
    assert_eq!(report.table.get(3, "Category"), Some("Dose"));
}

#[test]
fn test_pipeline_reads_gzip_notes() {
    let fx = fixture("discharge.csv.gz");
    let report = run_from_config(&fx.config).unwrap();

    assert_eq!(report.rows(), 4);
    assert_eq!(report.table.get(2, TEXT_COLUMN), Some("metoprolol"));
}

#[test]
fn test_pipeline_without_prefilter_matches() {
    let fx = fixture("discharge.csv");
    let mut config = fx.config.clone();
    config.join.prefilter_notes = false;

    let filtered = run_from_config(&fx.config).unwrap();
    let unfiltered = run_from_config(&config).unwrap();
    assert_eq!(filtered.table, unfiltered.table);
}

#[test]
fn test_two_files_for_one_note_concatenate_in_order() {
    let fx = fixture("discharge.csv");
    let labels = fx.config.input.label_dir.clone().unwrap();
    write_file(
        &labels,
        "NoteID-10001-DS-1_b.csv",
        "Category,Start Position,End Position\nDrug,1,3\nDrug,5,11\nDrug,13,15\n",
    );

    let report = run_from_config(&fx.config).unwrap();

    // NoteID-10001-DS-1.csv (2 rows), NoteID-10001-DS-1_b.csv (3), NoteID-10002-DS-3.csv (2)
    assert_eq!(report.rows(), 2 + 3 + 2);
    let texts: Vec<&str> = (0..5)
        .map(|row| report.table.get(row, TEXT_COLUMN).unwrap())
        .collect();
    assert_eq!(texts, vec!["ibuprofen", "daily", "The", "patient", "was"]);
    assert_eq!(report.outcomes[1].note_id, "10001-DS-1");
}

#[test]
fn test_pipeline_reports_bad_files_and_keeps_going() {
    let fx = fixture("discharge.csv");
    let labels = fx.config.input.label_dir.clone().unwrap();
    write_file(&labels, "NoteID-99999-DS-1.csv", "Start Position,End Position\n1,2\n");
    write_file(&labels, "NoteID-10003-DS-7.csv", "Start,End\n1,2\n");
    write_file(&labels, "NoteID-10003-DS-7_long.csv", "Start Position,End Position\n1,500\n");

    let report = run_from_config(&fx.config).unwrap();

    assert_eq!(report.rows(), 4);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures[0].error.contains("Schema"));
    assert!(report.failures[1].error.contains("Offset out of range"));
    assert!(report.failures[2].error.contains("Note not found"));
}

#[test]
fn test_pipeline_abort_mode() {
    let fx = fixture("discharge.csv");
    let labels = fx.config.input.label_dir.clone().unwrap();
    write_file(&labels, "NoteID-99999-DS-1.csv", "Start Position,End Position\n1,2\n");

    let mut config = fx.config.clone();
    config.join.error_mode = ErrorMode::Abort;

    let err = run_from_config(&config).unwrap_err();
    assert!(matches!(err, MedLabelError::NoteNotFound { ref note_id, .. } if note_id == "99999-DS-1"));
}

#[test]
fn test_clamp_policy_through_runner() {
    let fx = fixture("discharge.csv");
    let labels = fx.config.input.label_dir.clone().unwrap();
    write_file(&labels, "NoteID-10003-DS-7.csv", "Start Position,End Position\n12,500\n");

    let notes = NoteIndex::load(
        fx.config.input.notes_path.as_deref().unwrap(),
        &fx.config.notes,
        DuplicatePolicy::Reject,
        None,
    )
    .unwrap();
    let report = BatchRunner::new()
        .with_offset_policy(OffsetPolicy::Clamp)
        .run(&notes, &labels)
        .unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.table.get(4, TEXT_COLUMN), Some("note."));
}

#[test]
fn test_render_joined_csv() {
    let fx = fixture("discharge.csv");
    let report = run_from_config(&fx.config).unwrap();

    let mut out = Vec::new();
    render(&report.table, OutputFormat::Csv, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    let mut lines = out.lines();
    assert_eq!(
        lines.next(),
        Some("Category,Start Position,End Position,Text")
    );
    assert_eq!(lines.next(), Some("Drug,23,31,ibuprofen"));
}
