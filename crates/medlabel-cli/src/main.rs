//! medlabel CLI - Command-line interface
//!
//! Usage:
//!   medlabel join --notes <discharge.csv.gz> --labels <dir> [--output <joined.csv>]
//!   medlabel note-id <name>...
//!   medlabel validate --labels <dir>

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use medlabel_core::{
    AppConfig, DuplicatePolicy, ErrorMode, LabelTable, LoggingConfig, OffsetPolicy, OutputFormat,
};
use medlabel_extractor::{
    extract_note_id, inspect_label_file, list_label_files, render, run_from_config,
};

#[derive(Parser)]
#[command(name = "medlabel")]
#[command(about = "Join medication-extraction labels with clinical note text")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join every label file in a directory with its note text
    Join(JoinArgs),
    /// Print the note id embedded in each name
    NoteId {
        /// File names (or any strings) to inspect
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Check label file names and columns without loading notes
    Validate {
        /// Directory of label CSV files
        #[arg(long)]
        labels: Option<PathBuf>,
    },
}

#[derive(Args)]
struct JoinArgs {
    /// Notes CSV (.csv or .csv.gz)
    #[arg(long)]
    notes: Option<PathBuf>,

    /// Directory of label CSV files
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: csv, json or table
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Spans outside the note: strict or clamp
    #[arg(long)]
    offset_policy: Option<OffsetPolicy>,

    /// Repeated note ids: first_match or reject
    #[arg(long)]
    duplicate_policy: Option<DuplicatePolicy>,

    /// Stop at the first failing label file
    #[arg(long)]
    abort_on_error: bool,

    /// Process label files in parallel
    #[arg(long)]
    parallel: bool,

    /// Load every note instead of only those named by label files
    #[arg(long)]
    no_prefilter: bool,
}

impl JoinArgs {
    /// CLI flags take precedence over file and environment settings
    fn apply(self, config: &mut AppConfig) {
        if let Some(path) = self.notes {
            config.input.notes_path = Some(path);
        }
        if let Some(dir) = self.labels {
            config.input.label_dir = Some(dir);
        }
        if let Some(path) = self.output {
            config.input.output_path = Some(path);
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(policy) = self.offset_policy {
            config.join.offset_policy = policy;
        }
        if let Some(policy) = self.duplicate_policy {
            config.join.duplicate_policy = policy;
        }
        if self.abort_on_error {
            config.join.error_mode = ErrorMode::Abort;
        }
        if self.parallel {
            config.join.parallel = true;
        }
        if self.no_prefilter {
            config.join.prefilter_notes = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Join(args) => {
            args.apply(&mut config);
            run_join(&config)
        }
        Commands::NoteId { names } => run_note_id(&names),
        Commands::Validate { labels } => {
            if let Some(dir) = labels {
                config.input.label_dir = Some(dir);
            }
            run_validate(&config)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    let mut config = config.with_env_override()?;

    if cli.log_json {
        config.logging.json_format = true;
    }
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }

    Ok(config)
}

/// Logs go to stderr so rendered output on stdout stays clean
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_join(config: &AppConfig) -> anyhow::Result<()> {
    let report = run_from_config(config).context("label join failed")?;

    write_output(&report.table, config)?;

    for failure in &report.failures {
        tracing::error!(file = %failure.file, "{}", failure.error);
    }
    if report.has_failures() {
        bail!(
            "{} of {} label files failed",
            report.failures.len(),
            report.failures.len() + report.files_processed()
        );
    }

    tracing::info!(
        files = report.files_processed(),
        rows = report.rows(),
        "Join complete"
    );
    Ok(())
}

fn write_output(table: &LabelTable, config: &AppConfig) -> anyhow::Result<()> {
    let format = config.output.format;
    match &config.input.output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            render(table, format, &mut writer)?;
            writer.flush().context("flushing output file")?;
            tracing::info!(path = %path.display(), rows = table.len(), "Wrote joined labels");
        }
        None => {
            let mut writer = BufWriter::new(io::stdout().lock());
            render(table, format, &mut writer)?;
            writer.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}

fn run_note_id(names: &[String]) -> anyhow::Result<()> {
    let mut failed = 0;
    for name in names {
        match extract_note_id(name) {
            Ok(id) => println!("{name}\t{id}"),
            Err(e) => {
                failed += 1;
                tracing::error!("{}", e);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} names carry no note id", names.len());
    }
    Ok(())
}

fn run_validate(config: &AppConfig) -> anyhow::Result<()> {
    let Some(dir) = config.input.label_dir.as_deref() else {
        bail!("no label directory given (use --labels or MEDLABEL_LABEL_DIR)");
    };

    let files = list_label_files(dir)?;
    let mut failed = 0;
    for file in &files {
        match inspect_label_file(dir, file) {
            Ok(summary) => println!("ok\t{}\t{}\t{}", summary.file, summary.note_id, summary.rows),
            Err(e) => {
                failed += 1;
                println!("FAIL\t{file}\t{e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} label files are invalid", files.len());
    }
    tracing::info!(files = files.len(), "All label files valid");
    Ok(())
}
