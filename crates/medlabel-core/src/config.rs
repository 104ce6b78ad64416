//! medlabel Configuration Management
//!
//! Handles configuration from environment variables, config files,
//! and command-line arguments with defaults matching the public
//! MIMIC-IV-Note release layout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Input and output locations
    pub input: InputConfig,

    /// Notes table layout
    pub notes: NotesConfig,

    /// Join behavior
    pub join: JoinConfig,

    /// Output rendering
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Input
        if let Ok(path) = std::env::var("MEDLABEL_NOTES_PATH") {
            self.input.notes_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("MEDLABEL_LABEL_DIR") {
            self.input.label_dir = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("MEDLABEL_OUTPUT") {
            self.input.output_path = Some(PathBuf::from(path));
        }

        // Notes layout
        if let Ok(column) = std::env::var("MEDLABEL_ID_COLUMN") {
            self.notes.id_column = column;
        }
        if let Ok(column) = std::env::var("MEDLABEL_TEXT_COLUMN") {
            self.notes.text_column = column;
        }

        // Join
        if let Ok(policy) = std::env::var("MEDLABEL_OFFSET_POLICY") {
            self.join.offset_policy = policy.parse()?;
        }
        if let Ok(policy) = std::env::var("MEDLABEL_DUPLICATE_POLICY") {
            self.join.duplicate_policy = policy.parse()?;
        }
        if let Ok(mode) = std::env::var("MEDLABEL_ERROR_MODE") {
            self.join.error_mode = mode.parse()?;
        }
        if let Ok(value) = std::env::var("MEDLABEL_PARALLEL") {
            self.join.parallel = parse_bool("MEDLABEL_PARALLEL", &value)?;
        }

        // Output
        if let Ok(format) = std::env::var("MEDLABEL_FORMAT") {
            self.output.format = format.parse()?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(value) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_bool("LOG_JSON", &value)?;
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InputConfig {
    /// Notes CSV (optionally gzip-compressed)
    pub notes_path: Option<PathBuf>,

    /// Directory of per-note label CSV files
    pub label_dir: Option<PathBuf>,

    /// Where to write the joined table (stdout when unset)
    pub output_path: Option<PathBuf>,
}

/// Notes table layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Column holding the note identifier
    pub id_column: String,

    /// Column holding the note text
    pub text_column: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            id_column: "note_id".to_string(),
            text_column: "text".to_string(),
        }
    }
}

/// Join behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// What to do with spans outside the note text
    pub offset_policy: OffsetPolicy,

    /// What to do with repeated note identifiers
    pub duplicate_policy: DuplicatePolicy,

    /// Whether a failing label file stops the run
    pub error_mode: ErrorMode,

    /// Process label files on a thread pool
    pub parallel: bool,

    /// Only load notes referenced by label filenames
    pub prefilter_notes: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            offset_policy: OffsetPolicy::Strict,
            duplicate_policy: DuplicatePolicy::FirstMatch,
            error_mode: ErrorMode::Continue,
            parallel: false,
            prefilter_notes: true,
        }
    }
}

/// Handling of label spans that fall outside the note text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetPolicy {
    /// Reject the span with an error
    #[default]
    Strict,
    /// Clamp both ends into the text; inverted spans become empty
    Clamp,
}

impl std::str::FromStr for OffsetPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "clamp" => Ok(Self::Clamp),
            _ => Err(ConfigError::InvalidValue {
                key: "offset_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Clamp => write!(f, "clamp"),
        }
    }
}

/// Handling of note identifiers that appear more than once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first row for each identifier
    #[default]
    FirstMatch,
    /// Fail the notes load
    Reject,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "first_match" | "first" => Ok(Self::FirstMatch),
            "reject" => Ok(Self::Reject),
            _ => Err(ConfigError::InvalidValue {
                key: "duplicate_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstMatch => write!(f, "first_match"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Batch behavior when a label file fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Record the failure and keep going
    #[default]
    Continue,
    /// Stop at the first failure
    Abort,
}

impl std::str::FromStr for ErrorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            _ => Err(ConfigError::InvalidValue {
                key: "error_mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Output rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Supported output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    /// Aligned plain-text table, never truncated
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(ConfigError::InvalidValue {
                key: "format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Sets variables for the duration of a test and restores them on drop
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            let saved = vars
                .iter()
                .map(|(key, value)| {
                    let old = std::env::var(key).ok();
                    std::env::set_var(key, value);
                    (*key, old)
                })
                .collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, old) in &self.saved {
                match old {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    fn clamp_config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[join]
offset_policy = "clamp"
parallel = false

[logging]
level = "warn"
"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.notes.id_column, "note_id");
        assert_eq!(config.notes.text_column, "text");
        assert_eq!(config.join.offset_policy, OffsetPolicy::Strict);
        assert_eq!(config.join.duplicate_policy, DuplicatePolicy::FirstMatch);
        assert_eq!(config.join.error_mode, ErrorMode::Continue);
        assert!(config.join.prefilter_notes);
        assert_eq!(config.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("clamp".parse::<OffsetPolicy>().unwrap(), OffsetPolicy::Clamp);
        assert_eq!(
            "first-match".parse::<DuplicatePolicy>().unwrap(),
            DuplicatePolicy::FirstMatch
        );
        assert_eq!("ABORT".parse::<ErrorMode>().unwrap(), ErrorMode::Abort);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("loose".parse::<OffsetPolicy>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[input]
notes_path = "/data/discharge.csv.gz"

[join]
offset_policy = "clamp"
parallel = true

[output]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.input.notes_path,
            Some(PathBuf::from("/data/discharge.csv.gz"))
        );
        assert_eq!(config.join.offset_policy, OffsetPolicy::Clamp);
        assert!(config.join.parallel);
        assert_eq!(config.join.error_mode, ErrorMode::Continue);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.notes.text_column, "text");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = clamp_config_file();
        let _env = EnvGuard::set(&[
            ("MEDLABEL_OFFSET_POLICY", "strict"),
            ("MEDLABEL_PARALLEL", "yes"),
            ("LOG_JSON", "true"),
        ]);

        let config = AppConfig::from_file(file.path())
            .unwrap()
            .with_env_override()
            .unwrap();

        assert_eq!(config.join.offset_policy, OffsetPolicy::Strict);
        assert!(config.join.parallel);
        assert!(config.logging.json_format);
        // Untouched by the environment
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_env_invalid_offset_policy() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = clamp_config_file();
        let _env = EnvGuard::set(&[("MEDLABEL_OFFSET_POLICY", "loose")]);

        let err = AppConfig::from_file(file.path())
            .unwrap()
            .with_env_override()
            .unwrap_err();

        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "offset_policy");
                assert_eq!(value, "loose");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_env_invalid_parallel_flag() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = EnvGuard::set(&[("MEDLABEL_PARALLEL", "sometimes")]);

        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "MEDLABEL_PARALLEL"
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/medlabel.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
