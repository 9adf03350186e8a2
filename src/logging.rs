//! Logging setup for toolhost.
//!
//! Logs go to stderr by default, or to a daily rolling file in an
//! XDG-compliant location. Stdout is never used: it may carry worker
//! protocol traffic or CLI output.
//!
//! The filter is taken from `RUST_LOG` when set, otherwise from the
//! configured level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
///
/// # Example
///
/// ```rust
/// use toolhost::logging::{LogLevel, LoggingConfig};
///
/// let config = LoggingConfig::new()
///     .with_level(LogLevel::Debug)
///     .with_file_output("/var/log/toolhost");
/// assert!(config.file);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    pub enabled: bool,
    /// Log files are named `{app_name}.log` with daily rotation.
    pub app_name: String,
    /// Custom log directory. If None, uses XDG data dir + "toolhost/logs".
    pub log_dir: Option<PathBuf>,
    /// Level used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Write to a rolling file instead of stderr.
    pub file: bool,
}

impl LoggingConfig {
    /// Creates a new LoggingConfig with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled logging configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Sets the application name for log file naming.
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Writes logs to rolling files under `path`.
    #[must_use]
    pub fn with_file_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(path.into());
        self.file = true;
        self
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: "toolhost".to_string(),
            log_dir: None,
            level: LogLevel::default(),
            file: false,
        }
    }
}

/// Log level filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level - most verbose.
    Trace,
    /// Debug level.
    Debug,
    /// Info level - default.
    #[default]
    Info,
    /// Warn level.
    Warn,
    /// Error level - least verbose.
    Error,
}

impl LogLevel {
    /// Converts to tracing_subscriber LevelFilter.
    #[must_use]
    pub fn to_filter(self) -> tracing_subscriber::filter::LevelFilter {
        match self {
            Self::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
            Self::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            Self::Info => tracing_subscriber::filter::LevelFilter::INFO,
            Self::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            Self::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        }
    }
}

/// Guard that must be held to keep file logging active.
///
/// When dropped, flushes pending logs and stops file logging.
pub struct LoggingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingGuard").finish_non_exhaustive()
    }
}

static LOGGING_GUARD: OnceLock<LoggingGuard> = OnceLock::new();

/// Errors that can occur during logging initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingError {
    /// The specific error that occurred.
    pub kind: LoggingErrorKind,
}

/// Specific logging error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingErrorKind {
    /// Failed to determine XDG data directory.
    NoDataDir,
    /// Failed to create log directory.
    CreateDirFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for failure.
        reason: String,
    },
    /// Subscriber initialization failed.
    SubscriberInitFailed {
        /// The reason for failure.
        reason: String,
    },
}

impl LoggingError {
    /// Creates a new LoggingError with the given kind.
    #[must_use]
    pub fn new(kind: LoggingErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an error for missing XDG data directory.
    #[must_use]
    pub fn no_data_dir() -> Self {
        Self::new(LoggingErrorKind::NoDataDir)
    }

    /// Creates an error for failed directory creation.
    #[must_use]
    pub fn create_dir_failed(path: PathBuf, reason: impl Into<String>) -> Self {
        Self::new(LoggingErrorKind::CreateDirFailed {
            path,
            reason: reason.into(),
        })
    }

    /// Creates an error for subscriber initialization failure.
    #[must_use]
    pub fn subscriber_init_failed(reason: impl Into<String>) -> Self {
        Self::new(LoggingErrorKind::SubscriberInitFailed {
            reason: reason.into(),
        })
    }

    /// Returns true if this is a missing data directory error.
    #[must_use]
    pub fn is_no_data_dir(&self) -> bool {
        matches!(self.kind, LoggingErrorKind::NoDataDir)
    }
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LoggingErrorKind::NoDataDir => {
                write!(
                    f,
                    "could not determine XDG data directory; \
                     set XDG_DATA_HOME or use a custom log_dir"
                )
            }
            LoggingErrorKind::CreateDirFailed { path, reason } => {
                write!(
                    f,
                    "failed to create log directory '{}': {}; check permissions",
                    path.display(),
                    reason
                )
            }
            LoggingErrorKind::SubscriberInitFailed { reason } => {
                write!(
                    f,
                    "failed to initialize tracing subscriber: {}; \
                     a subscriber may already be set",
                    reason
                )
            }
        }
    }
}

impl std::error::Error for LoggingError {}

/// Returns the directory file logs are written to.
///
/// # Errors
///
/// Returns `NoDataDir` when no custom directory is set and the XDG data
/// directory cannot be determined.
pub fn log_dir(config: &LoggingConfig) -> Result<PathBuf, LoggingError> {
    if let Some(ref custom_dir) = config.log_dir {
        return Ok(custom_dir.clone());
    }

    dirs::data_local_dir()
        .map(|dir| dir.join("toolhost").join("logs"))
        .ok_or_else(LoggingError::no_data_dir)
}

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(config.level.to_filter().into())
        .from_env_lossy()
}

/// Installs the global subscriber.
///
/// Returns `Ok(None)` if logging is disabled, otherwise a guard that must be
/// held to keep file output flowing.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<LoggingGuard>, LoggingError> {
    if !config.enabled {
        return Ok(None);
    }

    let filter = build_filter(config);

    if !config.file {
        return tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(filter)
            .try_init()
            .map(|()| Some(LoggingGuard { _guard: None }))
            .map_err(|e| LoggingError::subscriber_init_failed(e.to_string()));
    }

    let dir = log_dir(config)?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| LoggingError::create_dir_failed(dir.clone(), e.to_string()))?;

    let file_appender = tracing_appender::rolling::daily(&dir, format!("{}.log", config.app_name));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .with(filter)
        .try_init()
        .map(|()| {
            Some(LoggingGuard {
                _guard: Some(guard),
            })
        })
        .map_err(|e| LoggingError::subscriber_init_failed(e.to_string()))
}

/// Initializes logging and keeps the guard for the process lifetime.
///
/// Returns `Ok(false)` if logging is disabled or already initialized.
///
/// # Errors
///
/// See [`init_logging`].
pub fn init_and_store_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    if LOGGING_GUARD.get().is_some() {
        return Ok(false);
    }

    match init_logging(config)? {
        Some(guard) => {
            let _ = LOGGING_GUARD.set(guard);
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_config_default_values() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.app_name, "toolhost");
        assert!(config.log_dir.is_none());
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.file);
    }

    #[test]
    fn logging_config_builder_pattern() {
        let config = LoggingConfig::new()
            .with_app_name("tools")
            .with_file_output("/tmp/logs")
            .with_level(LogLevel::Debug);

        assert_eq!(config.app_name, "tools");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(config.file);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn log_level_to_filter_mapping() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(LogLevel::Trace.to_filter(), LevelFilter::TRACE);
        assert_eq!(LogLevel::Debug.to_filter(), LevelFilter::DEBUG);
        assert_eq!(LogLevel::Info.to_filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Warn.to_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::Error.to_filter(), LevelFilter::ERROR);
    }

    #[test]
    fn log_level_parses_lowercase() {
        let config: LoggingConfig = toml::from_str("level = \"warn\"\nfile = true").unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.file);
        assert_eq!(config.app_name, "toolhost");
    }

    #[test]
    fn log_level_cli_names_match_config_names() {
        use clap::ValueEnum;

        for level in LogLevel::value_variants() {
            let cli_name = level.to_possible_value().unwrap().get_name().to_string();
            let toml_name = toml::Value::try_from(level).unwrap();
            assert_eq!(toml_name.as_str(), Some(cli_name.as_str()));
        }
        assert_eq!(LogLevel::from_str("DEBUG", true), Ok(LogLevel::Debug));
        assert!(LogLevel::from_str("verbose", true).is_err());
    }

    #[test]
    fn logging_error_display() {
        let message = LoggingError::no_data_dir().to_string();
        assert!(message.contains("XDG"));
        assert!(LoggingError::no_data_dir().is_no_data_dir());

        let error =
            LoggingError::create_dir_failed(PathBuf::from("/nonexistent/path"), "permission denied");
        let message = error.to_string();
        assert!(message.contains("/nonexistent/path"));
        assert!(message.contains("permission denied"));

        let message = LoggingError::subscriber_init_failed("already set").to_string();
        assert!(message.contains("subscriber"));
    }

    #[test]
    fn log_dir_uses_custom_when_provided() {
        let config = LoggingConfig::default().with_file_output("/custom/logs");
        assert_eq!(log_dir(&config).unwrap(), PathBuf::from("/custom/logs"));
    }

    #[test]
    fn log_dir_uses_xdg_when_not_provided() {
        if let Ok(resolved) = log_dir(&LoggingConfig::default()) {
            assert!(resolved.ends_with("toolhost/logs"));
        }
    }

    #[test]
    fn init_logging_returns_none_when_disabled() {
        let result = init_logging(&LoggingConfig::disabled()).unwrap();
        assert!(result.is_none());
        assert!(!init_and_store_logging(&LoggingConfig::disabled()).unwrap());
    }
}
