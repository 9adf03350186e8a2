//! Crate-level error types.
//!
//! Tool-level failures live in [`crate::tools::ToolError`]; logging failures
//! in [`crate::logging::LoggingError`]. This module holds the errors raised
//! while loading and checking configuration.
//!
//! No external error crates (anyhow, thiserror, eyre) are used.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The specific error that occurred
    pub kind: ConfigErrorKind,
}

/// Specific configuration error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Configuration file could not be read
    ReadFailed {
        /// The file that could not be read
        path: PathBuf,
        /// The underlying I/O error
        reason: String,
    },
    /// Configuration content is not valid TOML or does not match the schema
    ParseFailed {
        /// The file being parsed, when parsing from disk
        path: Option<PathBuf>,
        /// The parser error
        reason: String,
    },
    /// A field holds a value that cannot be used
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// Why it was invalid
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new ConfigError with the given kind.
    #[must_use]
    pub fn new(kind: ConfigErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a read failure error.
    #[must_use]
    pub fn read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::ReadFailed {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Creates a parse failure error.
    #[must_use]
    pub fn parse_failed(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::ParseFailed {
            path,
            reason: reason.into(),
        })
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Returns true if this error is about a specific field value.
    #[must_use]
    pub fn is_invalid_value(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::InvalidValue { .. })
    }

    /// Returns the offending field name, if this is an invalid value error.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            ConfigErrorKind::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::ReadFailed { path, reason } => {
                write!(
                    f,
                    "failed to read configuration '{}': {}; check the path and permissions",
                    path.display(),
                    reason
                )
            }
            ConfigErrorKind::ParseFailed {
                path: Some(path),
                reason,
            } => {
                write!(
                    f,
                    "failed to parse configuration '{}': {}",
                    path.display(),
                    reason
                )
            }
            ConfigErrorKind::ParseFailed { path: None, reason } => {
                write!(f, "invalid configuration TOML: {}", reason)
            }
            ConfigErrorKind::InvalidValue { field, reason } => {
                write!(f, "invalid configuration for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_failed_display_names_path() {
        let error = ConfigError::read_failed("/etc/toolhost.toml", "permission denied");
        let message = error.to_string();
        assert!(message.contains("/etc/toolhost.toml"));
        assert!(message.contains("permission denied"));
    }

    #[test]
    fn parse_failed_without_path() {
        let error = ConfigError::parse_failed(None, "expected '='");
        assert_eq!(
            error.to_string(),
            "invalid configuration TOML: expected '='"
        );
    }

    #[test]
    fn invalid_value_exposes_field() {
        let error = ConfigError::invalid_value("worker.idle_timeout_secs", "must be positive");
        assert!(error.is_invalid_value());
        assert_eq!(error.field(), Some("worker.idle_timeout_secs"));
        assert!(error.to_string().contains("must be positive"));
    }
}
