//! Configuration file loading.
//!
//! This module handles loading toolhost configuration from TOML files at
//! XDG-compliant locations.

use crate::config::types::ToolhostConfig;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name for project-local config.
const LOCAL_CONFIG_NAME: &str = "toolhost.toml";

/// Default configuration file name within XDG config directory.
const XDG_CONFIG_NAME: &str = "config.toml";

/// Application name for XDG directory lookup.
const APP_NAME: &str = "toolhost";

/// Loads configuration from the default search paths.
///
/// Search order:
/// 1. `./toolhost.toml` (project-local)
/// 2. `~/.config/toolhost/config.toml` (XDG config)
///
/// Returns the default configuration if no config file is found.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn load() -> Result<ToolhostConfig, ConfigError> {
    for path in search_paths() {
        if path.exists() {
            return from_path(&path);
        }
    }
    debug!("No configuration file found, using defaults");
    Ok(ToolhostConfig::default())
}

/// Loads configuration from a specific file path.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file contains invalid TOML
/// - The TOML doesn't match the expected schema
/// - A value is out of range
pub fn from_path(path: &Path) -> Result<ToolhostConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::read_failed(path, e.to_string()))?;

    let config: ToolhostConfig = toml::from_str(&contents)
        .map_err(|e| ConfigError::parse_failed(Some(path.to_path_buf()), e.to_string()))?;
    config.validate()?;
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid, doesn't match the schema, or
/// holds an out-of-range value.
///
/// # Example
///
/// ```rust
/// use toolhost::config::from_str;
///
/// let config = from_str(r#"
/// tools_dir = "./tools"
///
/// [worker]
/// call_timeout_secs = 10
/// "#).unwrap();
///
/// assert_eq!(config.worker.call_timeout_secs, Some(10));
/// ```
pub fn from_str(toml_str: &str) -> Result<ToolhostConfig, ConfigError> {
    let config: ToolhostConfig =
        toml::from_str(toml_str).map_err(|e| ConfigError::parse_failed(None, e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Returns the paths that would be searched for configuration files.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];

    if let Some(dir) = xdg_config_dir() {
        paths.push(dir.join(XDG_CONFIG_NAME));
    }

    paths
}

/// Returns the path to the XDG config directory for toolhost.
///
/// This is `~/.config/toolhost` on most systems.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigErrorKind;
    use crate::logging::LogLevel;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn from_str_parses_every_section() {
        let toml = r#"
tools_dir = "/srv/tools"

[security]
blocked = ["requests.*"]
allow = ["open"]
max_line_length = 100

[worker]
runtime = "uvx"
idle_timeout_secs = 300
env_passthrough = ["HOME"]

[logging]
level = "debug"
        "#;

        let config = from_str(toml).unwrap();

        assert_eq!(config.tools_dir, Some(PathBuf::from("/srv/tools")));
        assert_eq!(config.security.blocked, vec!["requests.*"]);
        assert_eq!(config.security.allow, vec!["open"]);
        assert_eq!(config.security.max_line_length, 100);
        assert!(config.security.enabled);
        assert_eq!(config.worker.runtime.as_deref(), Some("uvx"));
        assert_eq!(config.worker.idle_timeout_secs, Some(300));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.enabled);
    }

    #[test]
    fn from_str_empty_is_default() {
        assert_eq!(from_str("").unwrap(), ToolhostConfig::default());
    }

    #[test]
    fn from_str_error_on_invalid_toml() {
        let err = from_str("this is not valid toml [[[").unwrap_err();
        assert!(matches!(err.kind, ConfigErrorKind::ParseFailed { path: None, .. }));
    }

    #[test]
    fn from_str_rejects_out_of_range_values() {
        let err = from_str("[worker]\ncall_timeout_secs = 0\n").unwrap_err();
        assert!(err.is_invalid_value());
        assert_eq!(err.field(), Some("worker.call_timeout_secs"));
    }

    #[test]
    fn from_path_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("toolhost.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "tools_dir = \"tools\"\n\n[worker]\ngrace_period_secs = 1").unwrap();

        let config = from_path(&config_path).unwrap();

        assert_eq!(config.tools_dir, Some(PathBuf::from("tools")));
        assert_eq!(config.worker.grace_period_secs, Some(1));
    }

    #[test]
    fn from_path_error_on_missing_file() {
        let err = from_path(Path::new("/nonexistent/path/toolhost.toml")).unwrap_err();
        assert!(matches!(err.kind, ConfigErrorKind::ReadFailed { .. }));
        assert!(err.to_string().contains("/nonexistent/path/toolhost.toml"));
    }

    #[test]
    fn search_paths_starts_with_local() {
        let paths = search_paths();
        assert_eq!(paths[0], PathBuf::from(LOCAL_CONFIG_NAME));
    }

    #[test]
    fn xdg_config_dir_ends_with_app_name() {
        if let Some(dir) = xdg_config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
