//! Configuration file types.
//!
//! These map directly onto the TOML file format. Every field is optional;
//! a missing section falls back to the library defaults.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::tools::security::SecurityConfig;
use crate::tools::worker::WorkerPoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for toolhost.
///
/// ```toml
/// tools_dir = "./tools"
///
/// [security]
/// blocked = ["requests.*"]
/// allow = ["open"]
///
/// [worker]
/// idle_timeout_secs = 300
/// call_timeout_secs = 20
/// env_passthrough = ["HOME", "SSL_CERT_FILE"]
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolhostConfig {
    /// Directory scanned for tool files.
    #[serde(default)]
    pub tools_dir: Option<PathBuf>,

    /// Code validator settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerFileConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ToolhostConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tools directory.
    #[must_use]
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    /// Checks every section that has constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.max_line_length == 0 {
            return Err(ConfigError::invalid_value(
                "security.max_line_length",
                "must be greater than zero",
            ));
        }
        self.worker.to_pool_config().validate()
    }
}

/// The `[worker]` section.
///
/// Durations are whole seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFileConfig {
    /// Runtime launcher program (default `uv`).
    #[serde(default)]
    pub runtime: Option<String>,

    /// Arguments placed between the runtime and `run`.
    #[serde(default)]
    pub runtime_args: Vec<String>,

    /// Idle time before a worker is reaped.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Interval between reaper passes.
    #[serde(default)]
    pub reap_interval_secs: Option<u64>,

    /// Default per-call timeout.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,

    /// Grace period between terminate and kill on shutdown.
    #[serde(default)]
    pub grace_period_secs: Option<u64>,

    /// Module-resolution variable name (default `PYTHONPATH`).
    #[serde(default)]
    pub module_path_var: Option<String>,

    /// Module-resolution path; defaults to each tool file's directory.
    #[serde(default)]
    pub module_path: Option<PathBuf>,

    /// Working directory for workers.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Host environment variables copied into workers.
    #[serde(default)]
    pub env_passthrough: Option<Vec<String>>,
}

impl WorkerFileConfig {
    /// Builds a pool configuration, filling unset fields with defaults.
    #[must_use]
    pub fn to_pool_config(&self) -> WorkerPoolConfig {
        let mut config = WorkerPoolConfig::default();
        if let Some(ref runtime) = self.runtime {
            config.runtime = runtime.clone();
        }
        config.runtime_args = self.runtime_args.clone();
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.reap_interval_secs {
            config.reap_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.call_timeout_secs {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.grace_period_secs {
            config.grace_period = Duration::from_secs(secs);
        }
        if let Some(ref var) = self.module_path_var {
            config.module_path_var = var.clone();
        }
        config.module_path = self.module_path.clone();
        config.working_dir = self.working_dir.clone();
        if let Some(ref names) = self.env_passthrough {
            config.env_passthrough = names.clone();
        }
        config
    }
}
