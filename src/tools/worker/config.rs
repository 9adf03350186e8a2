//! Worker pool configuration types.
//!
//! Provides configuration options for worker subprocesses and the pool
//! that owns them.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Default idle time before a worker is reaped (10 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default interval between reaper passes (60 seconds).
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-call timeout (30 seconds).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period between terminate and kill on shutdown (5 seconds).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default runtime launcher, invoked as `<runtime> run <tool file>`.
pub const DEFAULT_RUNTIME: &str = "uv";

/// Default module-resolution environment variable.
pub const DEFAULT_MODULE_PATH_VAR: &str = "PYTHONPATH";

/// Environment variable carrying the configured working directory.
pub const WORKING_DIR_VAR: &str = "TOOLHOST_CWD";

fn default_env_passthrough() -> Vec<String> {
    if cfg!(windows) {
        vec!["SYSTEMROOT".to_string()]
    } else {
        Vec::new()
    }
}

/// Configuration for the worker pool.
///
/// Workers inherit nothing from the host environment except `PATH`, the
/// module-resolution variable, the optional working-directory marker, and
/// the variables named in `env_passthrough`. Secrets travel in-band with
/// each request, never through the environment.
///
/// # Example
///
/// ```rust
/// use toolhost::tools::worker::WorkerPoolConfig;
/// use std::time::Duration;
///
/// let config = WorkerPoolConfig::new()
///     .with_idle_timeout(Duration::from_secs(120))
///     .with_call_timeout(Duration::from_secs(10))
///     .with_env_passthrough(["HOME"]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Runtime launcher program.
    ///
    /// Default: `uv`
    pub runtime: String,

    /// Arguments placed between the runtime and `run`.
    pub runtime_args: Vec<String>,

    /// How long a worker may sit idle before the reaper evicts it.
    ///
    /// Default: 600 seconds
    pub idle_timeout: Duration,

    /// How often the reaper runs.
    ///
    /// Default: 60 seconds
    pub reap_interval: Duration,

    /// Timeout applied when a caller does not supply one.
    ///
    /// Default: 30 seconds
    pub call_timeout: Duration,

    /// Time between the terminate signal and a forced kill on shutdown.
    ///
    /// Default: 5 seconds
    pub grace_period: Duration,

    /// Name of the module-resolution variable.
    ///
    /// Default: `PYTHONPATH`
    pub module_path_var: String,

    /// Value for the module-resolution variable.
    ///
    /// When unset, the directory containing the tool file is used.
    pub module_path: Option<PathBuf>,

    /// Working directory for workers, also exported as `TOOLHOST_CWD`.
    pub working_dir: Option<PathBuf>,

    /// Extra host environment variables copied into the worker.
    pub env_passthrough: Vec<String>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            runtime_args: Vec::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            module_path_var: DEFAULT_MODULE_PATH_VAR.to_string(),
            module_path: None,
            working_dir: None,
            env_passthrough: default_env_passthrough(),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new worker pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime launcher.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Sets arguments placed before `run`.
    #[must_use]
    pub fn with_runtime_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the reaper interval.
    #[must_use]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Sets the default call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Sets the module-resolution variable name.
    #[must_use]
    pub fn with_module_path_var(mut self, name: impl Into<String>) -> Self {
        self.module_path_var = name.into();
        self
    }

    /// Sets the module-resolution path.
    #[must_use]
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    /// Sets the worker working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the environment pass-through list.
    #[must_use]
    pub fn with_env_passthrough<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_passthrough = names.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.trim().is_empty() {
            return Err(ConfigError::invalid_value("worker.runtime", "must not be empty"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "worker.idle_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "worker.reap_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "worker.call_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.module_path_var.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "worker.module_path_var",
                "must not be empty",
            ));
        }
        Ok(())
    }
}
