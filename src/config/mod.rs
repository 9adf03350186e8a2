//! Configuration management for toolhost.
//!
//! # Configuration File Format
//!
//! Configuration is stored in TOML format. The search order is:
//! 1. `./toolhost.toml` (project-local)
//! 2. `~/.config/toolhost/config.toml` (XDG config)
//!
//! # Example Configuration
//!
//! ```toml
//! tools_dir = "./tools"
//!
//! [security]
//! # extra patterns on top of the defaults
//! blocked = ["requests.delete"]
//! warned = ["urllib.request.*"]
//! # removes `open` from the defaults and exempts it
//! allow = ["open"]
//!
//! [worker]
//! runtime = "uv"
//! idle_timeout_secs = 600
//! call_timeout_secs = 30
//! env_passthrough = ["HOME", "SSL_CERT_FILE"]
//!
//! [logging]
//! level = "info"
//! file = false
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use toolhost::config;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), toolhost::error::ConfigError> {
//! // Load from default search paths
//! let config = config::load()?;
//!
//! // Load from a specific path
//! let config = config::from_path(Path::new("/etc/toolhost/config.toml"))?;
//! # Ok(())
//! # }
//! ```

mod file;
mod types;

pub use file::{from_path, from_str, load, search_paths, xdg_config_dir};

pub use types::{ToolhostConfig, WorkerFileConfig};
