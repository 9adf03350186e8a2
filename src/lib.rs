//! # toolhost: execution engine for LLM tool calls
//!
//! Sits behind a tool-calling server's "run" entry point. Per call it
//! decides whether a tool runs in the host process or in an isolated worker
//! subprocess, validates generated code before it can reach any tool, and
//! manages worker lifecycle over a line-delimited JSON protocol.
//!
//! ## Architecture
//!
//! - **CodeValidator**: lexes candidate code and flags disallowed calls and imports
//! - **Script metadata**: detects inline `# /// script` dependency headers
//! - **ToolCatalog**: discovers tool files and their public functions
//! - **HostExecutor**: runs native tools registered per module in-process
//! - **WorkerPool**: one persistent subprocess per tool file, reaped when idle
//! - **ExecutionRouter**: dispatches each call and returns one `ExecutionResult`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolhost::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = toolhost::config::load()?;
//!     let catalog = ToolCatalog::discover("./tools")?;
//!     let pool = WorkerPool::new(config.worker.to_pool_config())?;
//!     let router = ExecutionRouter::new(
//!         catalog,
//!         CodeValidator::from_config(&config.security),
//!         HostExecutor::new(),
//!         pool,
//!     );
//!
//!     let result = router.run_code("weather.forecast('Oslo')", CallContext::new()).await;
//!     println!("{}", result.result_text);
//!
//!     router.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod tools;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ToolhostConfig;
    pub use crate::error::ConfigError;
    pub use crate::logging::{init_and_store_logging, LogLevel, LoggingConfig};
    pub use crate::tools::{
        CallContext, CodeValidator, ExecutionResult, ExecutionRouter, HostExecutor, HostModule,
        Isolation, ToolCatalog, ToolError, ToolInfo, ValidationResult, WorkerPool,
        WorkerPoolConfig,
    };
}
