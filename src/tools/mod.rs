//! Tool execution engine.
//!
//! This module decides, per call, whether a tool runs in the host process or
//! in an isolated worker subprocess, validates generated code before it can
//! reach any tool, and manages worker lifecycle:
//!
//! - **Security**: lexes candidate code and matches calls and imports against
//!   blocked and warned pattern sets
//! - **Metadata**: detects the inline `# /// script` dependency header and
//!   classifies tool files
//! - **Catalog**: discovers tool files and names their public functions
//! - **Executors**: the in-process host executor and the worker executor
//! - **Worker pool**: one persistent subprocess per tool file, reaped when idle
//! - **Router**: dispatches calls by classification into one `ExecutionResult`
//!
//! ## Architecture
//!
//! ```text
//! code -> CodeValidator -> CallExpression -> ToolCatalog
//!                                               |
//!                          +--------------------+-------------------+
//!                          | Isolation::Host                        | Isolation::Worker
//!                          v                                        v
//!                    HostExecutor                              WorkerPool
//!                 (module, function) map              `uv run <file>` over stdio
//!                          |                                        |
//!                          +---------------> ExecutionResult <------+
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use toolhost::tools::{
//!     CallContext, CodeValidator, ExecutionRouter, HostExecutor, ToolCatalog, WorkerPool,
//!     WorkerPoolConfig,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = ToolCatalog::discover("./tools")?;
//! let pool = WorkerPool::new(WorkerPoolConfig::default())?;
//! let router = ExecutionRouter::new(catalog, CodeValidator::new(), HostExecutor::new(), pool);
//!
//! let result = router
//!     .run_code("brave.search('rust async', count=3)", CallContext::new())
//!     .await;
//! println!("{}", result.result_text);
//!
//! router.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod definition;
mod error;
pub mod executor;
pub mod metadata;
mod result;
pub mod router;
pub mod security;
pub mod worker;

pub use catalog::{module_id, CatalogEntry, Isolation, ToolCatalog};
pub use definition::{FnTool, HostTool, SharedHostTool, ToolExecutionFuture, ToolInfo};
pub use error::{ToolError, ToolErrorKind};
pub use executor::{
    ExecutionRequest, Executor, HealthStatus, HostExecutor, HostModule, WorkerExecutor,
    HOST_EXECUTOR, WORKER_EXECUTOR,
};
pub use metadata::{Categorized, FunctionDef, ScriptMetadata};
pub use result::{stringify_value, ExecutionResult};
pub use router::{CallContext, ExecutionRouter, ROUTER_EXECUTOR};
pub use security::{CallExpression, CodeValidator, SecurityConfig, SyntaxError, ValidationResult};
pub use worker::{PoolStats, WorkerPool, WorkerPoolConfig, WorkerRequest, WorkerResponse, WorkerStats};
