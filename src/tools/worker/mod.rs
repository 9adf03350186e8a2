//! Isolated worker subprocesses.
//!
//! Tool files that declare their own dependencies run in a separate
//! process started as `<runtime> run <tool file>` (by default `uv run`),
//! which resolves the declared dependencies into an isolated environment.
//! The worker stays alive between calls and speaks a line-delimited JSON
//! protocol over stdin/stdout:
//!
//! ```text
//! -> {"function": "search", "kwargs": {...}, "config": {...}, "secrets": {...}}
//! <- {"result": ..., "error": null}
//! ```
//!
//! Diagnostics go to the worker's stderr, which is inherited. Stdout is
//! reserved for protocol traffic.
//!
//! ## Lifecycle
//!
//! ```text
//! absent -> spawning -> alive-idle <-> alive-busy -> absent
//! ```
//!
//! A worker returns to `absent` when it times out, breaks the protocol,
//! dies, idles past `idle_timeout`, or the pool shuts down.

mod config;
mod pool;
mod process;
mod protocol;

pub use config::{
    WorkerPoolConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MODULE_PATH_VAR, DEFAULT_REAP_INTERVAL, DEFAULT_RUNTIME, WORKING_DIR_VAR,
};
pub use pool::{PoolStats, WorkerPool, WorkerStats};
pub use process::worker_environment;
pub use protocol::{WorkerRequest, WorkerResponse};
