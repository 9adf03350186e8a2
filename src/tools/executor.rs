//! Executor seam shared by the host and worker backends.
//!
//! Both backends take the same [`ExecutionRequest`] and return the same
//! [`ExecutionResult`]; the router picks one per call from the tool's
//! classification.

mod host;
mod worker;

pub use host::{HostExecutor, HostModule, HOST_EXECUTOR};
pub use worker::{WorkerExecutor, WORKER_EXECUTOR};

use crate::tools::definition::ToolInfo;
use crate::tools::error::ToolError;
use crate::tools::result::ExecutionResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::time::Duration;

/// Health of an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Whether the executor can accept calls
    pub healthy: bool,
    /// Human-readable detail
    pub detail: String,
}

impl HealthStatus {
    /// Creates a healthy status.
    #[must_use]
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    /// Creates an unhealthy status.
    #[must_use]
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// One call routed to an executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// The tool being called
    pub tool: ToolInfo,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Per-call configuration
    pub config: Map<String, Value>,
    /// Per-call secrets
    pub secrets: Map<String, Value>,
    /// Time budget; `None` uses the executor default
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Creates a request with empty config and secrets.
    #[must_use]
    pub fn new(tool: ToolInfo, kwargs: Map<String, Value>) -> Self {
        Self {
            tool,
            kwargs,
            config: Map::new(),
            secrets: Map::new(),
            timeout: None,
        }
    }

    /// Sets the per-call configuration.
    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Sets the per-call secrets.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Map<String, Value>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Sets the time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A backend that runs tool calls.
///
/// Implementations never fail at the call boundary: every outcome,
/// including errors, is an `ExecutionResult`.
#[async_trait]
pub trait Executor: Send + Sync + Debug {
    /// Name reported in `ExecutionResult::executor_name`.
    fn name(&self) -> &'static str;

    /// Prepares the executor for calls.
    async fn start(&self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Releases executor resources.
    async fn stop(&self) {}

    /// Reports whether the executor can accept calls.
    async fn health_check(&self) -> HealthStatus;

    /// Runs one call.
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
}
