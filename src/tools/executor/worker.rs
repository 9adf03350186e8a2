//! Executor adapter over the worker pool.

use super::{ExecutionRequest, Executor, HealthStatus};
use crate::tools::error::ToolError;
use crate::tools::result::{stringify_value, ExecutionResult};
use crate::tools::worker::{WorkerPool, WorkerRequest};
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

/// Executor name reported for subprocess calls.
pub const WORKER_EXECUTOR: &str = "worker";

/// Runs tools in isolated worker subprocesses.
#[derive(Debug, Clone)]
pub struct WorkerExecutor {
    pool: WorkerPool,
}

impl WorkerExecutor {
    /// Wraps a worker pool.
    #[must_use]
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

#[async_trait]
impl Executor for WorkerExecutor {
    fn name(&self) -> &'static str {
        WORKER_EXECUTOR
    }

    async fn stop(&self) {
        self.pool.shutdown().await;
    }

    async fn health_check(&self) -> HealthStatus {
        if self.pool.is_shutting_down() {
            return HealthStatus::unhealthy("worker pool is shut down");
        }
        let stats = self.pool.stats();
        HealthStatus::healthy(format!("{} live workers", stats.worker_count))
    }

    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let ExecutionRequest {
            tool,
            kwargs,
            config,
            secrets,
            timeout,
        } = request;

        let Some(path) = tool.file.as_deref() else {
            let error = ToolError::not_found(format!("{} (no source file)", tool.name));
            return ExecutionResult::from_error(
                &tool.name,
                &error,
                started.elapsed(),
                WORKER_EXECUTOR,
            );
        };

        let call = WorkerRequest::new(tool.function.clone(), kwargs)
            .with_config(config)
            .with_secrets(secrets);

        match self.pool.call(path, call, timeout).await {
            Ok(value) => {
                let text = stringify_value(&value);
                debug!(tool = %tool.name, result_len = text.len(), "Worker tool completed");
                ExecutionResult::success(text, started.elapsed(), WORKER_EXECUTOR)
            }
            Err(error) => {
                ExecutionResult::from_error(&tool.name, &error, started.elapsed(), WORKER_EXECUTOR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::definition::ToolInfo;
    use crate::tools::worker::WorkerPoolConfig;
    use serde_json::Map;

    fn executor() -> WorkerExecutor {
        WorkerExecutor::new(WorkerPool::new(WorkerPoolConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn tool_without_file_is_not_found() {
        let request = ExecutionRequest::new(ToolInfo::new("search", "web"), Map::new());
        let result = executor().execute(request).await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("ToolNotFound"));
        assert_eq!(result.executor_name, "worker");
    }

    #[tokio::test]
    async fn stop_shuts_down_pool() {
        let executor = executor();
        assert!(executor.health_check().await.healthy);
        executor.stop().await;
        assert!(!executor.health_check().await.healthy);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("search.py");
        std::fs::write(&file, "def web():\n    pass\n").unwrap();
        let request =
            ExecutionRequest::new(ToolInfo::new("search", "web").with_file(&file), Map::new());
        let result = executor.execute(request).await;
        assert_eq!(result.error_type.as_deref(), Some("ShuttingDown"));
    }
}
