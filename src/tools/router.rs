//! Routing of tool calls to the host or worker executor.
//!
//! The router owns the catalog, the validator and both executors. Callers
//! either name a catalogued tool directly or hand in generated code, which
//! is validated and parsed as a single literal-argument call before the
//! named tool is looked up. Code can only reach tools that are in the
//! catalog.

use crate::tools::catalog::{CatalogEntry, Isolation, ToolCatalog};
use crate::tools::definition::ToolInfo;
use crate::tools::error::ToolError;
use crate::tools::executor::{
    ExecutionRequest, Executor, HealthStatus, HostExecutor, WorkerExecutor,
};
use crate::tools::metadata;
use crate::tools::result::ExecutionResult;
use crate::tools::security::{CallExpression, CodeValidator};
use crate::tools::worker::WorkerPool;
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Executor name reported for failures that happen before dispatch.
pub const ROUTER_EXECUTOR: &str = "router";

/// Per-call configuration, secrets and time budget.
#[derive(Clone, Default)]
pub struct CallContext {
    /// Configuration forwarded to the tool
    pub config: Map<String, Value>,
    /// Secrets forwarded to the tool, never logged
    pub secrets: Map<String, Value>,
    /// Time budget; `None` uses the router default
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("config", &self.config)
            .field("secrets", &format_args!("[{} redacted]", self.secrets.len()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CallContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Sets the secrets.
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

/// Dispatches tool calls by classification.
#[derive(Debug)]
pub struct ExecutionRouter {
    catalog: RwLock<ToolCatalog>,
    validator: CodeValidator,
    host: HostExecutor,
    worker: WorkerExecutor,
    default_timeout: Duration,
}

impl ExecutionRouter {
    /// Creates a router over the given services.
    #[must_use]
    pub fn new(
        catalog: ToolCatalog,
        validator: CodeValidator,
        host: HostExecutor,
        pool: WorkerPool,
    ) -> Self {
        let default_timeout = pool.config().call_timeout;
        Self {
            catalog: RwLock::new(catalog),
            validator,
            host,
            worker: WorkerExecutor::new(pool),
            default_timeout,
        }
    }

    /// Sets the timeout used when a call does not carry one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the default call timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Returns the validator.
    #[must_use]
    pub fn validator(&self) -> &CodeValidator {
        &self.validator
    }

    /// Returns the host executor.
    #[must_use]
    pub fn host(&self) -> &HostExecutor {
        &self.host
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        self.worker.pool()
    }

    /// Looks up a catalogued tool.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<CatalogEntry> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns every catalogued tool name, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    /// Registers a native host tool in the catalog.
    pub fn register_host_tool(&self, info: ToolInfo) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register_host_tool(info);
    }

    /// Rescans the catalog's tools directory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tools directory no longer exists.
    pub fn rescan(&self) -> Result<(), ToolError> {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .rescan()
    }

    /// Starts both executors.
    ///
    /// # Errors
    ///
    /// Returns the first executor start failure.
    pub async fn start(&self) -> Result<(), ToolError> {
        self.host.start().await?;
        self.worker.start().await
    }

    /// Reports the health of both executors.
    pub async fn health(&self) -> Vec<(&'static str, HealthStatus)> {
        vec![
            (self.host.name(), self.host.health_check().await),
            (self.worker.name(), self.worker.health_check().await),
        ]
    }

    /// Calls a tool by identity.
    ///
    /// The classification comes from the catalog; tools outside it run in a
    /// worker when their file declares dependencies and in-process otherwise.
    pub async fn call(
        &self,
        tool: &ToolInfo,
        kwargs: Map<String, Value>,
        ctx: CallContext,
    ) -> ExecutionResult {
        let catalogued = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .isolation_of(&tool.name);
        let isolation = catalogued.unwrap_or_else(|| classify(tool));
        let entry = CatalogEntry {
            info: tool.clone(),
            isolation,
        };
        self.dispatch(entry, kwargs, ctx).await
    }

    /// Calls a catalogued tool by name.
    pub async fn call_named(
        &self,
        name: &str,
        kwargs: Map<String, Value>,
        ctx: CallContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        match self.lookup(name) {
            Some(entry) => self.dispatch(entry, kwargs, ctx).await,
            None => not_found(name, started),
        }
    }

    /// Validates generated code and runs the single tool call it contains.
    ///
    /// Nothing runs when validation fails; the errors are returned joined by
    /// newlines with `error_type = "ValidationError"`.
    pub async fn run_code(&self, code: &str, ctx: CallContext) -> ExecutionResult {
        let started = Instant::now();

        let validation = self.validator.validate(code);
        for warning in &validation.warnings {
            warn!(warning = %warning, "Code validation warning");
        }
        if !validation.valid {
            let result = ExecutionResult::failure(
                "ValidationError",
                validation.errors.join("\n"),
                started.elapsed(),
                ROUTER_EXECUTOR,
            );
            log_result("<code>", &result);
            return result;
        }

        let parsed = match validation.tokens.as_deref() {
            Some(tokens) => CallExpression::parse(tokens),
            None => CallExpression::parse_source(code),
        };
        let call = match parsed {
            Ok(call) => call,
            Err(error) => return rejected("<code>", &error, started),
        };

        let Some(entry) = self.lookup(&call.target) else {
            return not_found(&call.target, started);
        };
        let target = call.target.clone();
        match call.bind(&entry.info.signature) {
            Ok(kwargs) => self.dispatch(entry, kwargs, ctx).await,
            Err(error) => rejected(&target, &error, started),
        }
    }

    /// Runs a classified call on the matching executor.
    pub async fn dispatch(
        &self,
        entry: CatalogEntry,
        kwargs: Map<String, Value>,
        ctx: CallContext,
    ) -> ExecutionResult {
        let CallContext {
            config,
            secrets,
            timeout,
        } = ctx;
        let name = entry.info.name.clone();
        let request = ExecutionRequest::new(entry.info, kwargs)
            .with_config(config)
            .with_secrets(secrets)
            .with_timeout(timeout.unwrap_or(self.default_timeout));

        let executor: &dyn Executor = match entry.isolation {
            Isolation::Host => &self.host,
            Isolation::Worker => &self.worker,
        };
        let result = executor.execute(request).await;
        log_result(&name, &result);
        result
    }

    /// Stops the worker pool. Idempotent.
    pub async fn shutdown(&self) {
        self.host.stop().await;
        self.worker.stop().await;
    }
}

fn classify(tool: &ToolInfo) -> Isolation {
    let Some(file) = tool.file.as_deref() else {
        return Isolation::Host;
    };
    match metadata::parse(file) {
        Ok(Some(meta)) if meta.has_dependencies() => Isolation::Worker,
        Ok(_) => Isolation::Host,
        Err(error) => {
            warn!(tool = %tool.name, error = %error, "Classifying tool as in-process");
            Isolation::Host
        }
    }
}

fn not_found(name: &str, started: Instant) -> ExecutionResult {
    let error = ToolError::not_found(name);
    let result = ExecutionResult::from_error(name, &error, started.elapsed(), ROUTER_EXECUTOR);
    log_result(name, &result);
    result
}

fn rejected(name: &str, error: &ToolError, started: Instant) -> ExecutionResult {
    let result = ExecutionResult::failure(
        error.error_type(),
        error.message(),
        started.elapsed(),
        ROUTER_EXECUTOR,
    );
    log_result(name, &result);
    result
}

fn log_result(tool: &str, result: &ExecutionResult) {
    info!(
        tool = %tool,
        executor = %result.executor_name,
        success = result.success,
        duration_secs = result.duration_secs,
        error_type = result.error_type.as_deref().unwrap_or(""),
        "Tool call finished"
    );
}
