//! In-process execution of native host tools.

use super::{ExecutionRequest, Executor, HealthStatus};
use crate::tools::catalog::module_id;
use crate::tools::definition::{FnTool, HostTool, SharedHostTool, ToolInfo};
use crate::tools::error::ToolError;
use crate::tools::result::{stringify_value, ExecutionResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Executor name reported for in-process calls.
pub const HOST_EXECUTOR: &str = "host";

/// A set of native functions registered under one module identifier.
#[derive(Debug, Clone, Default)]
pub struct HostModule {
    functions: HashMap<String, SharedHostTool>,
}

impl HostModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool under `name`.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, tool: impl HostTool + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(tool));
        self
    }

    /// Adds a synchronous closure under `name`.
    #[must_use]
    pub fn with_fn<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        let tool = FnTool::new(name.clone(), func);
        self.with_tool(name, tool)
    }

    /// Looks up a function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedHostTool> {
        self.functions.get(name).cloned()
    }

    /// Returns the function names, sorted.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if the module has no functions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Runs registered native tools inside the host process.
///
/// Modules are keyed by identifier (`greeting`, `net.fetch`). Calls may name
/// a module by identifier, by file path, or by file stem; paths under the
/// tools directory resolve to their dotted relative path.
///
/// There is no isolation: a host tool shares the process with its caller.
/// Errors and panics are caught and reported as failed results.
#[derive(Debug, Clone, Default)]
pub struct HostExecutor {
    tools_dir: Option<PathBuf>,
    modules: Arc<RwLock<HashMap<String, HostModule>>>,
}

impl HostExecutor {
    /// Creates an executor with no modules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tools directory used to resolve file paths.
    #[must_use]
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    /// Registers a module, replacing any module with the same identifier.
    pub fn load_module(&self, module_id: impl Into<String>, module: HostModule) {
        let module_id = module_id.into();
        let functions = module.len();
        let previous = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module_id.clone(), module);
        if previous.is_some() {
            debug!(module = %module_id, functions, "Reloaded host module");
        } else {
            debug!(module = %module_id, functions, "Loaded host module");
        }
    }

    /// Returns true if a module is registered under `module_id`.
    #[must_use]
    pub fn has_module(&self, module_id: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(module_id)
    }

    /// Returns the registered module identifiers, sorted.
    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Resolves a module reference to a registered identifier.
    ///
    /// Tries, in order: the reference as given, its dotted path relative to
    /// the tools directory, and its file stem.
    #[must_use]
    pub fn resolve_module_id(&self, reference: &str) -> String {
        if self.has_module(reference) {
            return reference.to_string();
        }

        let path = Path::new(reference);
        let looks_like_path =
            path.extension().is_some_and(|ext| ext == "py") || reference.contains(['/', '\\']);
        if !looks_like_path {
            return reference.to_string();
        }

        if let Some(dir) = &self.tools_dir {
            let candidate = module_id(dir, path);
            if self.has_module(&candidate) {
                return candidate;
            }
        }

        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.to_string())
    }

    /// Calls `function_name` in the module named by `tool_info.module`.
    ///
    /// Never fails: missing functions, tool errors and panics all become a
    /// failed `ExecutionResult`.
    pub async fn execute(
        &self,
        function_name: &str,
        kwargs: Map<String, Value>,
        tool_info: &ToolInfo,
    ) -> ExecutionResult {
        let started = Instant::now();
        let module_id = self.resolve_module_id(&tool_info.module);

        let tool = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&module_id)
            .and_then(|module| module.get(function_name));

        let Some(tool) = tool else {
            let error = ToolError::not_found(format!("{module_id}.{function_name}"));
            warn!(tool = %tool_info.name, module = %module_id, function = %function_name, "Host tool not found");
            return ExecutionResult::from_error(&tool_info.name, &error, started.elapsed(), HOST_EXECUTOR);
        };

        let args = Value::Object(kwargs);
        if let Err(error) = tool.validate_args(&args) {
            return ExecutionResult::from_error(
                &tool_info.name,
                &error,
                started.elapsed(),
                HOST_EXECUTOR,
            );
        }

        let outcome = tokio::spawn(async move { tool.invoke(args).await }).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                let text = stringify_value(&value);
                debug!(
                    tool = %tool_info.name,
                    result_len = text.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Host tool completed"
                );
                ExecutionResult::success(text, elapsed, HOST_EXECUTOR)
            }
            Ok(Err(error)) => {
                warn!(tool = %tool_info.name, error = %error, "Host tool failed");
                ExecutionResult::from_error(&tool_info.name, &error, elapsed, HOST_EXECUTOR)
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "task was cancelled".to_string()
                };
                warn!(tool = %tool_info.name, panic = %message, "Host tool panicked");
                ExecutionResult::failure(
                    "Panic",
                    format!("Error executing tool '{}': {}", tool_info.name, message),
                    elapsed,
                    HOST_EXECUTOR,
                )
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[async_trait]
impl Executor for HostExecutor {
    fn name(&self) -> &'static str {
        HOST_EXECUTOR
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::healthy(format!("{} host modules loaded", self.module_ids().len()))
    }

    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        HostExecutor::execute(self, &request.tool.function, request.kwargs, &request.tool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn greeting_module() -> HostModule {
        HostModule::new()
            .with_fn("greet", |args| {
                let name = args["name"].as_str().unwrap_or("stranger");
                Ok(json!(format!("hi {name}")))
            })
            .with_fn("divide", |args| {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                if b == 0 {
                    return Err(ToolError::execution_failed("divide", "division by zero"));
                }
                Ok(json!(a / b))
            })
            .with_fn("explode", |_| panic!("kaboom"))
            .with_fn("nothing", |_| Ok(Value::Null))
    }

    fn executor() -> HostExecutor {
        let executor = HostExecutor::new().with_tools_dir("/srv/tools");
        executor.load_module("greeting", greeting_module());
        executor
    }

    #[tokio::test]
    async fn returns_string_results_verbatim() {
        let info = ToolInfo::new("greeting", "greet");
        let result = executor()
            .execute("greet", kwargs(json!({"name": "Ada"})), &info)
            .await;
        assert!(result.success);
        assert_eq!(result.result_text, "hi Ada");
        assert_eq!(result.executor_name, "host");
        assert!(result.error_type.is_none());
    }

    #[tokio::test]
    async fn null_result_is_empty_text() {
        let info = ToolInfo::new("greeting", "nothing");
        let result = executor().execute("nothing", Map::new(), &info).await;
        assert!(result.success);
        assert_eq!(result.result_text, "");
    }

    #[tokio::test]
    async fn missing_function_is_tool_not_found() {
        let info = ToolInfo::new("greeting", "wave");
        let result = executor().execute("wave", Map::new(), &info).await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("ToolNotFound"));
    }

    #[tokio::test]
    async fn tool_errors_are_rendered() {
        let info = ToolInfo::new("greeting", "divide");
        let result = executor()
            .execute("divide", kwargs(json!({"a": 1, "b": 0})), &info)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("ExecutionFailure"));
        assert_eq!(
            result.result_text,
            "Error executing tool 'divide': division by zero"
        );
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let info = ToolInfo::new("greeting", "explode");
        let result = executor().execute("explode", Map::new(), &info).await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("Panic"));
        assert!(result.result_text.contains("kaboom"));
    }

    #[test]
    fn resolves_paths_under_tools_dir() {
        let executor = executor();
        executor.load_module("net.fetch", HostModule::new());
        assert_eq!(executor.resolve_module_id("greeting"), "greeting");
        assert_eq!(
            executor.resolve_module_id("/srv/tools/net/fetch.py"),
            "net.fetch"
        );
        assert_eq!(executor.resolve_module_id("/elsewhere/greeting.py"), "greeting");
    }

    #[tokio::test]
    async fn reload_replaces_module() {
        let executor = executor();
        executor.load_module(
            "greeting",
            HostModule::new().with_fn("greet", |_| Ok(json!("hello again"))),
        );
        let info = ToolInfo::new("greeting", "greet");
        let result = executor.execute("greet", Map::new(), &info).await;
        assert_eq!(result.result_text, "hello again");
        assert_eq!(executor.module_ids(), vec!["greeting"]);
    }

    #[tokio::test]
    async fn executor_trait_dispatch() {
        let executor = executor();
        let dynamic: &dyn Executor = &executor;
        assert_eq!(dynamic.name(), "host");
        assert!(dynamic.start().await.is_ok());
        assert!(dynamic.health_check().await.healthy);

        let request = ExecutionRequest::new(
            ToolInfo::new("greeting", "greet"),
            kwargs(json!({"name": "Grace"})),
        );
        let result = dynamic.execute(request).await;
        assert_eq!(result.result_text, "hi Grace");
        dynamic.stop().await;
    }
}
