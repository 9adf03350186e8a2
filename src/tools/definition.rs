//! Tool identity and host tool traits.
//!
//! Defines `ToolInfo`, the read-only identity of a discovered tool function,
//! and the `HostTool` trait implemented by native functions that run inside
//! the host process.

use crate::tools::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Identity of a discovered tool function.
///
/// Built by the catalog at discovery time and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Name callers use, e.g. `brave.search` or `greet`
    pub name: String,
    /// Module identifier (file stem or dotted path under the tools directory)
    pub module: String,
    /// Function name inside the module
    pub function: String,
    /// Source file, when the tool was discovered from one
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Parameter names in declaration order
    #[serde(default)]
    pub signature: Vec<String>,
}

impl ToolInfo {
    /// Creates a tool identity for `module.function`, named after the function.
    #[must_use]
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            name: function.clone(),
            module: module.into(),
            function,
            file: None,
            signature: Vec::new(),
        }
    }

    /// Sets the caller-facing name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the source file.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Sets the parameter names.
    #[must_use]
    pub fn with_signature<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature = params.into_iter().map(Into::into).collect();
        self
    }
}

/// The result type for tool execution futures.
pub type ToolExecutionFuture =
    Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'static>>;

/// Trait for tools executed inside the host process.
///
/// Implement this trait to expose a native function to the execution router.
/// Arguments arrive as a JSON object of keyword arguments.
///
/// # Example
///
/// ```rust
/// use toolhost::tools::{HostTool, ToolExecutionFuture};
/// use serde_json::Value;
///
/// #[derive(Debug)]
/// struct EchoTool;
///
/// impl HostTool for EchoTool {
///     fn invoke(&self, kwargs: Value) -> ToolExecutionFuture {
///         Box::pin(async move { Ok(kwargs) })
///     }
/// }
/// ```
pub trait HostTool: Send + Sync + Debug {
    /// Invokes the tool with keyword arguments.
    fn invoke(&self, kwargs: Value) -> ToolExecutionFuture;

    /// Validates the keyword arguments before invocation.
    ///
    /// The default implementation accepts any arguments.
    fn validate_args(&self, _kwargs: &Value) -> Result<(), ToolError> {
        Ok(())
    }
}

/// A shared host tool for dynamic dispatch.
pub type SharedHostTool = Arc<dyn HostTool>;

type SyncToolFn = dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync;

/// A host tool backed by a synchronous closure.
#[derive(Clone)]
pub struct FnTool {
    name: String,
    func: Arc<SyncToolFn>,
}

impl FnTool {
    /// Wraps a closure as a host tool.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the tool's function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl HostTool for FnTool {
    fn invoke(&self, kwargs: Value) -> ToolExecutionFuture {
        let func = Arc::clone(&self.func);
        Box::pin(async move { func(kwargs) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_info_defaults_name_to_function() {
        let info = ToolInfo::new("greeting", "greet");
        assert_eq!(info.name, "greet");
        assert_eq!(info.module, "greeting");
        assert!(info.file.is_none());
    }

    #[test]
    fn tool_info_builder() {
        let info = ToolInfo::new("search", "web")
            .with_name("brave.web")
            .with_file("/tools/search.py")
            .with_signature(["query", "count"]);
        assert_eq!(info.name, "brave.web");
        assert_eq!(info.file, Some(PathBuf::from("/tools/search.py")));
        assert_eq!(info.signature, vec!["query", "count"]);
    }

    #[tokio::test]
    async fn fn_tool_invokes_closure() {
        let tool = FnTool::new("double", |args: Value| {
            let n = args["n"].as_i64().unwrap_or_default();
            Ok(json!(n * 2))
        });
        let result = tool.invoke(json!({"n": 21})).await.unwrap();
        assert_eq!(result, json!(42));
        assert!(format!("{tool:?}").contains("double"));
    }
}
