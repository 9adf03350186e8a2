//! Uniform execution result shared by every executor.

use crate::tools::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Outcome of one tool execution, regardless of where it ran.
///
/// Consumed by logging and by the outer response serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the tool completed without error
    pub success: bool,
    /// Stringified return value, or a rendered error message
    pub result_text: String,
    /// Wall-clock duration of the call
    pub duration_secs: f64,
    /// Which executor ran the call (`host` or `worker`)
    pub executor_name: String,
    /// Error taxonomy tag when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ExecutionResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        result_text: impl Into<String>,
        duration: Duration,
        executor_name: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            result_text: result_text.into(),
            duration_secs: duration.as_secs_f64(),
            executor_name: executor_name.into(),
            error_type: None,
        }
    }

    /// Creates a failed result with an explicit error tag.
    #[must_use]
    pub fn failure(
        error_type: impl Into<String>,
        result_text: impl Into<String>,
        duration: Duration,
        executor_name: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            result_text: result_text.into(),
            duration_secs: duration.as_secs_f64(),
            executor_name: executor_name.into(),
            error_type: Some(error_type.into()),
        }
    }

    /// Renders a tool error as `Error executing tool '<name>': <message>`.
    #[must_use]
    pub fn from_error(
        tool_name: &str,
        error: &ToolError,
        duration: Duration,
        executor_name: impl Into<String>,
    ) -> Self {
        Self::failure(
            error.error_type(),
            format!("Error executing tool '{}': {}", tool_name, error.message()),
            duration,
            executor_name,
        )
    }
}

/// Stringifies a tool return value.
///
/// Strings pass through verbatim, `null` becomes empty, anything else is
/// rendered as compact JSON.
#[must_use]
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
