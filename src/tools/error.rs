//! Tool error types.
//!
//! Custom error types for tool operations including validation, lookup,
//! execution, and worker transport errors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in tool operations.
///
/// This type uses Box<ToolErrorKind> to keep the error size small,
/// enabling efficient use in Result types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    /// The specific error that occurred (boxed for size efficiency)
    kind: Box<ToolErrorKind>,
}

/// Specific tool error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// Code failed validation (syntax error or blocked pattern)
    Validation {
        /// Human-readable validation errors, one per finding
        errors: Vec<String>,
    },
    /// Tool or function not found
    NotFound {
        /// The name of the tool that was not found
        tool_name: String,
    },
    /// Tool function raised an error while running
    ExecutionFailed {
        /// The name of the tool
        tool_name: String,
        /// Reason for failure
        reason: String,
    },
    /// Worker process could not be spawned or its pipes broke mid-call
    WorkerTransport {
        /// The tool whose worker failed
        tool_name: String,
        /// What went wrong on the transport
        reason: String,
    },
    /// Worker call exceeded its time budget
    WorkerTimeout {
        /// The tool whose worker timed out
        tool_name: String,
        /// The timeout duration that was exceeded
        duration: Duration,
    },
    /// Tool file metadata header could not be read or parsed
    InvalidMetadata {
        /// The tool file
        path: PathBuf,
        /// Why parsing failed
        reason: String,
    },
    /// Worker pool is shutting down
    ShuttingDown,
    /// Internal error
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl ToolError {
    /// Creates a new ToolError with the given kind.
    #[must_use]
    pub fn new(kind: ToolErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// Returns a reference to the error kind.
    #[must_use]
    pub fn kind(&self) -> &ToolErrorKind {
        &self.kind
    }

    /// Creates a validation error from a list of findings.
    #[must_use]
    pub fn validation(errors: Vec<String>) -> Self {
        Self::new(ToolErrorKind::Validation { errors })
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(tool_name: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound {
            tool_name: tool_name.into(),
        })
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        })
    }

    /// Creates a worker transport error.
    #[must_use]
    pub fn worker_transport(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::WorkerTransport {
            tool_name: tool_name.into(),
            reason: reason.into(),
        })
    }

    /// Creates a worker timeout error.
    #[must_use]
    pub fn worker_timeout(tool_name: impl Into<String>, duration: Duration) -> Self {
        Self::new(ToolErrorKind::WorkerTimeout {
            tool_name: tool_name.into(),
            duration,
        })
    }

    /// Creates an invalid metadata error.
    #[must_use]
    pub fn invalid_metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidMetadata {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Creates a shutting down error.
    #[must_use]
    pub fn shutting_down() -> Self {
        Self::new(ToolErrorKind::ShuttingDown)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Returns the taxonomy tag reported in `ExecutionResult::error_type`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match *self.kind {
            ToolErrorKind::Validation { .. } => "ValidationError",
            ToolErrorKind::NotFound { .. } => "ToolNotFound",
            ToolErrorKind::ExecutionFailed { .. } => "ExecutionFailure",
            ToolErrorKind::WorkerTransport { .. } => "WorkerTransportFailure",
            ToolErrorKind::WorkerTimeout { .. } => "WorkerTimeout",
            ToolErrorKind::InvalidMetadata { .. } => "InvalidMetadata",
            ToolErrorKind::ShuttingDown => "ShuttingDown",
            ToolErrorKind::Internal { .. } => "InternalError",
        }
    }

    /// Returns the bare message without the tool-name prefix.
    ///
    /// Used when the caller already names the tool, e.g. the
    /// `Error executing tool '<name>': <message>` rendering.
    #[must_use]
    pub fn message(&self) -> String {
        match self.kind.as_ref() {
            ToolErrorKind::ExecutionFailed { reason, .. }
            | ToolErrorKind::WorkerTransport { reason, .. } => reason.clone(),
            ToolErrorKind::Validation { errors } => errors.join("\n"),
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is a worker timeout.
    ///
    /// Callers may choose to retry these with a larger budget; nothing in
    /// this crate retries automatically.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(*self.kind, ToolErrorKind::WorkerTimeout { .. })
    }

    /// Returns true if this error indicates the tool was not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(*self.kind, ToolErrorKind::NotFound { .. })
    }

    /// Returns true if this error is a worker transport failure.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(*self.kind, ToolErrorKind::WorkerTransport { .. })
    }

    /// Returns true if this error is a validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(*self.kind, ToolErrorKind::Validation { .. })
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            ToolErrorKind::Validation { errors } => {
                write!(f, "code validation failed: {}", errors.join("; "))
            }
            ToolErrorKind::NotFound { tool_name } => {
                write!(
                    f,
                    "tool '{}' not found; verify the tool is registered",
                    tool_name
                )
            }
            ToolErrorKind::ExecutionFailed { tool_name, reason } => {
                write!(f, "tool '{}' execution failed: {}", tool_name, reason)
            }
            ToolErrorKind::WorkerTransport { tool_name, reason } => {
                write!(
                    f,
                    "worker for tool '{}' failed: {}; the next call will start a fresh worker",
                    tool_name, reason
                )
            }
            ToolErrorKind::WorkerTimeout {
                tool_name,
                duration,
            } => {
                write!(
                    f,
                    "tool '{}' timed out after {:.1} seconds; retry with a larger timeout",
                    tool_name,
                    duration.as_secs_f64()
                )
            }
            ToolErrorKind::InvalidMetadata { path, reason } => {
                write!(
                    f,
                    "invalid script metadata in '{}': {}",
                    path.display(),
                    reason
                )
            }
            ToolErrorKind::ShuttingDown => {
                write!(f, "worker pool is shutting down; cannot accept new calls")
            }
            ToolErrorKind::Internal { message } => {
                write!(f, "internal tool error: {}", message)
            }
        }
    }
}

impl std::error::Error for ToolError {}
