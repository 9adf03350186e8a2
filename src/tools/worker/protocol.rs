//! Line-delimited JSON protocol spoken with worker subprocesses.
//!
//! Each request and response is one UTF-8 JSON object terminated by `\n`.
//! There is no correlation id: a worker handles one request at a time and
//! answers with exactly one line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single call sent to a worker.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Function to call inside the tool file
    pub function: String,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Per-call configuration
    pub config: Map<String, Value>,
    /// Per-call secrets, passed by value and never cached
    pub secrets: Map<String, Value>,
}

impl WorkerRequest {
    /// Creates a request with empty config and secrets.
    #[must_use]
    pub fn new(function: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self {
            function: function.into(),
            kwargs,
            config: Map::new(),
            secrets: Map::new(),
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

    /// Serializes the request as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns the serializer error message if a value cannot be encoded.
    pub fn encode(&self) -> Result<String, String> {
        let mut line = serde_json::to_string(self).map_err(|e| e.to_string())?;
        line.push('\n');
        Ok(line)
    }
}

impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret_keys: Vec<&String> = self.secrets.keys().collect();
        f.debug_struct("WorkerRequest")
            .field("function", &self.function)
            .field("kwargs", &self.kwargs)
            .field("config", &self.config)
            .field("secrets", &secret_keys)
            .finish()
    }
}

/// A worker's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Return value of the function
    #[serde(default)]
    pub result: Value,
    /// Error raised by the function, if any
    #[serde(default)]
    pub error: Option<Value>,
}

impl WorkerResponse {
    /// Parses one response line.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the line is not a JSON
    /// object.
    pub fn decode(line: &str) -> Result<Self, String> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Err("empty response line".to_string());
        }
        serde_json::from_str(trimmed).map_err(|e| format!("malformed response: {e}"))
    }

    /// Splits the response into the function's value or its error message.
    ///
    /// # Errors
    ///
    /// Returns the error message when `error` is present and non-null.
    pub fn into_result(self) -> Result<Value, String> {
        match self.error {
            None | Some(Value::Null) => Ok(self.result),
            Some(Value::String(message)) => Err(message),
            Some(other) => Err(other.to_string()),
        }
    }
}
