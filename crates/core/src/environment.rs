//! Environment trait — the abstraction over command-execution backends.
//!
//! An Environment runs one shell command string and returns structured
//! output. The control loop never touches a process directly; it only sees
//! this seam, which keeps the loop testable with scripted environments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

/// The structured result of executing one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Combined textual output of the command.
    pub output: String,

    /// Exit code, if the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,

    /// The command that produced this result. Left empty by the backend;
    /// filled in by the execution observer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    /// Backend-specific extra fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionResult {
    /// Create a result with output and exit code.
    pub fn new(output: impl Into<String>, return_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            return_code,
            action: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Whether the backend classified this execution as successful.
    pub fn is_success(&self) -> bool {
        self.return_code.is_none_or(|code| code == 0)
    }
}

/// The core Environment trait.
#[async_trait]
pub trait Environment: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Execute a command string and return its structured output.
    ///
    /// A wall-clock timeout surfaces as [`EnvironmentError::Timeout`]
    /// carrying whatever output was captured before the kill; any other
    /// failure to run the command at all is an execution fault.
    async fn execute(&self, command: &str) -> Result<ExecutionResult, EnvironmentError>;

    /// Extra variables this backend contributes to prompt templates.
    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}
