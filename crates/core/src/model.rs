//! Model trait — the abstraction over LLM backends.
//!
//! A Model turns an ordered message history into a response and keeps
//! running usage counters (calls, tokens, cost) that the control loop reads
//! for limit enforcement and the driver reads for the final report.
//!
//! Implementations: OpenAI-compatible endpoints, mocks for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;

/// A complete response from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated text content.
    pub content: String,

    /// Backend-specific fields beyond `content` (e.g. which model actually
    /// responded). Carried onto the assistant message appended to history.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelResponse {
    /// Create a response with content only.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A point-in-time snapshot of a model's running usage counters.
///
/// Counters are monotonic non-decreasing for the lifetime of the model
/// instance; the control loop compares them against its configured limits
/// before every query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of completed queries.
    pub n_calls: u64,
    /// Accumulated cost in USD.
    pub cost: f64,
    /// Total input (prompt) tokens.
    pub input_tokens: u64,
    /// Total output (completion) tokens.
    pub output_tokens: u64,
    /// Total reasoning tokens, for models that report them.
    pub reasoning_tokens: u64,
}

/// The core Model trait.
#[async_trait]
pub trait Model: Send + Sync {
    /// A human-readable name for this model backend.
    fn name(&self) -> &str;

    /// Send the full conversation history and get a response.
    async fn query(&self, messages: &[Message]) -> Result<ModelResponse, ModelError>;

    /// Snapshot the running usage counters.
    fn usage(&self) -> ModelUsage;

    /// Extra variables this backend contributes to prompt templates.
    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}
