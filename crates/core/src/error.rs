//! Error types for the remedian domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; only genuinely fatal faults reach the top-level
//! `Error` — recoverable agent-loop conditions are modeled as values on
//! [`crate::outcome::StepOutcome`], not as errors.

use thiserror::Error;

/// The top-level error type for all remedian operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Environment errors ---
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    // --- Template rendering ---
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    /// The command exceeded the execution timeout. Carries whatever output
    /// was captured before the process was killed — the control loop embeds
    /// it in the timeout message so the model can see partial progress.
    #[error("Command timed out")]
    Timeout { output: String },

    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("Execution failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// A template referenced a variable that no context layer supplies.
    /// This is fatal on purpose: it surfaces configuration/template
    /// mismatches immediately instead of producing corrupted prompts.
    #[error("Undefined template variable: {0}")]
    UndefinedVariable(String),

    #[error("Template render failed: {0}")]
    Render(String),
}
