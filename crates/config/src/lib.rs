//! Configuration loading, validation, and management for remedian.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Validates all settings at load time. The agent section maps
//! one-to-one onto the control loop's immutable parameter set: prompt
//! templates, the action-extraction pattern, and the step/cost limits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Execution environment configuration
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Agent control loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observability stack (alert source) configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("environment", &self.environment)
            .field("agent", &self.agent)
            .field("observability", &self.observability)
            .finish()
    }
}

/// Model backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name sent to the backend (e.g. "gpt-4o")
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key (usually supplied via environment variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-million-token pricing override for cost accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingOverrideConfig>,
}

fn default_model_name() -> String {
    "gpt-4o".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_url: default_api_url(),
            api_key: None,
            pricing: None,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("pricing", &self.pricing)
            .finish()
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

/// Execution environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Working directory for executed commands (default: process cwd)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Wall-clock timeout per command in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Output longer than this is truncated head+tail before rendering
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_output_chars() -> usize {
    10_000
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout_secs: default_timeout_secs(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

/// The control loop's immutable parameter set.
///
/// Constructed once per run and never mutated. The defaults are the bare
/// minimum to run the agent; deployments override the templates per task
/// domain (the shipped CLI installs SRE prompts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Template for the system message, rendered once at the start of `run`
    #[serde(default = "default_system_template")]
    pub system_template: String,

    /// Template for the task (instance) message; `task` is bound
    #[serde(default = "default_instance_template")]
    pub instance_template: String,

    /// Template for the user turn injected after an execution timeout;
    /// `action` and `output` (partial, possibly truncated) are bound
    #[serde(default = "default_timeout_template")]
    pub timeout_template: String,

    /// Template for the user turn injected when the response does not
    /// contain exactly one action; `actions` (what was found) is bound
    #[serde(default = "default_format_error_template")]
    pub format_error_template: String,

    /// Template for the observation fed back after an execution; `output`
    /// is bound
    #[serde(default = "default_action_observation_template")]
    pub action_observation_template: String,

    /// Pattern extracting the single action from a response. Must capture
    /// the command in group 1 and must match exactly once per response.
    #[serde(default = "default_action_pattern")]
    pub action_pattern: String,

    /// Maximum number of model queries per run (0 = unlimited)
    #[serde(default)]
    pub step_limit: u64,

    /// Maximum accumulated model cost in USD per run (0 = unlimited)
    #[serde(default = "default_cost_limit")]
    pub cost_limit: f64,
}

fn default_system_template() -> String {
    "You are a helpful assistant that can do anything.".into()
}

fn default_instance_template() -> String {
    "Your task: {{task}}. Please reply with a single shell command in triple backticks. \
     To finish, the first line of the output of the shell command must be \
     'COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT'."
        .into()
}

fn default_timeout_template() -> String {
    "The last command <command>{{action}}</command> timed out and has been killed.\n\
     The output of the command was:\n<output>\n{{output}}\n</output>\n\
     Please try another command and make sure to avoid those requiring interactive input."
        .into()
}

fn default_format_error_template() -> String {
    "Please always provide EXACTLY ONE action in triple backticks.\n\
     Found {{ actions | length }} actions: {{ actions }}"
        .into()
}

fn default_action_observation_template() -> String {
    "Observation: {{output}}".into()
}

fn default_action_pattern() -> String {
    r"(?s)```bash\s*\n(.*?)\n```".into()
}

fn default_cost_limit() -> f64 {
    3.0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_template: default_system_template(),
            instance_template: default_instance_template(),
            timeout_template: default_timeout_template(),
            format_error_template: default_format_error_template(),
            action_observation_template: default_action_observation_template(),
            action_pattern: default_action_pattern(),
            step_limit: 0,
            cost_limit: default_cost_limit(),
        }
    }
}

/// Observability stack (alert source) settings.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Base URL of the observability stack; alerts are fetched from
    /// `{base_url}/prometheus/api/v1/alerts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bearer token for the alerts endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for ObservabilityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityConfig")
            .field("base_url", &self.base_url)
            .field("token", &redact(&self.token))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a specific file path, then apply environment
    /// variable overrides:
    /// - `REMEDIAN_API_KEY` / `OPENAI_API_KEY` — model API key
    /// - `REMEDIAN_MODEL` / `MODEL_NAME` — model name
    /// - `OBSERVABILITY_STACK_URL` — alert source base URL
    /// - `OBSERVABILITY_STACK_SERVICE_ACCOUNT_TOKEN` — alert source token
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("REMEDIAN_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(name) = std::env::var("REMEDIAN_MODEL").or_else(|_| std::env::var("MODEL_NAME")) {
            self.model.name = name;
        }

        if self.observability.base_url.is_none() {
            self.observability.base_url = std::env::var("OBSERVABILITY_STACK_URL").ok();
        }
        if self.observability.token.is_none() {
            self.observability.token =
                std::env::var("OBSERVABILITY_STACK_SERVICE_ACCOUNT_TOKEN").ok();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "environment.timeout_secs must be > 0".into(),
            ));
        }
        if self.agent.cost_limit < 0.0 {
            return Err(ConfigError::ValidationError(
                "agent.cost_limit must be >= 0".into(),
            ));
        }
        if self.agent.action_pattern.is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.action_pattern must not be empty".into(),
            ));
        }
        for (name, template) in [
            ("system_template", &self.agent.system_template),
            ("instance_template", &self.agent.instance_template),
            ("timeout_template", &self.agent.timeout_template),
            ("format_error_template", &self.agent.format_error_template),
            (
                "action_observation_template",
                &self.agent.action_observation_template,
            ),
        ] {
            if template.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "agent.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for remedian_core::Error {
    fn from(e: ConfigError) -> Self {
        remedian_core::Error::Config {
            message: e.to_string(),
        }
    }
}
