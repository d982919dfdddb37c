//! OpenAI-compatible model implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! an OpenAI-compatible `/v1/chat/completions` route. Non-streaming by
//! design: the control loop consumes whole responses.
//!
//! Keeps running usage counters (calls, tokens, cost) behind a lock so the
//! control loop can read them through `&self` for limit enforcement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{debug, warn};

use remedian_config::ModelConfig;
use remedian_core::error::ModelError;
use remedian_core::message::{Message, Role};
use remedian_core::model::{Model, ModelResponse, ModelUsage};
use remedian_telemetry::{ModelPricing, PricingTable};

/// An OpenAI-compatible chat-completions client.
pub struct OpenAiCompatModel {
    model: String,
    base_url: String,
    api_key: String,
    pricing: ModelPricing,
    client: reqwest::Client,
    totals: RwLock<ModelUsage>,
}

impl OpenAiCompatModel {
    /// Create a new client for a model at an OpenAI-compatible endpoint.
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        pricing: ModelPricing,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            pricing,
            client,
            totals: RwLock::new(ModelUsage::default()),
        })
    }

    /// Build a client from configuration. Pricing comes from the config
    /// override when present, otherwise from the built-in table.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let pricing = match &config.pricing {
            Some(p) => ModelPricing::new(p.input_per_m, p.output_per_m),
            None => {
                let table = PricingTable::with_defaults();
                table
                    .get(&config.name)
                    .cloned()
                    .unwrap_or(ModelPricing::new(0.0, 0.0))
            }
        };

        Self::new(
            config.name.clone(),
            config.api_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            pricing,
        )
    }

    /// Convert domain messages to the OpenAI wire format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    /// Fold one response's usage into the running totals.
    fn record_usage(&self, usage: &ApiUsage) {
        let reasoning = usage
            .completion_tokens_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens)
            .unwrap_or(0);
        let cost = self
            .pricing
            .cost(usage.prompt_tokens, usage.completion_tokens);

        let mut totals = self.totals.write().unwrap();
        totals.n_calls += 1;
        totals.cost += cost;
        totals.input_tokens += usage.prompt_tokens;
        totals.output_tokens += usage.completion_tokens;
        totals.reasoning_tokens += reasoning;
    }
}

#[async_trait]
impl Model for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn query(&self, messages: &[Message]) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "stream": false,
        });

        debug!(model = %self.model, messages = messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model backend returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        if let Some(usage) = &api_response.usage {
            self.record_usage(usage);
        } else {
            // Backends that omit usage still count as a call for the step limit.
            self.totals.write().unwrap().n_calls += 1;
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let mut extra = serde_json::Map::new();
        extra.insert("model".into(), serde_json::json!(api_response.model));
        if let Some(reason) = choice.finish_reason {
            extra.insert("finish_reason".into(), serde_json::json!(reason));
        }

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            extra,
        })
    }

    fn usage(&self) -> ModelUsage {
        *self.totals.read().unwrap()
    }

    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut vars = serde_json::Map::new();
        vars.insert("model_name".into(), serde_json::json!(self.model));
        vars
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model() -> OpenAiCompatModel {
        OpenAiCompatModel::new(
            "gpt-4o",
            "https://api.openai.com/v1/",
            "sk-test",
            ModelPricing::new(2.5, 10.0),
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let model = test_model();
        assert_eq!(model.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are an SRE."),
            Message::user("Diagnose the alert."),
            Message::assistant("Checking."),
        ];
        let api_messages = OpenAiCompatModel::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[2].role, "assistant");
        assert_eq!(api_messages[1].content, "Diagnose the alert.");
    }

    #[test]
    fn usage_accumulates_with_cost() {
        let model = test_model();
        assert_eq!(model.usage().n_calls, 0);

        let usage: ApiUsage = serde_json::from_str(
            r#"{"prompt_tokens":1000,"completion_tokens":500,
                "completion_tokens_details":{"reasoning_tokens":100}}"#,
        )
        .unwrap();
        model.record_usage(&usage);
        model.record_usage(&usage);

        let totals = model.usage();
        assert_eq!(totals.n_calls, 2);
        assert_eq!(totals.input_tokens, 2000);
        assert_eq!(totals.output_tokens, 1000);
        assert_eq!(totals.reasoning_tokens, 200);
        // 2 * (1000*2.5 + 500*10.0)/1M = 2 * 0.0075
        assert!((totals.cost - 0.015).abs() < 1e-10);
    }

    #[test]
    fn parse_response_body() {
        let body = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [
                {"message": {"role": "assistant", "content": "```bash\nls\n```"},
                 "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.model, "gpt-4o-2024-08-06");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("```bash\nls\n```")
        );
        assert_eq!(parsed.usage.as_ref().unwrap().prompt_tokens, 42);
    }

    #[test]
    fn parse_response_without_usage() {
        let body = r#"{"model": "local", "choices": [{"message": {"content": "hi"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.usage.is_none());
        assert!(parsed.choices[0].finish_reason.is_none());
    }

    #[test]
    fn from_config_uses_pricing_override() {
        let config = ModelConfig {
            name: "custom-model".into(),
            api_key: Some("sk-test".into()),
            pricing: Some(remedian_config::PricingOverrideConfig {
                input_per_m: 1.0,
                output_per_m: 2.0,
            }),
            ..ModelConfig::default()
        };
        let model = OpenAiCompatModel::from_config(&config).unwrap();
        assert!((model.pricing.cost(1_000_000, 1_000_000) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn template_vars_expose_model_name() {
        let vars = test_model().template_vars();
        assert_eq!(vars["model_name"], serde_json::json!("gpt-4o"));
    }
}
