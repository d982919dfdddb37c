//! The agent control loop.
//!
//! One step is: query the model with the full history → extract exactly one
//! action → execute it → feed the observation back. The loop is driven by
//! pattern-matching on [`StepOutcome`]: recoverable conditions (format
//! errors, execution timeouts) become corrective user turns and the loop
//! continues; terminal conditions (submission, limits) end the run with a
//! status; anything else is a fault that propagates to the caller.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, warn};

use remedian_config::AgentConfig;
use remedian_core::environment::{Environment, ExecutionResult};
use remedian_core::error::{EnvironmentError, Error};
use remedian_core::message::Message;
use remedian_core::model::{Model, ModelResponse};
use remedian_core::outcome::{RunOutcome, RunStatus, StepOutcome};
use remedian_telemetry::RunMetrics;

use crate::parser;
use crate::submission;
use crate::templates;

/// The result of the limit-gated model query.
enum QueryOutcome {
    Response(ModelResponse),
    LimitsExceeded(String),
}

/// The classified result of one action execution attempt.
enum ExecutionOutcome {
    Completed(ExecutionResult),
    TimedOut { action: String, output: String },
    Submitted(String),
}

/// The agent: owns the conversation history, the metrics, and the
/// orchestration of model and environment.
pub struct Agent {
    model: Arc<dyn Model>,
    env: Arc<dyn Environment>,
    config: AgentConfig,
    action_regex: Regex,
    messages: Vec<Message>,
    extra_template_vars: serde_json::Map<String, serde_json::Value>,
    metrics: RunMetrics,
}

impl Agent {
    /// Create a new agent. Fails if the configured action pattern does not
    /// compile.
    pub fn new(
        model: Arc<dyn Model>,
        env: Arc<dyn Environment>,
        config: AgentConfig,
    ) -> Result<Self, Error> {
        let action_regex = parser::compile_pattern(&config.action_pattern)?;

        Ok(Self {
            model,
            env,
            config,
            action_regex,
            messages: Vec::new(),
            extra_template_vars: serde_json::Map::new(),
            metrics: RunMetrics::default(),
        })
    }

    /// Add a run-scoped template variable (available to every template).
    pub fn insert_template_var(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra_template_vars.insert(key.into(), value);
    }

    /// The conversation history in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The metrics accumulated over this agent's lifetime.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// The agent's configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Render a template against the layered context: configuration fields,
    /// then environment variables, then model variables, then run-scoped
    /// variables, then call-specific variables — later layers win.
    fn render_template(
        &self,
        template: &str,
        call_vars: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, Error> {
        let config_vars = match serde_json::to_value(&self.config)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let env_vars = self.env.template_vars();
        let model_vars = self.model.template_vars();

        let context = templates::layered_context(&[
            &config_vars,
            &env_vars,
            &model_vars,
            &self.extra_template_vars,
            &call_vars,
        ]);

        Ok(templates::render(template, &context)?)
    }

    /// Run the loop until a terminal condition. Returns the final status
    /// and message; uncontrolled faults propagate as errors.
    pub async fn run(&mut self, task: &str) -> Result<RunOutcome, Error> {
        info!(task_len = task.len(), "Starting agent run");

        self.extra_template_vars
            .insert("task".into(), serde_json::json!(task));

        self.messages.clear();
        let system = self.render_template(&self.config.system_template, serde_json::Map::new())?;
        self.messages.push(Message::system(system));
        let instance =
            self.render_template(&self.config.instance_template, serde_json::Map::new())?;
        self.messages.push(Message::user(instance));

        loop {
            match self.step().await? {
                StepOutcome::Continue { message } => {
                    self.messages.push(Message::user(message));
                }
                StepOutcome::Terminal { status, message } => {
                    self.messages.push(Message::user(message.clone()));
                    info!(status = %status, "Agent run finished");
                    return Ok(RunOutcome { status, message });
                }
            }
        }
    }

    /// One full query → parse → execute → observe cycle.
    async fn step(&mut self) -> Result<StepOutcome, Error> {
        let response = match self.query().await? {
            QueryOutcome::Response(response) => response,
            QueryOutcome::LimitsExceeded(message) => {
                return Ok(StepOutcome::Terminal {
                    status: RunStatus::LimitsExceeded,
                    message,
                });
            }
        };

        let action = match parser::parse_action(&self.action_regex, &response.content) {
            Ok(action) => action,
            Err(found) => {
                debug!(
                    found = found.len(),
                    "Response did not contain exactly one action"
                );
                let mut vars = serde_json::Map::new();
                vars.insert("actions".into(), serde_json::json!(found));
                let message = self.render_template(&self.config.format_error_template, vars)?;
                return Ok(StepOutcome::Continue { message });
            }
        };

        match self.execute_action(&action).await? {
            ExecutionOutcome::Completed(result) => {
                let mut vars = serde_json::Map::new();
                vars.insert("output".into(), serde_json::json!(result.output));
                let message =
                    self.render_template(&self.config.action_observation_template, vars)?;
                Ok(StepOutcome::Continue { message })
            }
            ExecutionOutcome::TimedOut { action, output } => {
                let mut vars = serde_json::Map::new();
                vars.insert("action".into(), serde_json::json!(action));
                vars.insert("output".into(), serde_json::json!(output));
                let message = self.render_template(&self.config.timeout_template, vars)?;
                Ok(StepOutcome::Continue { message })
            }
            ExecutionOutcome::Submitted(final_output) => Ok(StepOutcome::Terminal {
                status: RunStatus::Submitted,
                message: final_output,
            }),
        }
    }

    /// Check limits, then query the model and append its response to the
    /// history.
    ///
    /// Limits are checked only here, at the start of a step, so a single
    /// step can overshoot the cost limit by at most one call's cost. That
    /// slack is accepted and documented.
    async fn query(&mut self) -> Result<QueryOutcome, Error> {
        let usage = self.model.usage();

        if self.config.step_limit > 0 && usage.n_calls >= self.config.step_limit {
            warn!(
                n_calls = usage.n_calls,
                limit = self.config.step_limit,
                "Step limit reached"
            );
            return Ok(QueryOutcome::LimitsExceeded(format!(
                "Step limit of {} model calls reached",
                self.config.step_limit
            )));
        }

        if self.config.cost_limit > 0.0 && usage.cost >= self.config.cost_limit {
            warn!(
                cost = usage.cost,
                limit = self.config.cost_limit,
                "Cost limit reached"
            );
            return Ok(QueryOutcome::LimitsExceeded(format!(
                "Cost limit of ${:.2} reached (spent ${:.4})",
                self.config.cost_limit, usage.cost
            )));
        }

        let started = Instant::now();
        let response = self.model.query(&self.messages).await?;
        self.metrics.record_model_latency(started.elapsed());
        debug!(
            content_len = response.content.len(),
            "Model responded"
        );

        self.messages.push(
            Message::assistant(response.content.clone()).with_extra(response.extra.clone()),
        );

        Ok(QueryOutcome::Response(response))
    }

    /// Execute one action and classify the outcome.
    ///
    /// Metrics are recorded exactly once per attempt on every exit path:
    /// success, error, timeout, and the fatal path. A detected submission
    /// counts as a success even when the command exited non-zero.
    async fn execute_action(&mut self, action: &str) -> Result<ExecutionOutcome, Error> {
        info!(action = %action, "Executing action");
        let started = Instant::now();
        let outcome = self.env.execute(action).await;
        let latency = started.elapsed();

        match outcome {
            Ok(mut result) => {
                if let Some(final_output) = submission::detect_submission(&result.output) {
                    self.metrics.record_tool_call(latency, false);
                    info!("Submission marker detected");
                    return Ok(ExecutionOutcome::Submitted(final_output));
                }

                let is_error = !result.is_success();
                self.metrics.record_tool_call(latency, is_error);
                if is_error {
                    warn!(return_code = ?result.return_code, "Action exited non-zero");
                }

                result.action = action.to_string();
                Ok(ExecutionOutcome::Completed(result))
            }
            Err(EnvironmentError::Timeout { output }) => {
                self.metrics.record_tool_call(latency, true);
                warn!(action = %action, "Action timed out");
                Ok(ExecutionOutcome::TimedOut {
                    action: action.to_string(),
                    output,
                })
            }
            Err(e) => {
                self.metrics.record_tool_call(latency, true);
                Err(Error::Environment(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remedian_core::error::ModelError;
    use remedian_core::message::Role;
    use remedian_core::model::ModelUsage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A model that replays scripted responses and meters a fixed cost per
    /// call.
    struct ScriptedModel {
        responses: Mutex<VecDeque<String>>,
        cost_per_call: f64,
        usage: Mutex<ModelUsage>,
        template_vars: serde_json::Map<String, serde_json::Value>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<&str>) -> Self {
            Self::with_cost(responses, 0.0)
        }

        fn with_cost(responses: Vec<&str>, cost_per_call: f64) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                cost_per_call,
                usage: Mutex::new(ModelUsage::default()),
                template_vars: serde_json::Map::new(),
            }
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn query(&self, _messages: &[Message]) -> Result<ModelResponse, ModelError> {
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::ApiError {
                    status_code: 500,
                    message: "scripted model exhausted".into(),
                })?;

            let mut usage = self.usage.lock().unwrap();
            usage.n_calls += 1;
            usage.cost += self.cost_per_call;
            usage.input_tokens += 100;
            usage.output_tokens += 20;

            Ok(ModelResponse::new(content))
        }

        fn usage(&self) -> ModelUsage {
            *self.usage.lock().unwrap()
        }

        fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
            self.template_vars.clone()
        }
    }

    /// An environment that replays scripted execution results and records
    /// every command it was asked to run.
    struct ScriptedEnv {
        script: Mutex<VecDeque<Result<ExecutionResult, EnvironmentError>>>,
        executed: Mutex<Vec<String>>,
    }

    impl ScriptedEnv {
        fn new(script: Vec<Result<ExecutionResult, EnvironmentError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                executed: Mutex::new(Vec::new()),
            }
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Environment for ScriptedEnv {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, command: &str) -> Result<ExecutionResult, EnvironmentError> {
            self.executed.lock().unwrap().push(command.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EnvironmentError::Failed("scripted env exhausted".into())))
        }
    }

    const SUBMIT_RESPONSE: &str = "```bash\n./submit.sh\n```";

    fn submit_result() -> Result<ExecutionResult, EnvironmentError> {
        Ok(ExecutionResult::new(
            "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\nDone.\n",
            Some(0),
        ))
    }

    fn agent(model: Arc<ScriptedModel>, env: Arc<ScriptedEnv>, config: AgentConfig) -> Agent {
        Agent::new(model, env, config).unwrap()
    }

    #[tokio::test]
    async fn history_starts_with_system_then_task() {
        let model = Arc::new(ScriptedModel::new(vec![SUBMIT_RESPONSE]));
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(model, env, AgentConfig::default());

        agent.run("restart the failing pod").await.unwrap();

        let messages = agent.messages();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("restart the failing pod"));
        assert_eq!(messages[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn submission_returns_remaining_output() {
        let model = Arc::new(ScriptedModel::new(vec![SUBMIT_RESPONSE]));
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(model.clone(), env, AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
        assert_eq!(outcome.message, "Done.\n");

        // The final payload is also the last user turn.
        let last = agent.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "Done.\n");
    }

    #[tokio::test]
    async fn legacy_marker_submits_equivalently() {
        let model = Arc::new(ScriptedModel::new(vec![SUBMIT_RESPONSE]));
        let env = Arc::new(ScriptedEnv::new(vec![Ok(ExecutionResult::new(
            "MINI_SWE_AGENT_FINAL_OUTPUT\nlegacy done\n",
            Some(0),
        ))]));
        let mut agent = agent(model, env, AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
        assert_eq!(outcome.message, "legacy done\n");
    }

    #[tokio::test]
    async fn observation_is_rendered_and_appended() {
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\necho hi\n```",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![
            Ok(ExecutionResult::new("hi\n", Some(0))),
            submit_result(),
        ]));
        let mut agent = agent(model, env.clone(), AgentConfig::default());

        agent.run("task").await.unwrap();

        assert_eq!(env.executed()[0], "echo hi");
        assert!(
            agent
                .messages()
                .iter()
                .any(|m| m.role == Role::User && m.content == "Observation: hi\n")
        );
    }

    #[tokio::test]
    async fn format_error_skips_execution_and_continues() {
        let model = Arc::new(ScriptedModel::new(vec![
            "I believe the pod is crashlooping.",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(model, env.clone(), AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);

        // Nothing was executed for the malformed turn.
        assert_eq!(env.executed().len(), 1);
        assert_eq!(agent.metrics().tool_calls, 1);

        // The corrective message became a user turn.
        assert!(
            agent
                .messages()
                .iter()
                .any(|m| m.role == Role::User && m.content.contains("EXACTLY ONE action"))
        );
    }

    #[tokio::test]
    async fn two_blocks_is_a_format_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\nls\n```\n```bash\npwd\n```",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(model, env.clone(), AgentConfig::default());

        agent.run("task").await.unwrap();
        assert_eq!(env.executed().len(), 1);
        // The diagnostic lists both blocks that were found.
        assert!(
            agent
                .messages()
                .iter()
                .any(|m| m.content.contains("Found 2 actions"))
        );
    }

    #[tokio::test]
    async fn step_limit_stops_before_next_model_call() {
        let config = AgentConfig {
            step_limit: 1,
            ..AgentConfig::default()
        };
        // A second response is queued; it must never be consumed.
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\necho hi\n```",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![Ok(ExecutionResult::new(
            "hi\n",
            Some(0),
        ))]));
        let mut agent = agent(model.clone(), env.clone(), config);

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::LimitsExceeded);
        assert_eq!(model.usage().n_calls, 1);
        // The limit tripped with zero additional tool calls.
        assert_eq!(agent.metrics().tool_calls, 1);
    }

    #[tokio::test]
    async fn cost_limit_stops_before_next_model_call() {
        let config = AgentConfig {
            cost_limit: 3.0,
            ..AgentConfig::default()
        };
        let model = Arc::new(ScriptedModel::with_cost(
            vec!["```bash\necho hi\n```", SUBMIT_RESPONSE],
            3.5,
        ));
        let env = Arc::new(ScriptedEnv::new(vec![Ok(ExecutionResult::new(
            "hi\n",
            Some(0),
        ))]));
        let mut agent = agent(model.clone(), env, config);

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::LimitsExceeded);
        assert!(outcome.message.contains("Cost limit"));
        assert_eq!(model.usage().n_calls, 1);
    }

    #[tokio::test]
    async fn zero_limits_mean_unlimited() {
        let config = AgentConfig {
            step_limit: 0,
            cost_limit: 0.0,
            ..AgentConfig::default()
        };
        let model = Arc::new(ScriptedModel::with_cost(
            vec![
                "```bash\necho a\n```",
                "```bash\necho b\n```",
                SUBMIT_RESPONSE,
            ],
            100.0,
        ));
        let env = Arc::new(ScriptedEnv::new(vec![
            Ok(ExecutionResult::new("a\n", Some(0))),
            Ok(ExecutionResult::new("b\n", Some(0))),
            submit_result(),
        ]));
        let mut agent = agent(model, env, config);

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
    }

    #[tokio::test]
    async fn nonzero_exit_counts_as_error_but_continues() {
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\nfalse\n```",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![
            Ok(ExecutionResult::new("boom\n", Some(2))),
            submit_result(),
        ]));
        let mut agent = agent(model, env, AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
        assert_eq!(agent.metrics().tool_calls, 2);
        assert_eq!(agent.metrics().tool_errors, 1);
        // The failure was still fed back as an observation.
        assert!(
            agent
                .messages()
                .iter()
                .any(|m| m.content == "Observation: boom\n")
        );
    }

    #[tokio::test]
    async fn failing_command_with_marker_still_submits() {
        let model = Arc::new(ScriptedModel::new(vec![SUBMIT_RESPONSE]));
        let env = Arc::new(ScriptedEnv::new(vec![Ok(ExecutionResult::new(
            "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\nfinished anyway\n",
            Some(1),
        ))]));
        let mut agent = agent(model, env, AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
        assert_eq!(outcome.message, "finished anyway\n");
        // Submission counts as a success in metrics.
        assert_eq!(agent.metrics().tool_errors, 0);
    }

    #[tokio::test]
    async fn timeout_is_recoverable_and_counted() {
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\ntail -f /var/log/syslog\n```",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![
            Err(EnvironmentError::Timeout {
                output: "partial log line".into(),
            }),
            submit_result(),
        ]));
        let mut agent = agent(model, env, AgentConfig::default());

        let outcome = agent.run("task").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Submitted);
        assert_eq!(agent.metrics().tool_calls, 2);
        assert_eq!(agent.metrics().tool_errors, 1);

        // The timeout message names the command and embeds partial output.
        let timeout_turn = agent
            .messages()
            .iter()
            .find(|m| m.content.contains("timed out"))
            .unwrap();
        assert!(timeout_turn.content.contains("tail -f /var/log/syslog"));
        assert!(timeout_turn.content.contains("partial log line"));
    }

    #[tokio::test]
    async fn fatal_environment_fault_propagates() {
        let model = Arc::new(ScriptedModel::new(vec!["```bash\nls\n```"]));
        let env = Arc::new(ScriptedEnv::new(vec![Err(EnvironmentError::Failed(
            "backend exploded".into(),
        ))]));
        let mut agent = agent(model, env, AgentConfig::default());

        let err = agent.run("task").await.unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
        // The attempt was still metered.
        assert_eq!(agent.metrics().tool_calls, 1);
        assert_eq!(agent.metrics().tool_errors, 1);
    }

    #[tokio::test]
    async fn model_template_vars_reach_prompts() {
        let mut model = ScriptedModel::new(vec![SUBMIT_RESPONSE]);
        model
            .template_vars
            .insert("model_name".into(), serde_json::json!("scripted-v1"));
        let config = AgentConfig {
            system_template: "You are running on {{model_name}}.".into(),
            ..AgentConfig::default()
        };
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(Arc::new(model), env, config);

        agent.run("task").await.unwrap();
        assert_eq!(
            agent.messages()[0].content,
            "You are running on scripted-v1."
        );
    }

    #[tokio::test]
    async fn undefined_template_variable_is_fatal() {
        let config = AgentConfig {
            system_template: "{{never_defined}}".into(),
            ..AgentConfig::default()
        };
        let model = Arc::new(ScriptedModel::new(vec![SUBMIT_RESPONSE]));
        let env = Arc::new(ScriptedEnv::new(vec![submit_result()]));
        let mut agent = agent(model, env, config);

        let err = agent.run("task").await.unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[tokio::test]
    async fn every_step_appends_assistant_then_user() {
        let model = Arc::new(ScriptedModel::new(vec![
            "```bash\necho one\n```",
            "no action here",
            SUBMIT_RESPONSE,
        ]));
        let env = Arc::new(ScriptedEnv::new(vec![
            Ok(ExecutionResult::new("one\n", Some(0))),
            submit_result(),
        ]));
        let mut agent = agent(model, env, AgentConfig::default());

        agent.run("task").await.unwrap();

        // system, task, then strictly alternating assistant/user pairs.
        let roles: Vec<Role> = agent.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles[0], Role::System);
        assert_eq!(roles[1], Role::User);
        for pair in roles[2..].chunks(2) {
            assert_eq!(pair[0], Role::Assistant);
            if pair.len() == 2 {
                assert_eq!(pair[1], Role::User);
            }
        }
        // 2 preamble + 3 steps * 2 messages
        assert_eq!(roles.len(), 8);
    }

    #[tokio::test]
    async fn invalid_action_pattern_fails_construction() {
        let config = AgentConfig {
            action_pattern: "(unclosed".into(),
            ..AgentConfig::default()
        };
        let model = Arc::new(ScriptedModel::new(vec![]));
        let env = Arc::new(ScriptedEnv::new(vec![]));
        assert!(Agent::new(model, env, config).is_err());
    }
}
