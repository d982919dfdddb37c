//! `remedian run` — execute one agent run end to end.
//!
//! Startup order: load config → apply scenario (kubeconfig) → resolve the
//! task (explicit, or built from firing alerts) → run the agent. On an
//! uncontrolled fault a failure artifact is written; the metrics report is
//! printed and persisted either way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info};

use remedian_agent::Agent;
use remedian_config::AppConfig;
use remedian_core::model::Model;
use remedian_envs::LocalEnvironment;
use remedian_providers::OpenAiCompatModel;
use remedian_telemetry::RunReport;

use crate::alerts;
use crate::prompts;
use crate::scenario::{DEFAULT_SCENARIO_PATH, ScenarioData};

pub async fn run(
    task: Option<String>,
    config_path: PathBuf,
    scenario_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let started = Instant::now();

    let mut config = AppConfig::load_from(&config_path).context("loading configuration")?;

    // ── Scenario setup ──
    let scenario_path =
        scenario_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIO_PATH));
    let scenario = ScenarioData::load(&scenario_path)?;
    scenario.apply()?;

    if config.observability.base_url.is_none() {
        config.observability.base_url = scenario.observability_base_url();
    }

    // ── Task resolution ──
    let task = match task {
        Some(task) => task,
        None => {
            let alerts = match config.observability.base_url.as_deref() {
                Some(base_url) => {
                    alerts::fetch_firing_alerts(base_url, config.observability.token.as_deref())
                        .await
                }
                None => Vec::new(),
            };
            // Alert-driven runs use the SRE prompt set.
            config.agent.system_template = prompts::SRE_SYSTEM_PROMPT.into();
            prompts::sre_task_prompt(&alerts)?
        }
    };

    // ── Agent construction ──
    let model: Arc<OpenAiCompatModel> = Arc::new(
        OpenAiCompatModel::from_config(&config.model).context("building model client")?,
    );
    let env = Arc::new(LocalEnvironment::from_config(&config.environment));
    let mut agent = Agent::new(model.clone(), env, config.agent.clone())
        .context("building agent")?;

    let artifact_dir = config
        .environment
        .working_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // ── Run ──
    let outcome = agent.run(&task).await;
    let duration = started.elapsed();

    match &outcome {
        Ok(outcome) => {
            info!(status = %outcome.status, "Run completed");
        }
        Err(e) => {
            error!(error = %e, "Agent execution failed");
            write_failure_artifact(&artifact_dir, e)?;
        }
    }

    // ── Report ──
    let report = RunReport::new(duration, model.usage(), agent.metrics());
    println!("{}", report.render());

    let metrics_path = artifact_dir.join("metrics.json");
    std::fs::write(&metrics_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", metrics_path.display()))?;
    info!("Metrics saved to {}", metrics_path.display());

    outcome?;
    Ok(())
}

/// On an uncontrolled fault the run leaves a failure record where the
/// success artifacts would have been.
fn write_failure_artifact(dir: &Path, error: &remedian_core::Error) -> anyhow::Result<()> {
    let artifact = serde_json::json!({
        "error": error.to_string(),
        "status": "failed",
    });
    let path = dir.join("agent_output.json");
    std::fs::write(&path, serde_json::to_string_pretty(&artifact)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
