//! Scenario data — per-run deployment context handed to the driver.
//!
//! A scenario file carries the kubeconfig document for the target cluster
//! and the address of its observability stack. Applying a scenario writes
//! the kubeconfig to disk and exports `KUBECONFIG` so every command the
//! agent executes inherits it.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Default location the orchestration layer drops the scenario file.
pub const DEFAULT_SCENARIO_PATH: &str = "/tmp/agent/scenario_data.json";

/// Where the kubeconfig document is written when the scenario carries one.
const KUBECONFIG_PATH: &str = "/tmp/kubeconfig.yaml";

/// Deployment context for one run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioData {
    /// Kubeconfig document for the target cluster.
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Prometheus URL of the target's observability stack.
    #[serde(default)]
    pub prometheus_url: Option<String>,

    /// Anything else the orchestration layer included.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ScenarioData {
    /// Load scenario data from a file. A missing file is not an error —
    /// the agent can run without deployment context.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("Scenario data not found at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario data from {}", path.display()))?;
        let data: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing scenario data from {}", path.display()))?;
        Ok(data)
    }

    /// Write the kubeconfig (if any) and export `KUBECONFIG`.
    ///
    /// Must run during startup, before the agent spawns any commands.
    pub fn apply(&self) -> anyhow::Result<()> {
        if let Some(kubeconfig) = &self.kubeconfig {
            std::fs::write(KUBECONFIG_PATH, kubeconfig)
                .with_context(|| format!("writing kubeconfig to {KUBECONFIG_PATH}"))?;
            // Single-threaded startup path; commands spawned later inherit it.
            unsafe { std::env::set_var("KUBECONFIG", KUBECONFIG_PATH) };
            info!("Kubeconfig written to {KUBECONFIG_PATH}");
        }
        Ok(())
    }

    /// Derive the observability stack base URL from the Prometheus URL.
    ///
    /// Alert queries go to `{base}/prometheus/api/v1/alerts`, so a URL that
    /// already ends in `/prometheus` is stripped back to its base.
    pub fn observability_base_url(&self) -> Option<String> {
        let url = self.prometheus_url.as_deref()?;
        Some(
            url.strip_suffix("/prometheus")
                .unwrap_or(url)
                .to_string(),
        )
    }
}
