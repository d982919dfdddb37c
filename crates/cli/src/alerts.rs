//! Firing-alert retrieval from the observability stack.
//!
//! Alerts seed the task prompt. A fetch failure is never fatal — the agent
//! proceeds with an empty alert list and the model investigates from
//! scratch.

use serde_json::Value;
use tracing::{error, info};

/// Fetch all currently firing alerts from `{base_url}/prometheus/api/v1/alerts`.
pub async fn fetch_firing_alerts(base_url: &str, token: Option<&str>) -> Vec<Value> {
    let url = format!(
        "{}/prometheus/api/v1/alerts",
        base_url.trim_end_matches('/')
    );

    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client for alert fetch");
            return Vec::new();
        }
    };

    let mut request = client.get(&url).header("Content-Type", "application/json");
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let body: Value = match request.send().await {
        Ok(response) => match response.error_for_status() {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    error!(error = %e, "Failed to parse alerts response");
                    return Vec::new();
                }
            },
            Err(e) => {
                error!(error = %e, "Alerts endpoint returned error status");
                return Vec::new();
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to fetch alerts");
            return Vec::new();
        }
    };

    let alerts = parse_alerts_body(&body);
    info!(count = alerts.len(), "Refreshed firing alerts");
    alerts
}

/// Extract firing alerts from a Prometheus alerts API body.
fn parse_alerts_body(body: &Value) -> Vec<Value> {
    if body["status"] != "success" {
        return Vec::new();
    }

    body["data"]["alerts"]
        .as_array()
        .map(|alerts| {
            alerts
                .iter()
                .filter(|a| a["state"] == "firing")
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
