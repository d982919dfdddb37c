//! Per-run metrics owned by the control loop.
//!
//! Counters are monotonic non-decreasing within a run and are incremented
//! exactly once per attempted action execution, regardless of whether the
//! attempt succeeded, failed, or timed out. They live for the lifetime of
//! the agent instance and are read by the driver at shutdown.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running counters for one agent instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Number of attempted action executions (success + error + timeout).
    pub tool_calls: u64,

    /// Number of attempts classified as errors (non-zero exit or timeout).
    pub tool_errors: u64,

    /// Wall-clock latency of each attempted execution, in seconds, in
    /// attempt order.
    pub tool_latencies: Vec<f64>,

    /// Wall-clock latency of each model query, in seconds, in call order.
    pub model_latencies: Vec<f64>,
}

impl RunMetrics {
    /// Record one attempted action execution.
    pub fn record_tool_call(&mut self, latency: Duration, is_error: bool) {
        self.tool_calls += 1;
        if is_error {
            self.tool_errors += 1;
        }
        self.tool_latencies.push(latency.as_secs_f64());
    }

    /// Record one model query.
    pub fn record_model_latency(&mut self, latency: Duration) {
        self.model_latencies.push(latency.as_secs_f64());
    }

    /// Average execution latency in seconds, or 0.0 with no attempts.
    pub fn avg_tool_latency(&self) -> f64 {
        average(&self.tool_latencies)
    }

    /// Average model query latency in seconds, or 0.0 with no calls.
    pub fn avg_model_latency(&self) -> f64 {
        average(&self.model_latencies)
    }

    /// Fraction of attempts classified as errors, as a percentage.
    pub fn tool_error_rate_percent(&self) -> f64 {
        if self.tool_calls == 0 {
            0.0
        } else {
            self.tool_errors as f64 / self.tool_calls as f64 * 100.0
        }
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
