//! The final run report.
//!
//! Aggregates the model's usage counters and the agent's run metrics into
//! one record, rendered to the console at run end and persisted as
//! `metrics.json`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use remedian_core::ModelUsage;

use crate::metrics::RunMetrics;

/// Aggregated metrics for one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// End-to-end wall-clock duration in seconds.
    pub duration_seconds: f64,

    /// Number of model queries.
    pub llm_calls: u64,
    /// Average model query latency in seconds.
    pub avg_llm_latency_seconds: f64,
    /// Accumulated model cost in USD.
    pub total_cost: f64,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
    /// Input + output tokens.
    pub total_tokens: u64,
    /// Reasoning tokens, for models that report them.
    pub reasoning_tokens: u64,
    /// Reasoning tokens as a percentage of output tokens.
    pub planning_overhead_percent: f64,

    /// Number of attempted action executions.
    pub tool_calls: u64,
    /// Number of attempts classified as errors.
    pub tool_failures: u64,
    /// Failures as a percentage of attempts.
    pub tool_error_rate_percent: f64,
    /// Average execution latency in seconds.
    pub avg_tool_latency_seconds: f64,
}

impl RunReport {
    /// Build a report from the run duration, the model's usage counters,
    /// and the agent's metrics.
    pub fn new(duration: Duration, usage: ModelUsage, metrics: &RunMetrics) -> Self {
        let planning_overhead_percent = if usage.output_tokens > 0 {
            usage.reasoning_tokens as f64 / usage.output_tokens as f64 * 100.0
        } else {
            0.0
        };

        Self {
            duration_seconds: duration.as_secs_f64(),
            llm_calls: usage.n_calls,
            avg_llm_latency_seconds: metrics.avg_model_latency(),
            total_cost: usage.cost,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            planning_overhead_percent,
            tool_calls: metrics.tool_calls,
            tool_failures: metrics.tool_errors,
            tool_error_rate_percent: metrics.tool_error_rate_percent(),
            avg_tool_latency_seconds: metrics.avg_tool_latency(),
        }
    }

    /// Render the report as a plain-text block for the console.
    pub fn render(&self) -> String {
        let sep = "=".repeat(50);
        format!(
            "{sep}\n\
             FINAL AGENT METRICS REPORT\n\
             {sep}\n\
             End-to-End Duration:  {:.2}s\n\
             Total LLM Calls:      {}\n\
             Avg LLM Latency:      {:.4}s\n\
             Total Cost:           ${:.4}\n\
             Total Input Tokens:   {}\n\
             Total Output Tokens:  {}\n\
             Total Tokens:         {}\n\
             Reasoning Tokens:     {}\n\
             Planning Overhead:    {:.2}%\n\
             Total Tool Calls:     {}\n\
             Tool Failures:        {}\n\
             Tool Error Rate:      {:.1}%\n\
             Avg Tool Latency:     {:.4}s\n\
             {sep}",
            self.duration_seconds,
            self.llm_calls,
            self.avg_llm_latency_seconds,
            self.total_cost,
            self.input_tokens,
            self.output_tokens,
            self.total_tokens,
            self.reasoning_tokens,
            self.planning_overhead_percent,
            self.tool_calls,
            self.tool_failures,
            self.tool_error_rate_percent,
            self.avg_tool_latency_seconds,
        )
    }
}
