//! Run metrics, cost accounting, and the final report for remedian agents.
//!
//! Provides the per-run counters the control loop maintains (tool calls,
//! failures, latencies), real-time cost estimation with built-in model
//! pricing, and the aggregated report the driver prints and persists at
//! run end.

pub mod metrics;
pub mod pricing;
pub mod report;

pub use metrics::RunMetrics;
pub use pricing::{ModelPricing, PricingTable};
pub use report::RunReport;
