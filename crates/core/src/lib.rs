//! # Remedian Core
//!
//! Domain types, capability traits, and error definitions for the remedian
//! agent engine. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators — the LLM backend and the command
//! executor — are defined as traits here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod environment;
pub mod error;
pub mod message;
pub mod model;
pub mod outcome;

// Re-export key types at crate root for ergonomics
pub use environment::{Environment, ExecutionResult};
pub use error::{EnvironmentError, Error, ModelError, Result, TemplateError};
pub use message::{Message, Role};
pub use model::{Model, ModelResponse, ModelUsage};
pub use outcome::{RunOutcome, RunStatus, StepOutcome};
