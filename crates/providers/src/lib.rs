//! LLM model implementations for remedian.
//!
//! All backends implement the `remedian_core::Model` trait. The control
//! loop is constructed against `Arc<dyn Model>` and never knows which
//! backend is in use.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;
