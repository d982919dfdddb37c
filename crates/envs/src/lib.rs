//! Command execution environments for remedian.
//!
//! All backends implement the `remedian_core::Environment` trait. The
//! shipped backend runs commands locally; remote or containerized
//! backends plug in at the same seam.

pub mod local;

pub use local::LocalEnvironment;
