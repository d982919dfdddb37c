//! Prompt template rendering.
//!
//! Every message sent to the model is produced by rendering a configured
//! template against a layered variable context. Undefined variables are a
//! hard error, never silently substituted — a template referencing a
//! variable no layer supplies means the configuration and the templates
//! have drifted apart, and the run must fail before a corrupted prompt
//! reaches the model.

use minijinja::{Environment, UndefinedBehavior};

use remedian_core::error::TemplateError;

/// Render a template against a variable map.
///
/// Rendering is deterministic: identical inputs produce byte-identical
/// output.
pub fn render(
    template: &str,
    vars: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("prompt", template)
        .map_err(|e| TemplateError::Render(e.to_string()))?;

    let tmpl = env
        .get_template("prompt")
        .map_err(|e| TemplateError::Render(e.to_string()))?;

    tmpl.render(serde_json::Value::Object(vars.clone()))
        .map_err(|e| match e.kind() {
            minijinja::ErrorKind::UndefinedError => TemplateError::UndefinedVariable(e.to_string()),
            _ => TemplateError::Render(e.to_string()),
        })
}

/// Merge variable layers into one context, later layers overriding earlier
/// ones.
///
/// The control loop layers, lowest to highest precedence: configuration
/// fields, environment variables, model variables, run-scoped variables
/// (e.g. the task), call-specific variables.
pub fn layered_context(
    layers: &[&serde_json::Map<String, serde_json::Value>],
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = serde_json::Map::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
