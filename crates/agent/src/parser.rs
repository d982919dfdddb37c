//! Action extraction from model responses.
//!
//! The protocol requires exactly one shell action per model turn. Anything
//! else — prose without a fenced block, or several blocks at once — is a
//! format violation the model is asked to correct, and nothing gets
//! executed.

use regex::Regex;

use remedian_core::error::Error;

/// Compile the configured action-extraction pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|e| Error::Config {
        message: format!("Invalid action pattern: {e}"),
    })
}

/// Extract the single action from a response's text content.
///
/// Returns the trimmed action when the pattern matches exactly once.
/// Otherwise returns the list of everything that was found (possibly
/// empty), for the diagnostic format-error message.
pub fn parse_action(pattern: &Regex, content: &str) -> Result<String, Vec<String>> {
    let matches: Vec<String> = pattern
        .captures_iter(content)
        .map(|caps| {
            // Group 1 is the command; fall back to the whole match for
            // patterns without a capture group.
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .collect();

    match matches.as_slice() {
        [single] => Ok(single.trim().to_string()),
        _ => Err(matches),
    }
}
