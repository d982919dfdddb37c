//! Task submission detection.
//!
//! The model signals completion through the *output* of a command: when the
//! first non-blank line of an execution's output is exactly one of the
//! recognized markers, the run terminates with everything after that line
//! as the final payload. The check runs after every executed action, so
//! completion can happen on any turn.

/// The marker the instance prompt instructs the model to emit.
pub const SUBMISSION_MARKER: &str = "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT";

/// Older deployments used this marker; both terminate equivalently.
pub const LEGACY_SUBMISSION_MARKER: &str = "MINI_SWE_AGENT_FINAL_OUTPUT";

/// Check execution output for a submission marker.
///
/// Leading whitespace is ignored. If the first line, stripped, equals a
/// marker, returns the remaining lines joined back together with their
/// original line endings. Otherwise returns `None`.
pub fn detect_submission(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.trim_start().split_inclusive('\n').collect();
    let first = lines.first()?;

    if matches!(first.trim(), SUBMISSION_MARKER | LEGACY_SUBMISSION_MARKER) {
        Some(lines[1..].concat())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_on_first_line_submits() {
        let output = "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\nDone.\n";
        assert_eq!(detect_submission(output), Some("Done.\n".to_string()));
    }

    #[test]
    fn legacy_marker_submits() {
        let output = "MINI_SWE_AGENT_FINAL_OUTPUT\nall good\n";
        assert_eq!(detect_submission(output), Some("all good\n".to_string()));
    }

    #[test]
    fn leading_whitespace_is_ignored() {
        let output = "\n\n  COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\npayload";
        assert_eq!(detect_submission(output), Some("payload".to_string()));
    }

    #[test]
    fn payload_preserves_line_order_and_endings() {
        let output = "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\nfirst\nsecond\n";
        assert_eq!(detect_submission(output), Some("first\nsecond\n".to_string()));
    }

    #[test]
    fn marker_later_in_output_does_not_submit() {
        let output = "working on it\nCOMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\n";
        assert_eq!(detect_submission(output), None);
    }

    #[test]
    fn partial_marker_does_not_submit() {
        assert_eq!(
            detect_submission("COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUTS\n"),
            None
        );
    }

    #[test]
    fn empty_output_does_not_submit() {
        assert_eq!(detect_submission(""), None);
        assert_eq!(detect_submission("   \n  "), None);
    }

    #[test]
    fn marker_alone_submits_empty_payload() {
        assert_eq!(
            detect_submission("COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT"),
            Some(String::new())
        );
    }
}
