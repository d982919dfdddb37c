//! Run and step outcome types.
//!
//! The control loop is driven by pattern-matching on [`StepOutcome`] rather
//! than by catching exceptions: recoverable conditions and terminal
//! conditions are ordinary values, and only uncontrolled faults travel
//! through the `Err` arm of a `Result`.

use serde::{Deserialize, Serialize};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The model declared the task finished via the submission marker.
    Submitted,
    /// The configured step or cost limit was reached.
    LimitsExceeded,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "Submitted"),
            Self::LimitsExceeded => write!(f, "LimitsExceeded"),
        }
    }
}

/// The terminal result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Which terminal condition ended the run.
    pub status: RunStatus,
    /// The final message: the submitted payload, or a description of the
    /// limit that tripped.
    pub message: String,
}

/// The outcome of one step of the control loop.
///
/// Both variants carry the text of the next user turn: for `Continue` it is
/// an observation or a corrective (format/timeout) message and the loop
/// proceeds; for `Terminal` it is the final user turn and the run ends.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The loop continues; `message` becomes the next user turn.
    Continue { message: String },
    /// The run ends with `status`; `message` becomes the final user turn.
    Terminal { status: RunStatus, message: String },
}
