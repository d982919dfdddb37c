//! The SRE prompt set installed for alert-driven runs.

use serde_json::Value;

/// System prompt for alert-driven runs.
pub const SRE_SYSTEM_PROMPT: &str = "You are a Site Reliability Engineer (SRE). \
    Your goal is to diagnose and remediate issues in a Kubernetes environment. \
    You have access to bash commands, including `kubectl`, `curl`, and standard \
    linux utilities. Execute commands to investigate the issue and fix it.";

/// Build the task text for a set of firing alerts.
///
/// Names the three artifact files the agent must create and the marker it
/// must emit to finish.
pub fn sre_task_prompt(alerts: &[Value]) -> serde_json::Result<String> {
    let alerts_json = serde_json::to_string_pretty(alerts)?;

    Ok(format!(
        "There are currently {count} firing alerts in the system.\n\n\
         Active Alerts:\n\
         ```json\n{alerts_json}\n```\n\n\
         Your Task:\n\
         1. Diagnose the root cause of these alerts.\n\
         2. Fix the issue if possible.\n\
         3. Once you are confident the issue is resolved (or you have a diagnosis), \
         create the following output files in the current directory:\n\
         \x20  - `diagnosis_struct_out.json`: A JSON block with diagnosis details \
         (fields: `root_cause`, `evidence`).\n\
         \x20  - `remediation_struct_out.json`: A JSON block with remediation details \
         (fields: `action_taken`, `result`).\n\
         \x20  - `agent_output.json`: A combined JSON with any other relevant info.\n\n\
         When you are done and the files are created, reply with \
         'COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT'.",
        count = alerts.len(),
    ))
}
