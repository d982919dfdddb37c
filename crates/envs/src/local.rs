//! Local environment — execute commands as subprocesses on this machine.
//!
//! Commands run under `sh -c` with a wall-clock timeout. On timeout the
//! process is killed and whatever output was captured up to that point is
//! returned inside the timeout fault, so the control loop can show the
//! model the partial progress. Oversized output is truncated head+tail
//! before it ever reaches a prompt template.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use remedian_config::EnvironmentConfig;
use remedian_core::environment::{Environment, ExecutionResult};
use remedian_core::error::EnvironmentError;

/// How long to wait for the pipe readers after the child has exited.
/// Readers reach EOF only when every writer is gone; an orphaned
/// grandchild can hold the pipe open past the kill.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Execute commands locally with a per-command timeout.
pub struct LocalEnvironment {
    working_dir: PathBuf,
    timeout: Duration,
    max_output_chars: usize,
}

impl LocalEnvironment {
    /// Create a new local environment.
    pub fn new(working_dir: PathBuf, timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            working_dir,
            timeout,
            max_output_chars,
        }
    }

    /// Build an environment from configuration. An unset working directory
    /// means the process's current directory.
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        let working_dir = config
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(
            working_dir,
            Duration::from_secs(config.timeout_secs),
            config.max_output_chars,
        )
    }

    /// Combine whatever the readers have captured so far into one text.
    fn combined_output(&self, stdout: &SharedBuf, stderr: &SharedBuf) -> String {
        let stdout = String::from_utf8_lossy(&stdout.lock().unwrap()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.lock().unwrap()).into_owned();

        let mut combined = stdout;
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        truncate_output(&combined, self.max_output_chars)
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Read a pipe into a shared buffer chunk by chunk, so partial output is
/// observable even while the reader is still blocked on a live pipe.
fn spawn_reader<R>(mut reader: R, buf: SharedBuf) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.lock().unwrap().extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// Wait briefly for the readers to hit EOF.
async fn drain_readers(stdout_task: JoinHandle<()>, stderr_task: JoinHandle<()>) {
    let _ = tokio::time::timeout(READER_GRACE, async {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
    })
    .await;
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(&self, command: &str) -> Result<ExecutionResult, EnvironmentError> {
        debug!(command = %command, "Executing command");

        let mut child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvironmentError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EnvironmentError::Spawn("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EnvironmentError::Spawn("stderr not captured".into()))?;

        let stdout_buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = spawn_reader(stdout, stdout_buf.clone());
        let stderr_task = spawn_reader(stderr, stderr_buf.clone());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                drain_readers(stdout_task, stderr_task).await;
                let output = self.combined_output(&stdout_buf, &stderr_buf);
                debug!(return_code = ?status.code(), "Command finished");
                Ok(ExecutionResult::new(output, status.code()))
            }
            Ok(Err(e)) => Err(EnvironmentError::Failed(e.to_string())),
            Err(_) => {
                warn!(
                    command = %command,
                    timeout_secs = self.timeout.as_secs(),
                    "Command timed out, killing"
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                drain_readers(stdout_task, stderr_task).await;
                let output = self.combined_output(&stdout_buf, &stderr_buf);
                Err(EnvironmentError::Timeout { output })
            }
        }
    }

    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut vars = serde_json::Map::new();
        vars.insert(
            "working_dir".into(),
            serde_json::json!(self.working_dir.display().to_string()),
        );
        vars.insert(
            "timeout_secs".into(),
            serde_json::json!(self.timeout.as_secs()),
        );
        vars
    }
}

/// Truncate output to at most roughly `max_chars`, keeping the head and
/// tail and marking how much was elided.
fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    let half = max_chars / 2;
    let head: String = output.chars().take(half).collect();
    let tail: String = output.chars().skip(total - half).collect();
    let elided = total - 2 * half;
    format!("{head}\n<elided {elided} characters>\n{tail}")
}
