//! Shell process delegate

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::{current_runtime, DelegateError, ExecutionDelegate, ResultSink};
use crate::contracts::{CheckRequest, CheckResult};
use crate::engine::NotificationJob;

/// Upper bound for notification commands
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported when a command could not be started
const EXEC_FAILURE_CODE: i32 = 3;

/// Outcome of a finished shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    /// First line of standard output
    pub output: String,
    pub stderr: String,
}

/// Run `sh -c command`; `Ok(None)` when it did not finish within `timeout`
///
/// The child is killed when the timeout elapses.
pub async fn run_shell(command: &str, timeout: Duration) -> Result<Option<ShellOutput>, DelegateError> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DelegateError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => return Ok(None),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Some(ShellOutput {
        exit_code: output.status.code().unwrap_or(EXEC_FAILURE_CODE),
        output: stdout.lines().next().unwrap_or_default().trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
    }))
}

/// Runs each check as a child process on the tokio runtime
#[derive(Debug, Clone)]
pub struct ProcessDelegate {
    sink: ResultSink,
}

impl ProcessDelegate {
    pub fn new(sink: ResultSink) -> Self {
        Self { sink }
    }
}

impl ExecutionDelegate for ProcessDelegate {
    fn submit(&self, request: CheckRequest) -> Result<(), DelegateError> {
        let runtime = current_runtime()?;
        let sink = self.sink.clone();

        runtime.spawn(async move {
            let started = Instant::now();
            let timeout = Duration::from_secs(request.timeout_secs);
            let (exit_code, output) = match run_shell(&request.command, timeout).await {
                Ok(Some(finished)) => {
                    let output = if finished.output.is_empty() {
                        "(No output returned from plugin)".to_string()
                    } else {
                        finished.output
                    };
                    (finished.exit_code, output)
                }
                Ok(None) => {
                    tracing::debug!(checkable = %request.id, "Check exceeded its timeout");
                    return;
                }
                Err(err) => {
                    tracing::warn!(checkable = %request.id, error = %err, "Check could not be executed");
                    (EXEC_FAILURE_CODE, format!("(Could not execute check: {})", err))
                }
            };

            let result = CheckResult::active(
                request.id,
                request.generation,
                exit_code,
                output,
                started.elapsed().as_millis() as u64,
            );
            if sink.send(result).await.is_err() {
                tracing::debug!("Engine gone, dropping check result");
            }
        });
        Ok(())
    }

    fn deliver(&self, job: NotificationJob) -> Result<(), DelegateError> {
        spawn_notification(job)
    }
}

/// Run a notification command in the background and log its outcome
pub(super) fn spawn_notification(job: NotificationJob) -> Result<(), DelegateError> {
    let runtime = current_runtime()?;
    runtime.spawn(async move {
        let contact = job.dispatch.contact;
        match run_shell(&job.command, NOTIFICATION_TIMEOUT).await {
            Ok(Some(finished)) if finished.exit_code == 0 => {
                tracing::info!(contact = %contact, checkable = %job.dispatch.id, "Notification delivered");
            }
            Ok(Some(finished)) => {
                tracing::warn!(
                    contact = %contact,
                    exit_code = finished.exit_code,
                    stderr = %finished.stderr,
                    "Notification command failed"
                );
            }
            Ok(None) => {
                tracing::warn!(contact = %contact, "Notification command timed out");
            }
            Err(err) => {
                tracing::warn!(contact = %contact, error = %err, "Notification command not started");
            }
        }
    });
    Ok(())
}
