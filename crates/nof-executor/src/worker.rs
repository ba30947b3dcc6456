//! Per-job execution: run the command, format its output, report it.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::ControllerClient;
use crate::error::Result;
use crate::format::OutputFormatter;
use crate::job::{Job, Report};

/// Run `cmd` through `sh -c` and return its stdout. Dropping the future
/// kills the child.
pub async fn run_command(cmd: &str) -> Result<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        tracing::debug!(
            cmd,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "command exited unsuccessfully"
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One execution: run, format, report. Failures are logged, never fatal.
pub async fn execute_once(client: &ControllerClient, job: Uuid, cmd: &str, formatter: &OutputFormatter) {
    let raw = match run_command(cmd).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(%job, cmd, error = %e, "job execution failed");
            return;
        }
    };
    let report = Report::now(job, formatter.format(&raw));
    match client.report(&report).await {
        Ok(()) => tracing::debug!(%job, "reported result"),
        Err(e) => tracing::warn!(%job, error = %e, "error reporting result"),
    }
}

/// Loop until `cancel` fires: execute, then sleep `interval`. Cancellation
/// interrupts either phase.
pub async fn run_shell(
    client: ControllerClient,
    job: Job,
    interval: Duration,
    cancel: CancellationToken,
) {
    let formatter = OutputFormatter::new(job.opts.pattern.as_deref(), job.opts.template.as_deref());
    tracing::info!(job = %job.uuid, cmd = %job.opts.cmd, interval_secs = interval.as_secs(), "shell worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = execute_once(&client, job.uuid, &job.opts.cmd, &formatter) => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!(job = %job.uuid, "shell worker stopped");
}

/// Execute `job` once.
pub async fn run_oneshot(client: ControllerClient, job: Job, cancel: CancellationToken) {
    let formatter = OutputFormatter::new(job.opts.pattern.as_deref(), job.opts.template.as_deref());
    tracing::info!(job = %job.uuid, cmd = %job.opts.cmd, "running oneshot job");
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = execute_once(&client, job.uuid, &job.opts.cmd, &formatter) => {}
    }
}
