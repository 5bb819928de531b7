// External tool runner with a hard timeout

use crate::errors::ProcessError;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Run `program` with `args`, waiting at most `timeout`.
///
/// The run fails on spawn errors, a non-zero exit code, any output on stderr
/// (tools are invoked with `-loglevel error` or equivalent) and on timeout.
/// A timed-out process is killed. On every failure `output` is removed so a
/// partial file is never mistaken for a finished one.
#[instrument(skip(args), fields(program = %program.display(), timeout_secs = timeout.as_secs()))]
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
    output: &Path,
) -> Result<(), ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.display().to_string();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Spawn {
            program: program_name.clone(),
            reason: e.to_string(),
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(out)) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            if !out.status.success() || !stderr.is_empty() {
                Err(ProcessError::Failed {
                    program: program_name.clone(),
                    code: out.status.code(),
                    stderr: if stderr.is_empty() {
                        format!("Exited with code {:?} and empty stderr", out.status.code())
                    } else {
                        stderr
                    },
                })
            } else {
                Ok(())
            }
        }
        Ok(Err(e)) => Err(ProcessError::Failed {
            program: program_name.clone(),
            code: None,
            stderr: e.to_string(),
        }),
        Err(_) => Err(ProcessError::Timeout {
            program: program_name.clone(),
            seconds: timeout.as_secs(),
        }),
    };

    match &result {
        Ok(()) => debug!("Tool finished"),
        Err(e) => {
            warn!(error = %e, "Tool run failed, discarding output");
            remove_partial_output(output).await;
        }
    }

    result
}

async fn remove_partial_output(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!(path = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Timeout for transcoding a master of `size_bytes`: one second per MB,
/// never less than `min_seconds`.
pub fn transcode_timeout(size_bytes: u64, min_seconds: u64) -> Duration {
    Duration::from_secs((size_bytes / 1_000_000).max(min_seconds))
}
