//! Subprocess invocation for the external render and OCR tools.
//!
//! Every tool run is bounded three ways: a wall-clock timeout, a cap on the
//! bytes read from stdout, and the run's cancellation token. When any of
//! them trips, the child is killed rather than waited on.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Bytes of stderr kept for error messages.
const STDERR_KEEP: usize = 4 * 1024;

/// Limits applied to one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    /// Wall-clock budget for the whole invocation
    pub timeout: Duration,
    /// Maximum stdout bytes accepted
    pub max_output_bytes: usize,
}

/// How a tool invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} I/O error: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} output exceeded {limit} bytes")]
    OutputTooLarge { tool: String, limit: usize },

    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },
}

enum Outcome {
    Finished(Result<Vec<u8>, ProcessError>),
    TimedOut,
    Cancelled,
}

/// Run `command`, feed it `stdin`, and return its stdout.
///
/// The child is spawned with `kill_on_drop`, so a dropped future never
/// leaks a process.
pub async fn run_tool(
    mut command: Command,
    stdin: Option<&[u8]>,
    limits: ProcessLimits,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ProcessError> {
    let tool = tool_name(&command);

    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled { tool });
    }

    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        tool: tool.clone(),
        source,
    })?;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        res = tokio::time::timeout(limits.timeout, drive(&mut child, &tool, stdin, limits.max_output_bytes)) => {
            match res {
                Ok(result) => Outcome::Finished(result),
                Err(_) => Outcome::TimedOut,
            }
        }
    };

    match outcome {
        Outcome::Finished(Ok(stdout)) => Ok(stdout),
        Outcome::Finished(Err(err)) => {
            kill(&mut child, &tool).await;
            Err(err)
        }
        Outcome::TimedOut => {
            kill(&mut child, &tool).await;
            Err(ProcessError::Timeout {
                tool,
                timeout: limits.timeout,
            })
        }
        Outcome::Cancelled => {
            kill(&mut child, &tool).await;
            Err(ProcessError::Cancelled { tool })
        }
    }
}

/// Write stdin, read stdout/stderr concurrently, then reap the child.
async fn drive(
    child: &mut Child,
    tool: &str,
    input: Option<&[u8]>,
    max_output_bytes: usize,
) -> Result<Vec<u8>, ProcessError> {
    let io_err = |source| ProcessError::Io {
        tool: tool.to_string(),
        source,
    };

    let stdin_pipe = child.stdin.take();
    let stdout = child.stdout.take().ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout not captured",
        ))
    })?;
    // Drained on its own task so a chatty stderr never blocks stdout.
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(read_tail(pipe, STDERR_KEEP)));

    let write = async move {
        if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, input) {
            // The tool may exit before consuming everything; its exit
            // status carries the real error.
            if let Err(e) = pipe.write_all(bytes).await {
                log::debug!("{}: stdin closed early: {}", tool, e);
            }
            let _ = pipe.shutdown().await;
        }
        Ok::<(), ProcessError>(())
    };

    let read = async {
        match read_capped(stdout, max_output_bytes).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(ProcessError::OutputTooLarge {
                tool: tool.to_string(),
                limit: max_output_bytes,
            }),
            Err(e) => Err(io_err(e)),
        }
    };

    let ((), stdout) = tokio::try_join!(write, read)?;

    let status = child.wait().await.map_err(io_err)?;
    if !status.success() {
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        return Err(ProcessError::Exit {
            tool: tool.to_string(),
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

/// Read to EOF; `None` if more than `limit` bytes arrive.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: R,
    limit: usize,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Drain to EOF, keeping only the first `keep` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, keep: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = keep.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}

async fn kill(child: &mut Child, tool: &str) {
    if let Err(e) = child.kill().await {
        log::debug!("{}: kill failed (already exited?): {}", tool, e);
    }
}

fn tool_name(command: &Command) -> String {
    let program = command.as_std().get_program();
    Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy()
        .to_string()
}

/// Probe a tool with a version flag; returns the first output line.
///
/// Some tools print their version on stderr, so both streams are checked.
pub async fn probe_version(program: &Path, flag: &str, timeout: Duration) -> Option<String> {
    let output = tokio::time::timeout(
        timeout,
        Command::new(program)
            .arg(flag)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    first_line(&output.stdout).or_else(|| first_line(&output.stderr))
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}
