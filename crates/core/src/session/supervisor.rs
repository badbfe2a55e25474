use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{mpsc, watch};

use super::TranscodeSession;
use crate::error::BridgeError;
use crate::transcoder;

/// How a transcoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Terminating signal number (Unix only).
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(status),
        }
    }

    /// No signal, SIGINT or SIGKILL all count as an expected stop.
    pub fn is_clean(&self) -> bool {
        match self.signal {
            None => true,
            Some(signal) => signal == SIGINT || signal == SIGKILL,
        }
    }
}

#[cfg(unix)]
const SIGINT: i32 = nix::libc::SIGINT;
#[cfg(unix)]
const SIGKILL: i32 = nix::libc::SIGKILL;
#[cfg(not(unix))]
const SIGINT: i32 = 2;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Resolves once the transcoder has exited.
///
/// Returned by every stop call. Dropping it keeps the fire-and-forget
/// behavior; awaiting it (optionally under a timeout) confirms the exit.
#[derive(Debug, Clone)]
pub struct StopHandle {
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl StopHandle {
    pub(crate) fn new(exit: watch::Receiver<Option<ProcessExit>>) -> Self {
        Self { exit }
    }

    /// Wait for the exit. `None` if the supervisor went away without one.
    pub async fn wait(self) -> Option<ProcessExit> {
        wait_exit(self.exit).await
    }

    /// The exit, if it already happened.
    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }
}

pub(crate) async fn wait_exit(
    mut exit: watch::Receiver<Option<ProcessExit>>,
) -> Option<ProcessExit> {
    match exit.wait_for(Option::is_some).await {
        Ok(exit) => *exit,
        Err(_) => None,
    }
}

/// Supervise a freshly spawned transcoder.
///
/// Two tasks are started: one forwards stderr to the log line by line, the
/// other owns the child, delivers interrupt requests from `stop_rx`, and on
/// exit classifies it, runs `on_exit`, and publishes it on `exit_tx`. The
/// interrupt is sent from the task that reaps the child, so it never reaches
/// a recycled pid.
pub(crate) fn supervise<F>(
    mut child: Child,
    session: Arc<TranscodeSession>,
    mut stop_rx: mpsc::UnboundedReceiver<()>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
    on_exit: F,
) where
    F: FnOnce(&Arc<TranscodeSession>) + Send + 'static,
{
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(stderr, session.stream_id().to_string()));
    }

    tokio::spawn(async move {
        let stream_id = session.stream_id().to_string();
        let mut stop_open = true;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                request = stop_rx.recv(), if stop_open => match request {
                    Some(()) => {
                        if let Err(e) = transcoder::interrupt(&mut child) {
                            tracing::warn!(stream_id = %stream_id, error = %e, "failed to interrupt transcoder");
                        }
                    }
                    None => stop_open = false,
                },
            }
        };

        let exit = match status {
            Ok(status) => ProcessExit::from_status(status),
            Err(e) => {
                tracing::error!(stream_id = %stream_id, error = %e, "failed to wait for transcoder");
                ProcessExit {
                    code: None,
                    signal: None,
                }
            }
        };

        if exit.is_clean() {
            tracing::info!(
                stream_id = %stream_id,
                code = ?exit.code,
                signal = ?exit.signal,
                "transcoder stopped"
            );
        } else {
            let signal = exit.signal.unwrap_or_default();
            let err = BridgeError::UnexpectedTermination {
                stream_id: stream_id.clone(),
                signal,
            };
            tracing::warn!(stream_id = %stream_id, signal, "{err}");
        }

        on_exit(&session);
        exit_tx.send_replace(Some(exit));
    });
}

/// Forward stderr to the log, one event per non-empty line.
///
/// Lines are split on `\n` with a trailing `\r` dropped. Output is never
/// interpreted.
async fn forward_stderr(stderr: ChildStderr, stream_id: String) {
    let mut lines = BufReader::new(stderr).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(raw)) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches('\r');
                if !line.is_empty() {
                    tracing::info!(target: "transcoder", stream_id = %stream_id, "{line}");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream_id = %stream_id, error = %e, "transcoder stderr closed");
                break;
            }
        }
    }
}
