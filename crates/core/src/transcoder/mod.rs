//! The external transcoder process.
//!
//! The transcoder is treated as a black box that reads the SDP-described RTP
//! stream and pushes it to RTMP. This crate only needs three things from it:
//!
//! - **spawn**: start it with an argument vector ([`Transcoder::spawn`]).
//! - **exit**: observe when it stops (the returned [`Child`]).
//! - **signal**: ask it to stop ([`interrupt`]).
//!
//! [`Ffmpeg`] is the stock implementation. Any program that accepts the same
//! argv can be swapped in through [`Ffmpeg::with_program`] or a custom
//! [`Transcoder`].

pub mod args;

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

pub use args::TranscoderArgs;

/// Capability to launch a transcoder process.
pub trait Transcoder: Send + Sync + 'static {
    /// Start the transcoder with `args`.
    ///
    /// Implementations must pass `args` as an argument vector, never through
    /// a shell, and must pipe stderr so it can be forwarded to the log.
    fn spawn(&self, args: &[OsString]) -> io::Result<Child>;
}

/// FFmpeg launched directly from `program`.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    /// Resolve `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for Ffmpeg {
    fn spawn(&self, args: &[OsString]) -> io::Result<Child> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

/// Ask a running transcoder to stop with SIGINT.
///
/// FFmpeg treats SIGINT as "finish the output and exit". Returns without
/// waiting for the exit. A child that was already reaped is left alone.
#[cfg(unix)]
pub fn interrupt(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(io::Error::from)
}

/// Non-Unix targets have no SIGINT for child processes; the child is killed.
#[cfg(not(unix))]
pub fn interrupt(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
