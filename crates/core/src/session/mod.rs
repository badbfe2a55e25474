//! Transcode sessions: one external transcoder per relayed stream.
//!
//! A session owns the SDP artifact for its stream and the transcoder process
//! reading it. The [`SessionManager`] is the registry, keyed by stream id,
//! and allows at most one live session per id.
//!
//! ## Session lifecycle
//!
//! ```text
//! start_session  -> render SDP -> write <sdp-dir>/<id>.sdp -> spawn -> Running
//! stop_session   -> SIGINT, handle cleared at once          -> Stopped
//! process exit   -> classified and logged, handle cleared   -> Stopped
//! start (same id while Running) -> stop previous, await exit -> start again
//! ```
//!
//! Starts for one id are serialized, so concurrent starts supersede each
//! other in turn instead of racing to register.
//!
//! Stopping never escalates past SIGINT. Callers wanting a bounded shutdown
//! await the returned [`StopHandle`] under their own timeout.

pub mod supervisor;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedMutexGuard, mpsc, watch};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::media::{MediaKind, MediaStreamDescriptor};
use crate::protocol::sdp;
use crate::transcoder::{Ffmpeg, Transcoder, TranscoderArgs};
use crate::transport::{PortAllocator, RelayEndpoint};

pub use supervisor::{ProcessExit, StopHandle};

/// Live transcoder process owned by a session.
#[derive(Debug)]
struct ProcessHandle {
    pid: Option<u32>,
    stop_tx: mpsc::UnboundedSender<()>,
}

/// One stream's transcoder and SDP artifact.
///
/// The process handle is the only mutable state: present while the
/// transcoder runs, cleared on stop or exit.
#[derive(Debug)]
pub struct TranscodeSession {
    stream_id: String,
    kind: MediaKind,
    sdp_path: PathBuf,
    rtmp_target: String,
    relay: RelayEndpoint,
    handle: Mutex<Option<ProcessHandle>>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl TranscodeSession {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn sdp_path(&self) -> &Path {
        &self.sdp_path
    }

    pub fn rtmp_target(&self) -> &str {
        &self.rtmp_target
    }

    pub fn relay(&self) -> &RelayEndpoint {
        &self.relay
    }

    /// Transcoder pid while the handle is live.
    pub fn pid(&self) -> Option<u32> {
        self.handle.lock().as_ref().and_then(|h| h.pid)
    }

    /// Whether the session still holds a live process handle.
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Wait until the transcoder has exited, however it was stopped.
    pub async fn wait_exit(&self) -> Option<ProcessExit> {
        supervisor::wait_exit(self.exit.clone()).await
    }

    fn take_handle(&self) -> Option<ProcessHandle> {
        self.handle.lock().take()
    }
}

/// Registry of transcode sessions keyed by stream id.
///
/// Cloning shares the registry, the port allocator and the transcoder.
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<BridgeConfig>,
    transcoder: Arc<dyn Transcoder>,
    sessions: Arc<RwLock<HashMap<String, Arc<TranscodeSession>>>>,
    starts: StartLocks,
    /// Superseded transcoders that outlived `supersede_timeout`.
    retiring: Arc<Mutex<Vec<StopHandle>>>,
    ports: PortAllocator,
}

impl SessionManager {
    /// Manager launching [`Ffmpeg`] from `config.transcoder_program`.
    pub fn new(config: BridgeConfig) -> Self {
        let ffmpeg = Ffmpeg::with_program(config.transcoder_program.clone());
        Self::with_transcoder(config, Arc::new(ffmpeg))
    }

    /// Manager launching a custom [`Transcoder`].
    pub fn with_transcoder(config: BridgeConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        let ports = PortAllocator::new(config.rtp_port_min, config.rtp_port_max);
        Self {
            config: Arc::new(config),
            transcoder,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            starts: StartLocks::default(),
            retiring: Arc::new(Mutex::new(Vec::new())),
            ports,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Reserve a unique RTP/RTCP pair on the configured listen IP.
    ///
    /// The upstream transport connects to this endpoint. Release it with
    /// [`release_relay_endpoint`](Self::release_relay_endpoint) once that
    /// transport closes.
    pub fn reserve_relay_endpoint(&self) -> Result<RelayEndpoint> {
        let pair = self.ports.allocate()?;
        Ok(RelayEndpoint::from_pair(self.config.listen_ip, pair))
    }

    pub fn release_relay_endpoint(&self, relay: &RelayEndpoint) {
        self.ports.release(relay.ports());
    }

    /// Start the transcoder for `stream_id`.
    ///
    /// Writes the SDP artifact, then spawns the transcoder on it. A live
    /// session for the same id is stopped first and given
    /// [`BridgeConfig::supersede_timeout`] to exit; the artifact is then
    /// overwritten either way.
    pub async fn start_session(
        &self,
        relay: RelayEndpoint,
        descriptor: &MediaStreamDescriptor,
        producer_kind: MediaKind,
        stream_id: &str,
    ) -> Result<Arc<TranscodeSession>> {
        validate_stream_id(stream_id)?;
        let sdp_text = sdp::render_sdp(&relay, producer_kind, descriptor)?;

        let _start = self.starts.acquire(stream_id).await;
        if let Some(previous) = self.get(stream_id) {
            self.supersede(&previous).await;
        }

        let sdp_path = self.config.sdp_path(stream_id);
        write_artifact(&self.config.sdp_dir, &sdp_path, &sdp_text).await?;

        let rtmp_target = self.config.rtmp_target(producer_kind.as_str(), stream_id);
        let args = TranscoderArgs::for_session(producer_kind, descriptor, &sdp_path, &rtmp_target);
        tracing::debug!(stream_id, args = ?args.as_slice(), "transcoder arguments");

        let child = self.transcoder.spawn(args.as_slice()).map_err(|e| {
            tracing::error!(stream_id, error = %e, "failed to spawn transcoder");
            BridgeError::Spawn(e)
        })?;

        let pid = child.id();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        let session = Arc::new(TranscodeSession {
            stream_id: stream_id.to_string(),
            kind: producer_kind,
            sdp_path,
            rtmp_target,
            relay,
            handle: Mutex::new(Some(ProcessHandle { pid, stop_tx })),
            exit: exit_rx,
        });

        self.sessions
            .write()
            .insert(stream_id.to_string(), session.clone());

        let sessions = self.sessions.clone();
        supervisor::supervise(child, session.clone(), stop_rx, exit_tx, move |session| {
            session.take_handle();
            unregister(&sessions, session);
        });

        tracing::info!(
            stream_id,
            kind = %producer_kind,
            pid = ?pid,
            target = %session.rtmp_target,
            "transcoder started"
        );

        Ok(session)
    }

    /// Ask the session's transcoder to stop.
    ///
    /// Sends SIGINT and returns at once; the handle is cleared immediately.
    /// A session without a live handle is left alone. The returned
    /// [`StopHandle`] resolves when the process has actually exited.
    pub fn stop_session(&self, session: &Arc<TranscodeSession>) -> StopHandle {
        match session.take_handle() {
            Some(handle) => {
                tracing::info!(stream_id = %session.stream_id, pid = ?handle.pid, "stopping transcoder");
                // A closed channel means the supervisor already saw the exit.
                let _ = handle.stop_tx.send(());
            }
            None => {
                tracing::debug!(stream_id = %session.stream_id, "transcoder not running");
            }
        }
        unregister(&self.sessions, session);
        StopHandle::new(session.exit.clone())
    }

    /// Stop the live session for `stream_id`, if any.
    pub fn stop(&self, stream_id: &str) -> Option<StopHandle> {
        self.get(stream_id).map(|session| self.stop_session(&session))
    }

    /// Stop every live session.
    pub fn stop_all(&self) -> Vec<StopHandle> {
        self.active_sessions()
            .iter()
            .map(|session| self.stop_session(session))
            .collect()
    }

    /// Stop every live session and wait up to `timeout` for all of them to exit.
    ///
    /// Superseded transcoders that have not exited yet are waited for too.
    /// Returns the number of transcoders still running when the timeout hit.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let mut handles = self.stop_all();
        handles.extend(
            self.retiring
                .lock()
                .drain(..)
                .filter(|h| h.exit().is_none()),
        );
        let total = handles.len();

        if tokio::time::timeout(timeout, wait_for_exits(handles.clone()))
            .await
            .is_ok()
        {
            tracing::info!(total, "all transcoders stopped");
            return 0;
        }

        let pending = handles.iter().filter(|h| h.exit().is_none()).count();
        tracing::warn!(pending, total, "transcoders still running at shutdown");
        pending
    }

    /// Live session for `stream_id`.
    pub fn get(&self, stream_id: &str) -> Option<Arc<TranscodeSession>> {
        self.sessions.read().get(stream_id).cloned()
    }

    pub fn is_running(&self, stream_id: &str) -> bool {
        self.get(stream_id).is_some_and(|s| s.is_running())
    }

    pub fn active_sessions(&self) -> Vec<Arc<TranscodeSession>> {
        self.sessions.read().values().cloned().collect()
    }

    async fn supersede(&self, previous: &Arc<TranscodeSession>) {
        tracing::warn!(
            stream_id = %previous.stream_id,
            "stream already has a transcoder, superseding it"
        );
        let handle = self.stop_session(previous);
        let timeout = self.config.supersede_timeout;
        if tokio::time::timeout(timeout, handle.clone().wait())
            .await
            .is_err()
        {
            tracing::warn!(
                stream_id = %previous.stream_id,
                timeout = ?timeout,
                "previous transcoder did not exit in time, starting anyway"
            );
            let mut retiring = self.retiring.lock();
            retiring.retain(|h| h.exit().is_none());
            retiring.push(handle);
        }
    }
}

/// Per-stream-id locks held for the duration of a start.
#[derive(Clone, Default)]
struct StartLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl StartLocks {
    async fn acquire(&self, stream_id: &str) -> StartGuard {
        let lock = self
            .locks
            .lock()
            .entry(stream_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        StartGuard {
            locks: self.locks.clone(),
            stream_id: stream_id.to_string(),
            guard: Some(guard),
        }
    }
}

struct StartGuard {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    stream_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        // Lock handles are only cloned under the map lock, so a count of one
        // means nobody else is waiting on this id.
        let mut locks = self.locks.lock();
        self.guard.take();
        if locks
            .get(&self.stream_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.stream_id);
        }
    }
}

async fn wait_for_exits(handles: Vec<StopHandle>) {
    for handle in handles {
        handle.wait().await;
    }
}

/// Remove `session` from the registry unless a newer session took its id.
fn unregister(
    sessions: &RwLock<HashMap<String, Arc<TranscodeSession>>>,
    session: &Arc<TranscodeSession>,
) {
    let mut sessions = sessions.write();
    let current = sessions
        .get(&session.stream_id)
        .is_some_and(|s| Arc::ptr_eq(s, session));
    if current {
        sessions.remove(&session.stream_id);
        tracing::debug!(
            stream_id = %session.stream_id,
            total_sessions = sessions.len(),
            "session removed"
        );
    }
}

/// Create the artifact directory and write the SDP, replacing any previous file.
async fn write_artifact(dir: &Path, path: &Path, text: &str) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| BridgeError::ArtifactWrite {
            path: dir.to_path_buf(),
            source,
        })?;
    tokio::fs::write(path, text)
        .await
        .map_err(|source| BridgeError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), "SDP artifact written");
    Ok(())
}

/// Stream ids become a file name and an RTMP path segment.
fn validate_stream_id(stream_id: &str) -> Result<()> {
    let valid = !stream_id.is_empty()
        && stream_id != "."
        && stream_id != ".."
        && stream_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BridgeError::InvalidStreamId(stream_id.to_string()))
    }
}
