//! Integration tests: full session lifecycle against real child processes.
//!
//! A scripted `/bin/sh` stands in for the transcoder so the tests do not need
//! FFmpeg. It records every argv it is launched with.
#![cfg(unix)]

use std::ffi::OsString;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};

use rtp2rtmp::media::{RtpCodecParameters, RtpEncodingParameters};
use rtp2rtmp::{
    BridgeConfig, BridgeError, Ffmpeg, MediaKind, MediaStreamDescriptor, RelayEndpoint,
    RtpParameters, SessionManager, Transcoder, derive_codec_descriptor,
};

const LONG_RUNNING: &str = "exec sleep 30";
const WAIT: Duration = Duration::from_secs(10);

struct ScriptTranscoder {
    script: String,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptTranscoder {
    fn new(script: &str) -> Arc<Self> {
        Arc::new(Self {
            script: script.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transcoder for ScriptTranscoder {
    fn spawn(&self, args: &[OsString]) -> io::Result<Child> {
        self.calls.lock().unwrap().push(
            args.iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        );
        Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

fn config(dir: &tempfile::TempDir) -> BridgeConfig {
    BridgeConfig {
        sdp_dir: dir.path().join("sdp"),
        rtmp_host: "rtmp.test".to_string(),
        supersede_timeout: WAIT,
        ..Default::default()
    }
}

fn relay(rtp: u16, rtcp: u16) -> RelayEndpoint {
    RelayEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), rtp, rtcp)
}

fn h264() -> MediaStreamDescriptor {
    let params = RtpParameters::new(
        RtpCodecParameters::new("video/H264", 96, 90000)
            .with_parameter("profile-level-id", "42e01f"),
        RtpEncodingParameters::new(1111),
    );
    derive_codec_descriptor(MediaKind::Video, &params).unwrap()
}

fn opus() -> MediaStreamDescriptor {
    let params = RtpParameters::new(
        RtpCodecParameters::new("audio/opus", 101, 48000).with_channels(2),
        RtpEncodingParameters::new(2222),
    );
    derive_codec_descriptor(MediaKind::Audio, &params).unwrap()
}

#[tokio::test]
async fn video_session_writes_sdp_and_spawns_transcoder() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let manager = SessionManager::with_transcoder(config(&dir), transcoder.clone());

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "video")
        .await
        .expect("session start");

    let sdp_path = dir.path().join("sdp").join("video.sdp");
    assert_eq!(session.sdp_path(), sdp_path);
    assert_eq!(session.rtmp_target(), "rtmp://rtmp.test/video/video");
    assert_eq!(
        std::fs::read_to_string(&sdp_path).unwrap(),
        "v=0\n\
         o=- 0 0 IN IP4 127.0.0.1\n\
         s=FFmpeg\n\
         c=IN IP4 127.0.0.1\n\
         t=0 0\n\
         m=video 5004 RTP/AVPF 96\n\
         a=ssrc:1111\n\
         a=rtcp:5005\n\
         a=rtpmap:96 h264/90000\n\
         a=fmtp:96 profile-level-id=42e01f\n"
    );

    let calls = transcoder.calls();
    assert_eq!(calls.len(), 1);
    let argv = &calls[0];
    let input = argv.iter().position(|a| a == "-i").unwrap();
    assert_eq!(argv[input + 1], sdp_path.to_string_lossy());
    assert!(argv.iter().any(|a| a == "libx264"));
    assert_eq!(argv[argv.len() - 3..], ["-f", "flv", "rtmp://rtmp.test/video/video"]);

    assert!(session.is_running());
    assert!(session.pid().is_some());
    assert!(manager.is_running("video"));

    let exit = tokio::time::timeout(WAIT, manager.stop_session(&session).wait())
        .await
        .expect("transcoder exits after SIGINT")
        .expect("exit status");
    assert_eq!(exit.signal, Some(nix::libc::SIGINT));
    assert!(exit.is_clean());
}

#[tokio::test]
async fn audio_session_encodes_aac_at_clock_rate() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let manager = SessionManager::with_transcoder(config(&dir), transcoder.clone());

    let session = manager
        .start_session(relay(5006, 5007), &opus(), MediaKind::Audio, "audio")
        .await
        .unwrap();

    let sdp = std::fs::read_to_string(session.sdp_path()).unwrap();
    assert!(sdp.contains("m=audio 5006 RTP/AVPF 101\n"));
    assert!(sdp.contains("a=rtpmap:101 opus/48000/2\n"));
    assert!(!sdp.contains("a=fmtp"));

    let calls = transcoder.calls();
    let argv = &calls[0];
    let rate = argv.iter().position(|a| a == "-ar").unwrap();
    assert_eq!(argv[rate + 1], "48000");
    assert!(argv.iter().any(|a| a == "aac"));
    assert!(!argv.iter().any(|a| a == "libx264"));
    assert_eq!(argv.last().unwrap(), "rtmp://rtmp.test/audio/audio");

    tokio::time::timeout(WAIT, manager.stop_session(&session).wait())
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_right_after_start_leaves_no_live_handle() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new(LONG_RUNNING));

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let handle = manager.stop_session(&session);

    // Fire-and-forget: the handle is gone before the process has exited.
    assert!(!session.is_running());
    assert!(session.pid().is_none());
    assert!(!manager.is_running("cam"));
    assert!(manager.get("cam").is_none());

    let exit = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert!(exit.unwrap().is_clean());
}

#[tokio::test]
async fn stopping_a_stopped_session_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new(LONG_RUNNING));

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let first = manager.stop_session(&session);
    let second = manager.stop_session(&session);

    let first = tokio::time::timeout(WAIT, first.wait()).await.unwrap();
    let second = tokio::time::timeout(WAIT, second.wait()).await.unwrap();
    assert_eq!(first, second);

    // Once more after the exit, and by id for a stream that has no session.
    let third = manager.stop_session(&session);
    assert_eq!(third.exit(), first);
    assert!(manager.stop("cam").is_none());
}

#[tokio::test]
async fn restarting_a_stream_supersedes_and_overwrites_sdp() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let manager = SessionManager::with_transcoder(config(&dir), transcoder.clone());

    let first = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let second = manager
        .start_session(relay(6004, 6005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();

    // The first transcoder was interrupted and has exited.
    assert!(!first.is_running());
    let exit = tokio::time::timeout(WAIT, first.wait_exit()).await.unwrap();
    assert_eq!(exit.unwrap().signal, Some(nix::libc::SIGINT));

    // Both sessions share one artifact path; the second start overwrote it.
    assert_eq!(first.sdp_path(), second.sdp_path());
    let sdp = std::fs::read_to_string(second.sdp_path()).unwrap();
    assert!(sdp.contains("m=video 6004 RTP/AVPF 96\n"));
    assert!(sdp.contains("a=rtcp:6005\n"));
    assert!(!sdp.contains("5004"));

    assert_eq!(transcoder.calls().len(), 2);
    assert_eq!(manager.active_sessions().len(), 1);
    assert!(Arc::ptr_eq(&manager.get("cam").unwrap(), &second));
    assert!(second.is_running());

    tokio::time::timeout(WAIT, manager.stop_session(&second).wait())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_leave_one_live_transcoder() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let manager = SessionManager::with_transcoder(config(&dir), transcoder.clone());

    let start = |rtp: u16| {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .start_session(relay(rtp, rtp + 1), &h264(), MediaKind::Video, "cam")
                .await
        })
    };
    let (a, b) = tokio::join!(start(5004), start(6004));
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    assert_eq!(transcoder.calls().len(), 2);
    assert_eq!(manager.active_sessions().len(), 1);
    let (live, superseded) = if a.is_running() { (a, b) } else { (b, a) };
    assert!(live.is_running());
    assert!(!superseded.is_running());
    assert!(Arc::ptr_eq(&manager.get("cam").unwrap(), &live));

    let exit = tokio::time::timeout(WAIT, superseded.wait_exit())
        .await
        .expect("superseded transcoder was interrupted");
    assert_eq!(exit.unwrap().signal, Some(nix::libc::SIGINT));

    assert_eq!(manager.shutdown(WAIT).await, 0);
    assert_eq!(
        live.wait_exit().await.unwrap().signal,
        Some(nix::libc::SIGINT)
    );
}

async fn wait_for_file(path: &std::path::Path) {
    tokio::time::timeout(WAIT, async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("transcoder script ready");
}

fn kill(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[tokio::test]
async fn shutdown_waits_for_superseded_transcoder_that_ignores_sigint() {
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    let script = format!("trap '' INT; touch '{}'; exec sleep 30", ready.display());
    let config = BridgeConfig {
        supersede_timeout: Duration::from_millis(200),
        ..config(&dir)
    };
    let manager = SessionManager::with_transcoder(config, ScriptTranscoder::new(&script));

    let first = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    wait_for_file(&ready).await;
    let first_pid = first.pid().unwrap();
    std::fs::remove_file(&ready).unwrap();

    // The first transcoder ignores SIGINT; the start goes ahead after the timeout.
    let second = manager
        .start_session(relay(6004, 6005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    wait_for_file(&ready).await;
    let second_pid = second.pid().unwrap();
    assert!(!first.is_running());

    // Both the live and the superseded transcoder are still running.
    assert_eq!(manager.shutdown(Duration::from_millis(200)).await, 2);

    kill(first_pid);
    kill(second_pid);
    let exit = tokio::time::timeout(WAIT, first.wait_exit()).await.unwrap();
    assert_eq!(exit.unwrap().signal, Some(nix::libc::SIGKILL));
    tokio::time::timeout(WAIT, second.wait_exit()).await.unwrap();
}

#[tokio::test]
async fn process_exit_clears_the_handle() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new("exit 3"));

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let exit = tokio::time::timeout(WAIT, session.wait_exit())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit.code, Some(3));
    assert!(exit.is_clean());
    assert!(!session.is_running());
    assert!(manager.get("cam").is_none());

    // Re-startable after exit.
    let again = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    tokio::time::timeout(WAIT, again.wait_exit()).await.unwrap();
}

#[tokio::test]
async fn unexpected_signal_is_not_clean() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new("kill -TERM $$"));

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let exit = tokio::time::timeout(WAIT, session.wait_exit())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit.signal, Some(nix::libc::SIGTERM));
    assert!(!exit.is_clean());
    assert!(!session.is_running());
    assert!(!manager.is_running("cam"));
}

#[tokio::test]
async fn chatty_stderr_is_drained() {
    let dir = tempfile::tempdir().unwrap();
    // Far more than a pipe buffer; the process would block if nobody read it.
    let script = "i=0; while [ $i -lt 4000 ]; do \
                  echo \"frame=$i fps=24 q=-1.0 size=N/A time=00:00:01.00 bitrate=N/A\" >&2; \
                  i=$((i+1)); done; exit 0";
    let manager = SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new(script));

    let session = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap();
    let exit = tokio::time::timeout(WAIT, session.wait_exit())
        .await
        .expect("stderr must not stall the transcoder")
        .unwrap();
    assert_eq!(exit.code, Some(0));
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::with_transcoder(
        config(&dir),
        Arc::new(Ffmpeg::with_program(dir.path().join("no-such-ffmpeg"))),
    );

    let err = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Spawn(_)));
    // The artifact is written before the spawn is attempted.
    assert!(dir.path().join("sdp").join("cam.sdp").exists());
    assert!(manager.get("cam").is_none());
}

#[tokio::test]
async fn artifact_write_failure_prevents_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let config = BridgeConfig {
        sdp_dir: blocker.join("sdp"),
        ..Default::default()
    };
    let manager = SessionManager::with_transcoder(config, transcoder.clone());

    let err = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "cam")
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::ArtifactWrite { .. }));
    assert!(transcoder.calls().is_empty());
}

#[tokio::test]
async fn rejected_inputs_have_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = ScriptTranscoder::new(LONG_RUNNING);
    let manager = SessionManager::with_transcoder(config(&dir), transcoder.clone());

    let err = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Video, "../escape")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidStreamId(_)));

    let err = manager
        .start_session(relay(5004, 5005), &h264(), MediaKind::Audio, "cam")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::KindMismatch { .. }));

    assert!(!dir.path().join("sdp").exists());
    assert!(transcoder.calls().is_empty());
}

#[tokio::test]
async fn shutdown_stops_every_session() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        SessionManager::with_transcoder(config(&dir), ScriptTranscoder::new(LONG_RUNNING));

    for id in ["video", "audio"] {
        let relay = manager.reserve_relay_endpoint().unwrap();
        let (kind, descriptor) = if id == "video" {
            (MediaKind::Video, h264())
        } else {
            (MediaKind::Audio, opus())
        };
        manager
            .start_session(relay, &descriptor, kind, id)
            .await
            .unwrap();
    }
    assert_eq!(manager.active_sessions().len(), 2);

    let video = manager.get("video").unwrap();
    let audio = manager.get("audio").unwrap();
    assert_ne!(video.relay().ports(), audio.relay().ports());

    assert_eq!(manager.shutdown(WAIT).await, 0);
    assert!(manager.active_sessions().is_empty());
    assert!(video.wait_exit().await.unwrap().is_clean());
}
