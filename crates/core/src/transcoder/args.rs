use std::ffi::OsString;
use std::path::Path;

use crate::media::{MediaKind, MediaStreamDescriptor};

/// Fixed encoder settings for video sessions.
pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_TUNE: &str = "zerolatency";
pub const VIDEO_PRESET: &str = "ultrafast";
pub const VIDEO_BITRATE: &str = "600k";
pub const VIDEO_GOP: u32 = 24;
pub const VIDEO_FRAME_RATE: u32 = 24;

/// Audio is always re-encoded to AAC at the negotiated clock rate.
pub const AUDIO_CODEC: &str = "aac";

/// Input demuxers the transcoder may open. Keeps a crafted SDP from pulling
/// in other protocol handlers.
pub const PROTOCOL_WHITELIST: &str = "file,rtp,udp";

/// Ordered transcoder argument vector.
///
/// Each block is a typed constructor so the argv is never assembled by ad hoc
/// list concatenation:
///
/// ```text
/// common_prefix(sdp)  -vsync 1 -async 1 ... -fflags +genpts -i <sdp>
/// video_block()       -map 0:v:0 -c:v libx264 ... -g 24 -r 24
/// audio_block(rate)   -map 0:a:0 -c:a aac -ar <rate>
/// rtmp_output(url)    -f flv <url>
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscoderArgs {
    args: Vec<OsString>,
}

impl TranscoderArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full argv for one session: prefix, exactly one media block, output.
    pub fn for_session(
        kind: MediaKind,
        descriptor: &MediaStreamDescriptor,
        sdp_path: &Path,
        rtmp_target: &str,
    ) -> Self {
        let args = Self::new().common_prefix(sdp_path);
        let args = match kind {
            MediaKind::Video => args.video_block(),
            MediaKind::Audio => args.audio_block(descriptor.clock_rate),
        };
        args.rtmp_output(rtmp_target)
    }

    /// Low-latency input options for SDP-described RTP read from a file.
    pub fn common_prefix(self, sdp_path: &Path) -> Self {
        self.push_all([
            "-vsync",
            "1",
            "-async",
            "1",
            "-loglevel",
            "info",
            "-analyzeduration",
            "50000",
            "-probesize",
            "1k",
            "-protocol_whitelist",
            PROTOCOL_WHITELIST,
            "-fflags",
            "+genpts",
            "-i",
        ])
        .push(sdp_path.as_os_str())
    }

    pub fn video_block(self) -> Self {
        self.push_all([
            "-map",
            "0:v:0",
            "-c:v",
            VIDEO_CODEC,
            "-tune",
            VIDEO_TUNE,
            "-preset",
            VIDEO_PRESET,
            "-b:v",
            VIDEO_BITRATE,
        ])
        .push("-g")
        .push(VIDEO_GOP.to_string())
        .push("-r")
        .push(VIDEO_FRAME_RATE.to_string())
    }

    pub fn audio_block(self, clock_rate: u32) -> Self {
        self.push_all(["-map", "0:a:0", "-c:a", AUDIO_CODEC, "-ar"])
            .push(clock_rate.to_string())
    }

    /// FLV-muxed RTMP push.
    pub fn rtmp_output(self, url: &str) -> Self {
        self.push_all(["-f", "flv", url])
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.args
    }

    fn push(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn push_all<const N: usize>(mut self, args: [&str; N]) -> Self {
        self.args.extend(args.into_iter().map(OsString::from));
        self
    }
}
