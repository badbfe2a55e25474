//! Negotiated media parameters and the codec descriptor derived from them.
//!
//! The upstream WebRTC router negotiates codecs and encodings for each
//! consumer. This module models that parameter set ([`rtp::RtpParameters`])
//! and reduces it to the single codec/encoding pair the transcoder is told
//! about ([`codec::MediaStreamDescriptor`]).
//!
//! ```text
//! RtpParameters { codecs: [video/H264 pt=96 ...], encodings: [ssrc=1111] }
//!        │
//!        ▼  derive_codec_descriptor(Video, ..)
//! MediaStreamDescriptor { codec_name: "h264", payload_type: 96, ... }
//! ```

pub mod codec;
pub mod rtp;

use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

pub use codec::{FormatParameters, MediaStreamDescriptor, derive_codec_descriptor};
pub use rtp::{RtpCodecParameters, RtpEncodingParameters, RtpParameters};

/// Kind of media carried by a stream.
///
/// Also the first path segment of the RTMP target and the prefix of the
/// negotiated MIME type (`video/H264`, `audio/opus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(BridgeError::UnsupportedMediaKind(other.to_string())),
        }
    }
}
