//! Error types for the RTP to RTMP bridge.

use std::path::PathBuf;

use crate::media::MediaKind;

/// Errors that can occur while describing a stream or driving its transcoder.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Descriptor**: [`MissingNegotiatedParameters`](Self::MissingNegotiatedParameters),
///   [`UnsupportedMediaKind`](Self::UnsupportedMediaKind),
///   [`KindMismatch`](Self::KindMismatch).
/// - **Session start**: [`InvalidStreamId`](Self::InvalidStreamId),
///   [`ArtifactWrite`](Self::ArtifactWrite), [`Spawn`](Self::Spawn).
/// - **Relay**: [`PortRangeExhausted`](Self::PortRangeExhausted).
/// - **Running lifetime**: [`UnexpectedTermination`](Self::UnexpectedTermination),
///   only ever logged, never returned from a start call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Underlying I/O error not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The negotiated RTP parameters have no codec or no encoding entry.
    #[error("negotiated RTP parameters contain no {missing}")]
    MissingNegotiatedParameters { missing: &'static str },

    /// Media kind other than `audio` or `video`.
    #[error("unsupported media kind: {0}")]
    UnsupportedMediaKind(String),

    /// The producer kind does not match the kind the descriptor was derived for.
    #[error("producer kind {producer} does not match descriptor kind {descriptor}")]
    KindMismatch {
        producer: MediaKind,
        descriptor: MediaKind,
    },

    /// Stream id cannot be used as an SDP file name or RTMP path segment.
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),

    /// Writing the SDP artifact failed (permissions, disk full, ...).
    #[error("failed to write SDP artifact {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder executable could not be launched.
    #[error("failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// The transcoder was killed by a signal other than SIGINT or SIGKILL.
    #[error("transcoder for stream {stream_id} terminated by signal {signal}")]
    UnexpectedTermination { stream_id: String, signal: i32 },

    /// Every RTP/RTCP port pair in the configured range is in use.
    #[error("RTP port range exhausted")]
    PortRangeExhausted,
}

/// Convenience alias for `Result<T, BridgeError>`.
pub type Result<T> = std::result::Result<T, BridgeError>;
