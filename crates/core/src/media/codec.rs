use super::MediaKind;
use super::rtp::RtpParameters;
use crate::error::{BridgeError, Result};

/// Channel count assumed for an audio codec that was negotiated without one.
pub const DEFAULT_AUDIO_CHANNELS: u16 = 1;

/// Ordered codec-specific `key=value` pairs for the SDP `a=fmtp` line.
///
/// Order is kept exactly as supplied; some SDP parsers are strict about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatParameters(Vec<(String, String)>);

impl FormatParameters {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `;`-joined form, e.g. `packetization-mode=1;profile-level-id=42e01f`.
    ///
    /// Returns `None` when there are no parameters, so no `a=fmtp` line is emitted.
    pub fn to_fmtp(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let joined = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        Some(joined)
    }
}

/// Everything the SDP and the transcoder arguments need to know about one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamDescriptor {
    pub kind: MediaKind,
    pub payload_type: u8,
    /// Lowercase codec name with the `<kind>/` MIME prefix removed (`h264`, `opus`).
    pub codec_name: String,
    pub clock_rate: u32,
    /// Present for audio only.
    pub channel_count: Option<u16>,
    pub format_parameters: FormatParameters,
    pub ssrc: u32,
}

/// Reduce a negotiated parameter set to a [`MediaStreamDescriptor`].
///
/// The first codec and the first encoding win; there is no ranking. Fails
/// with [`BridgeError::MissingNegotiatedParameters`] when either list is empty.
pub fn derive_codec_descriptor(
    kind: MediaKind,
    parameters: &RtpParameters,
) -> Result<MediaStreamDescriptor> {
    let codec = parameters
        .codecs
        .first()
        .ok_or(BridgeError::MissingNegotiatedParameters { missing: "codecs" })?;
    let encoding = parameters
        .encodings
        .first()
        .ok_or(BridgeError::MissingNegotiatedParameters {
            missing: "encodings",
        })?;

    let channel_count = match kind {
        MediaKind::Audio => Some(codec.channels.unwrap_or(DEFAULT_AUDIO_CHANNELS)),
        MediaKind::Video => None,
    };

    let descriptor = MediaStreamDescriptor {
        kind,
        payload_type: codec.payload_type,
        codec_name: codec_name(kind, &codec.mime_type),
        clock_rate: codec.clock_rate,
        channel_count,
        format_parameters: FormatParameters::new(codec.parameters.clone()),
        ssrc: encoding.ssrc,
    };

    tracing::debug!(
        %kind,
        codec = %descriptor.codec_name,
        pt = descriptor.payload_type,
        ssrc = descriptor.ssrc,
        "codec descriptor derived"
    );

    Ok(descriptor)
}

/// `video/H264` → `h264`. A MIME type without the kind prefix is only lowercased.
fn codec_name(kind: MediaKind, mime_type: &str) -> String {
    let prefix_len = kind.as_str().len() + 1;
    let stripped = match mime_type.get(..prefix_len) {
        Some(head)
            if head.ends_with('/')
                && head[..prefix_len - 1].eq_ignore_ascii_case(kind.as_str()) =>
        {
            &mime_type[prefix_len..]
        }
        _ => mime_type,
    };
    stripped.to_ascii_lowercase()
}
