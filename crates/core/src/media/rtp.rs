/// RTP parameters negotiated upstream for a single consumer.
///
/// Mirrors what a WebRTC SFU hands out per consumer: a codec list in
/// negotiation order and an encoding list carrying the SSRC. Only the first
/// entry of each list is ever used by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpParameters {
    pub codecs: Vec<RtpCodecParameters>,
    pub encodings: Vec<RtpEncodingParameters>,
}

impl RtpParameters {
    pub fn new(codec: RtpCodecParameters, encoding: RtpEncodingParameters) -> Self {
        Self {
            codecs: vec![codec],
            encodings: vec![encoding],
        }
    }
}

/// One negotiated codec (RFC 3551 payload mapping plus `fmtp` parameters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpCodecParameters {
    /// MIME type as negotiated, e.g. `video/H264` or `audio/opus`.
    pub mime_type: String,
    /// RTP payload type (dynamic types use 96–127).
    pub payload_type: u8,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Channel count, audio only.
    pub channels: Option<u16>,
    /// Codec-specific parameters in the order the negotiation produced them.
    pub parameters: Vec<(String, String)>,
}

impl RtpCodecParameters {
    pub fn new(mime_type: &str, payload_type: u8, clock_rate: u32) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            payload_type,
            clock_rate,
            channels: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Append a format parameter. Insertion order is preserved in the SDP.
    pub fn with_parameter(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.push((key.to_string(), value.to_string()));
        self
    }
}

/// One negotiated encoding (RTP stream) of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpEncodingParameters {
    /// Synchronization source identifier (RFC 3550 §8).
    pub ssrc: u32,
}

impl RtpEncodingParameters {
    pub fn new(ssrc: u32) -> Self {
        Self { ssrc }
    }
}
