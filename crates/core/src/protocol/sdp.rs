//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Produces the file the transcoder opens as its input. The format:
//!
//! ```text
//! v=0                                  ← protocol version
//! o=- 0 0 IN IP4 <listen-ip>           ← origin
//! s=FFmpeg                             ← session name
//! c=IN IP4 <listen-ip>                 ← connection address
//! t=0 0                                ← timing (live stream)
//! m=video <rtp-port> RTP/AVPF <pt>     ← the single media description
//! a=ssrc:<ssrc>                        ← expected RTP source
//! a=rtcp:<rtcp-port>                   ← RTCP receive port
//! a=rtpmap:<pt> h264/90000             ← codec/clock rate[/channels for audio]
//! a=fmtp:<pt> profile-level-id=42e01f  ← only when the codec has parameters
//! ```
//!
//! Lines end with a bare `\n`; the transcoder's SDP demuxer accepts both.

use crate::error::{BridgeError, Result};
use crate::media::{MediaKind, MediaStreamDescriptor};
use crate::transport::RelayEndpoint;

/// Origin username (`o=<username> ...`); `-` means none.
pub const SDP_USERNAME: &str = "-";
/// Session name (`s=`).
pub const SDP_SESSION_NAME: &str = "FFmpeg";
/// Profile on the `m=` line. RTCP feedback is negotiated upstream.
pub const SDP_PROTO: &str = "RTP/AVPF";

/// Render the SDP document describing the relayed stream.
///
/// Pure: the same inputs always give the same bytes. Fails with
/// [`BridgeError::KindMismatch`] if `producer_kind` is not the kind the
/// descriptor was derived for.
pub fn render_sdp(
    relay: &RelayEndpoint,
    producer_kind: MediaKind,
    descriptor: &MediaStreamDescriptor,
) -> Result<String> {
    if producer_kind != descriptor.kind {
        return Err(BridgeError::KindMismatch {
            producer: producer_kind,
            descriptor: descriptor.kind,
        });
    }

    let ip = relay.listen_ip();
    let addr_type = relay.addr_type();
    let pt = descriptor.payload_type;

    let mut sdp: Vec<String> = Vec::with_capacity(10);

    sdp.push("v=0".to_string());
    sdp.push(format!("o={SDP_USERNAME} 0 0 IN {addr_type} {ip}"));
    sdp.push(format!("s={SDP_SESSION_NAME}"));
    sdp.push(format!("c=IN {addr_type} {ip}"));
    sdp.push("t=0 0".to_string());

    sdp.push(format!(
        "m={} {} {SDP_PROTO} {pt}",
        producer_kind,
        relay.remote_rtp_port()
    ));
    sdp.push(format!("a=ssrc:{}", descriptor.ssrc));
    sdp.push(format!("a=rtcp:{}", relay.remote_rtcp_port()));
    sdp.push(rtpmap(producer_kind, descriptor));
    if let Some(fmtp) = descriptor.format_parameters.to_fmtp() {
        sdp.push(format!("a=fmtp:{pt} {fmtp}"));
    }

    let mut text = sdp.join("\n");
    text.push('\n');

    tracing::debug!(kind = %producer_kind, "SDP:\n{}", text);

    Ok(text)
}

/// `a=rtpmap:<pt> <codec>/<clock>` for video, `.../<channels>` for audio.
fn rtpmap(kind: MediaKind, descriptor: &MediaStreamDescriptor) -> String {
    let base = format!(
        "a=rtpmap:{} {}/{}",
        descriptor.payload_type, descriptor.codec_name, descriptor.clock_rate
    );
    match (kind, descriptor.channel_count) {
        (MediaKind::Audio, Some(channels)) => format!("{base}/{channels}"),
        _ => base,
    }
}
