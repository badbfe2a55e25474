use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rtp2rtmp::media::{RtpCodecParameters, RtpEncodingParameters};
use rtp2rtmp::{
    BridgeConfig, MediaKind, RelayEndpoint, RtpParameters, SessionManager,
    derive_codec_descriptor, render_sdp,
};

#[derive(Parser)]
#[command(
    name = "rtp2rtmp",
    about = "Republish a relayed RTP stream over RTMP through FFmpeg"
)]
struct Args {
    /// Stream id (SDP file name and last RTMP path segment)
    #[arg(long)]
    stream_id: String,

    /// Media kind: audio or video
    #[arg(long)]
    kind: MediaKind,

    /// Negotiated MIME type, e.g. video/H264 or audio/opus
    #[arg(long)]
    mime_type: String,

    /// RTP payload type
    #[arg(long)]
    payload_type: u8,

    /// RTP clock rate in Hz
    #[arg(long)]
    clock_rate: u32,

    /// Channel count (audio)
    #[arg(long)]
    channels: Option<u16>,

    /// SSRC of the relayed RTP stream
    #[arg(long)]
    ssrc: u32,

    /// Codec format parameter as key=value, in negotiation order (repeatable)
    #[arg(long = "fmtp", value_parser = parse_key_value)]
    format_parameters: Vec<(String, String)>,

    /// Relay RTP port; allocated from the port range when omitted
    #[arg(long, requires = "rtcp_port")]
    rtp_port: Option<u16>,

    /// Relay RTCP port
    #[arg(long, requires = "rtp_port")]
    rtcp_port: Option<u16>,

    /// IP the relay listens on
    #[arg(long, env = "SERVER_LISTEN_IP", default_value = "127.0.0.1")]
    listen_ip: IpAddr,

    /// RTMP server host
    #[arg(long, default_value = "127.0.0.1")]
    rtmp_host: String,

    /// Directory for generated SDP files
    #[arg(long, default_value = "sdp")]
    sdp_dir: PathBuf,

    /// Transcoder executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Print the SDP and exit without starting the transcoder
    #[arg(long)]
    print_sdp: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

impl Args {
    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            listen_ip: self.listen_ip,
            rtmp_host: self.rtmp_host.clone(),
            sdp_dir: self.sdp_dir.clone(),
            transcoder_program: self.ffmpeg.clone(),
            ..Default::default()
        }
    }

    fn rtp_parameters(&self) -> RtpParameters {
        let mut codec = RtpCodecParameters::new(&self.mime_type, self.payload_type, self.clock_rate);
        codec.channels = self.channels;
        codec.parameters = self.format_parameters.clone();
        RtpParameters::new(codec, RtpEncodingParameters::new(self.ssrc))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> rtp2rtmp::Result<()> {
    let manager = SessionManager::new(args.config());
    let descriptor = derive_codec_descriptor(args.kind, &args.rtp_parameters())?;

    let relay = match (args.rtp_port, args.rtcp_port) {
        (Some(rtp), Some(rtcp)) => RelayEndpoint::new(args.listen_ip, rtp, rtcp),
        _ => manager.reserve_relay_endpoint()?,
    };

    if args.print_sdp {
        print!("{}", render_sdp(&relay, args.kind, &descriptor)?);
        return Ok(());
    }

    tracing::info!(
        listen_ip = %relay.listen_ip(),
        rtp_port = relay.remote_rtp_port(),
        rtcp_port = relay.remote_rtcp_port(),
        max_sctp_message_size = manager.config().max_sctp_message_size,
        "relay endpoint"
    );

    let session = manager
        .start_session(relay, &descriptor, args.kind, &args.stream_id)
        .await?;

    println!(
        "Publishing {} to {} (SDP: {}), press Ctrl-C to stop",
        session.stream_id(),
        session.rtmp_target(),
        session.sdp_path().display()
    );

    tokio::select! {
        exit = session.wait_exit() => {
            tracing::info!(exit = ?exit, "transcoder exited on its own");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            }
            let timeout = manager.config().supersede_timeout;
            manager.shutdown(timeout).await;
        }
    }

    manager.release_relay_endpoint(session.relay());
    Ok(())
}
