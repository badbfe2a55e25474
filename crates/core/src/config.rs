use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::ports::{DEFAULT_RTP_PORT_MAX, DEFAULT_RTP_PORT_MIN};

/// Static bridge configuration.
///
/// Loading it (flags, environment, files) is up to the embedding program;
/// the CLI crate maps its flags onto this struct.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// IP the relay binds for receiving RTP/RTCP. Advertised in SDP `o=` and `c=`.
    pub listen_ip: IpAddr,
    /// Maximum SCTP message size for the upstream transport. Passed through,
    /// not interpreted by this crate.
    pub max_sctp_message_size: usize,
    /// Host of the RTMP server the transcoder publishes to.
    pub rtmp_host: String,
    /// Directory holding one `<stream-id>.sdp` file per stream.
    pub sdp_dir: PathBuf,
    /// Transcoder executable.
    pub transcoder_program: PathBuf,
    /// First RTP port handed out by the relay port allocator.
    pub rtp_port_min: u16,
    /// Last RTP port handed out by the relay port allocator.
    pub rtp_port_max: u16,
    /// How long a superseding start waits for the previous transcoder to exit.
    pub supersede_timeout: Duration,
}

impl BridgeConfig {
    /// `rtmp://<host>/<kind>/<stream-id>`
    pub fn rtmp_target(&self, kind: &str, stream_id: &str) -> String {
        format!("rtmp://{}/{}/{}", self.rtmp_host, kind, stream_id)
    }

    /// `<sdp-dir>/<stream-id>.sdp`
    pub fn sdp_path(&self, stream_id: &str) -> PathBuf {
        self.sdp_dir.join(format!("{stream_id}.sdp"))
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_sctp_message_size: 262_144,
            rtmp_host: "127.0.0.1".to_string(),
            sdp_dir: PathBuf::from("sdp"),
            transcoder_program: PathBuf::from("ffmpeg"),
            rtp_port_min: DEFAULT_RTP_PORT_MIN,
            rtp_port_max: DEFAULT_RTP_PORT_MAX,
            supersede_timeout: Duration::from_secs(5),
        }
    }
}
