use std::net::IpAddr;

use super::ports::PortPair;

/// The RTP/RTCP receive side bound for the transcoder.
///
/// Built once the upstream transport is connected and never mutated after
/// that; the ports stay fixed for the stream's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEndpoint {
    listen_ip: IpAddr,
    remote_rtp_port: u16,
    remote_rtcp_port: u16,
}

impl RelayEndpoint {
    pub fn new(listen_ip: IpAddr, remote_rtp_port: u16, remote_rtcp_port: u16) -> Self {
        Self {
            listen_ip,
            remote_rtp_port,
            remote_rtcp_port,
        }
    }

    pub fn from_pair(listen_ip: IpAddr, pair: PortPair) -> Self {
        Self::new(listen_ip, pair.rtp, pair.rtcp)
    }

    pub fn listen_ip(&self) -> IpAddr {
        self.listen_ip
    }

    pub fn remote_rtp_port(&self) -> u16 {
        self.remote_rtp_port
    }

    pub fn remote_rtcp_port(&self) -> u16 {
        self.remote_rtcp_port
    }

    pub fn ports(&self) -> PortPair {
        PortPair {
            rtp: self.remote_rtp_port,
            rtcp: self.remote_rtcp_port,
        }
    }

    /// SDP address type token for `o=` and `c=` lines (RFC 8866 §5.7).
    pub fn addr_type(&self) -> &'static str {
        match self.listen_ip {
            IpAddr::V4(_) => "IP4",
            IpAddr::V6(_) => "IP6",
        }
    }
}
