//! Local relay side of the RTP hand-off to the transcoder.
//!
//! The upstream router forwards the consumer's RTP and RTCP to a pair of
//! ports on the listen address; the transcoder reads from those same ports
//! because the SDP it is given advertises them:
//!
//! ```text
//! router ──RTP──▶ listen_ip:remote_rtp_port  ◀── transcoder (m= line)
//!        ──RTCP─▶ listen_ip:remote_rtcp_port ◀── transcoder (a=rtcp)
//! ```
//!
//! Each stream needs its own pair, handed out by [`PortAllocator`].

pub mod ports;
pub mod relay;

pub use ports::{PortAllocator, PortPair};
pub use relay::RelayEndpoint;
