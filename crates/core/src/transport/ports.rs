use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};

pub const DEFAULT_RTP_PORT_MIN: u16 = 5000;
pub const DEFAULT_RTP_PORT_MAX: u16 = 65534;

/// An RTP port and its RTCP companion (`rtcp = rtp + 1`, RFC 3550 §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortPair {
    pub rtp: u16,
    pub rtcp: u16,
}

#[derive(Debug)]
struct PortState {
    next: u32,
    in_use: HashSet<u16>,
}

/// Hands out a distinct RTP/RTCP port pair to every live stream.
///
/// Ports come from a monotonic cursor over `[min, max]` that wraps back to
/// `min` at the end of the range. Pairs still in use are skipped, so two
/// live streams never share a pair. Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    min: u32,
    /// Highest RTP port, leaving room for its RTCP port inside the range.
    max: u32,
    state: Arc<Mutex<PortState>>,
}

impl PortAllocator {
    /// RTP ports are even, so `min` is rounded up to the next even number.
    /// Both ports of every pair stay within `[min, max]`.
    pub fn new(min: u16, max: u16) -> Self {
        let min = (u32::from(min) + 1) & !1;
        let max = u32::from(max).saturating_sub(1);
        Self {
            min,
            max,
            state: Arc::new(Mutex::new(PortState {
                next: min,
                in_use: HashSet::new(),
            })),
        }
    }

    /// Reserve the next free pair.
    pub fn allocate(&self) -> Result<PortPair> {
        if self.max < self.min {
            return Err(BridgeError::PortRangeExhausted);
        }

        let slots = (self.max - self.min) / 2 + 1;
        let mut state = self.state.lock();

        for _ in 0..slots {
            let rtp = state.next;
            state.next = if rtp + 2 > self.max { self.min } else { rtp + 2 };

            let rtp = rtp as u16;
            if state.in_use.insert(rtp) {
                tracing::trace!(rtp_port = rtp, rtcp_port = rtp + 1, "allocated relay ports");
                return Ok(PortPair { rtp, rtcp: rtp + 1 });
            }
        }

        tracing::warn!(
            min = self.min,
            max = self.max,
            in_use = state.in_use.len(),
            "relay port range exhausted"
        );
        Err(BridgeError::PortRangeExhausted)
    }

    /// Return a pair to the pool. Releasing a pair that is not held is a no-op.
    pub fn release(&self, pair: PortPair) {
        if self.state.lock().in_use.remove(&pair.rtp) {
            tracing::trace!(rtp_port = pair.rtp, "released relay ports");
        }
    }

    /// Number of pairs currently reserved.
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use.len()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_RTP_PORT_MIN, DEFAULT_RTP_PORT_MAX)
    }
}
