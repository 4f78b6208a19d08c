pub mod channel;
pub mod conclusion;
pub mod connection;
pub mod demo;
pub mod discovery;
pub mod motion;
pub mod overlays;
pub mod snapshot;

use crate::core::network::ChannelId;
use conclusion::ConclusionStep;

/// Payload of every timer the watch screen schedules. Each carries the
/// epoch of the component that scheduled it so stale wakes are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    DiscoveryPoll { epoch: u64 },
    DemoPoll { epoch: u64 },
    Reconnect { channel: ChannelId },
    Conclusion { epoch: u64, step: ConclusionStep },
}
