//! Processing stages
//!
//! An [`Element`] is one node in a packet pipeline: it consumes a packet and
//! either emits it on an output port or kills it. The dispatching runtime is
//! an external collaborator; this module defines the stage contract plus the
//! two header-check stages.

pub mod counters;

mod check_tcp_header;
mod check_udp_header;

pub use check_tcp_header::CheckTcpHeader;
pub use check_udp_header::CheckUdpHeader;
pub use counters::{DropReason, StageCounters};

use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// Output port for accepted packets.
pub const PORT_FORWARD: usize = 0;

/// Output port for rejected packets, on stages configured with two outputs.
pub const PORT_DROP: usize = 1;

/// A packet leaving a stage on a given output port.
#[derive(Debug)]
pub struct Emit {
    pub packet: Packet,
    pub port: usize,
}

/// One processing node in the pipeline.
///
/// `simple_action` transfers ownership in and out: `None` means the stage
/// killed the packet.
pub trait Element {
    /// Number of output ports this instance was configured with.
    fn n_outputs(&self) -> usize;

    /// Process one packet.
    fn simple_action(&self, p: Packet) -> Option<Emit>;

    /// Named read endpoint for operator introspection.
    fn read_handler(&self, name: &str) -> Option<String>;
}

/// Configuration shared by the header-check stages.
///
/// Bound by the external element configuration parser; the serde derives are
/// the binding surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Log every drop instead of only the first.
    #[serde(alias = "VERBOSE")]
    pub verbose: bool,
    /// Keep per-reason drop counters.
    #[serde(alias = "DETAILS")]
    pub details: bool,
    /// Verify L4 checksums.
    #[serde(alias = "CHECKSUM")]
    pub checksum: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig { verbose: false, details: false, checksum: true }
    }
}
