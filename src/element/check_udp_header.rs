//! UDP header validation stage

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::{self, UdpPacket};
use tracing::warn;

use super::counters::{DropReason, StageCounters};
use super::{CheckerConfig, Element, Emit, PORT_DROP, PORT_FORWARD};
use crate::error::{ConfigError, Result};
use crate::packet::Packet;

const REASON_TEXTS: [&str; DropReason::COUNT] =
    ["not UDP", "bad packet length", "bad UDP checksum"];

const UDP_HEADER_LEN: usize = 8;

/// Validates UDP framing and checksums on IPv4 packets.
///
/// Same port discipline as the TCP stage: accepts on port 0, rejects on
/// port 1 or killed. A stored checksum of zero means "not checksummed" and is
/// accepted without verification.
pub struct CheckUdpHeader {
    config: CheckerConfig,
    n_outputs: usize,
    counters: StageCounters,
}

impl CheckUdpHeader {
    pub fn new(config: CheckerConfig, n_outputs: usize) -> Result<Self> {
        if n_outputs < 1 || n_outputs > 2 {
            return Err(ConfigError::InvalidValue {
                field: "n_outputs".to_string(),
                value: n_outputs.to_string(),
                reason: "header-check stages have 1 or 2 outputs".to_string(),
            }
            .into());
        }
        Ok(CheckUdpHeader {
            counters: StageCounters::new(REASON_TEXTS, config.details),
            config,
            n_outputs,
        })
    }

    pub fn count(&self) -> u64 {
        self.counters.count()
    }

    pub fn drops(&self) -> u64 {
        self.counters.drops()
    }

    pub fn reason_drops(&self, reason: DropReason) -> Option<u64> {
        self.counters.reason_drops(reason)
    }

    pub fn drop_details(&self) -> Option<String> {
        self.counters.drop_details()
    }

    fn drop_packet(&self, reason: DropReason, p: Packet) -> Option<Emit> {
        let prior_drops = self.counters.record_drop(reason);
        if self.config.verbose || prior_drops == 0 {
            warn!(reason = self.counters.reason_text(reason), "dropping UDP packet");
        }
        if self.n_outputs == 2 {
            Some(Emit { packet: p, port: PORT_DROP })
        } else {
            p.kill();
            None
        }
    }

    fn classify(&self, p: &Packet) -> Option<DropReason> {
        let net = match p.network_header() {
            Some(net) => net,
            None => return Some(DropReason::NotProtocol),
        };
        let ip = match Ipv4Packet::new(net) {
            Some(ip) => ip,
            None => return Some(DropReason::NotProtocol),
        };
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
            return Some(DropReason::NotProtocol);
        }
        let src = ip.get_source();
        let dst = ip.get_destination();

        let th = match p.transport_header() {
            Some(th) => th,
            None => return Some(DropReason::NotProtocol),
        };
        let udp = match UdpPacket::new(th) {
            Some(udp) => udp,
            None => return Some(DropReason::BadLength),
        };

        // Datagram length as declared by the UDP header, header included.
        let payload_len = udp.get_length() as usize;
        if payload_len < UDP_HEADER_LEN {
            return Some(DropReason::BadLength);
        }

        // The declared datagram must fit inside [data, tail).
        let th_off = match p.transport_header_offset() {
            Some(off) => off,
            None => return Some(DropReason::NotProtocol),
        };
        if payload_len as isize > p.length() as isize - th_off {
            return Some(DropReason::BadLength);
        }

        let stored = udp.get_checksum();
        if stored != 0 && self.config.checksum {
            let datagram = match UdpPacket::new(&th[..payload_len]) {
                Some(datagram) => datagram,
                None => return Some(DropReason::BadLength),
            };
            let expected = udp::ipv4_checksum(&datagram, &src, &dst);
            // 0xffff is how a computed zero sum goes on the wire.
            if stored != expected && !(expected == 0 && stored == 0xFFFF) {
                return Some(DropReason::BadChecksum);
            }
        }
        None
    }
}

impl Element for CheckUdpHeader {
    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn simple_action(&self, p: Packet) -> Option<Emit> {
        match self.classify(&p) {
            None => {
                self.counters.record_accept();
                Some(Emit { packet: p, port: PORT_FORWARD })
            }
            Some(reason) => self.drop_packet(reason, p),
        }
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count().to_string()),
            "drops" => Some(self.drops().to_string()),
            "drop_details" => self.drop_details(),
            _ => None,
        }
    }
}
