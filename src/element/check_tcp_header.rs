//! TCP header validation stage

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{self, TcpPacket};
use tracing::warn;

use super::counters::{DropReason, StageCounters};
use super::{CheckerConfig, Element, Emit, PORT_DROP, PORT_FORWARD};
use crate::error::{ConfigError, Result};
use crate::packet::Packet;

const REASON_TEXTS: [&str; DropReason::COUNT] =
    ["not TCP", "bad packet length", "bad TCP checksum"];

const TCP_HEADER_MIN: usize = 20;

/// Validates TCP framing and checksums on IPv4 packets.
///
/// Expects an upstream stage to have set the network header. Accepted packets
/// leave on port 0 unchanged; rejects go to port 1 when configured with two
/// outputs, otherwise they are killed.
pub struct CheckTcpHeader {
    config: CheckerConfig,
    n_outputs: usize,
    counters: StageCounters,
}

impl CheckTcpHeader {
    pub fn new(config: CheckerConfig, n_outputs: usize) -> Result<Self> {
        if n_outputs < 1 || n_outputs > 2 {
            return Err(ConfigError::InvalidValue {
                field: "n_outputs".to_string(),
                value: n_outputs.to_string(),
                reason: "header-check stages have 1 or 2 outputs".to_string(),
            }
            .into());
        }
        Ok(CheckTcpHeader {
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
            warn!(reason = self.counters.reason_text(reason), "dropping TCP packet");
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
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
            return Some(DropReason::NotProtocol);
        }
        let src = ip.get_source();
        let dst = ip.get_destination();
        let iph_len = ip.get_header_length() as usize * 4;

        // Segment length as declared by the IP header.
        let payload_len = match (ip.get_total_length() as usize).checked_sub(iph_len) {
            Some(len) => len,
            None => return Some(DropReason::BadLength),
        };

        // The declared segment must fit inside [data, tail).
        let th_off = match p.transport_header_offset() {
            Some(off) => off,
            None => return Some(DropReason::NotProtocol),
        };
        if payload_len as isize > p.length() as isize - th_off {
            return Some(DropReason::BadLength);
        }

        let th = match p.transport_header() {
            Some(th) => th,
            None => return Some(DropReason::NotProtocol),
        };
        let tcp = match TcpPacket::new(&th[..payload_len]) {
            Some(tcp) => tcp,
            None => return Some(DropReason::BadLength),
        };
        let tcp_hl = tcp.get_data_offset() as usize * 4;
        if tcp_hl < TCP_HEADER_MIN || payload_len < tcp_hl {
            return Some(DropReason::BadLength);
        }

        if self.config.checksum {
            let expected = tcp::ipv4_checksum(&tcp, &src, &dst);
            let stored = tcp.get_checksum();
            // 0xffff is the second encoding of a one's-complement zero sum.
            if stored != expected && !(expected == 0 && stored == 0xFFFF) {
                return Some(DropReason::BadChecksum);
            }
        }
        None
    }
}

impl Element for CheckTcpHeader {
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
