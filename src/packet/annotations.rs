//! Per-packet annotations
//!
//! Every packet handle carries a fixed-size annotation block alongside the
//! payload: a destination-address slot, twelve bytes of user scratch space,
//! a receive timestamp, the originating device, and a link-level packet
//! class. Annotations belong to the handle, not the shared buffer; cloning a
//! packet copies them, so a downstream stage can scribble on its copy without
//! disturbing siblings.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Bytes of user scratch space in each annotation block.
pub const USER_ANNO_SIZE: usize = 12;

/// 32-bit lanes overlaying the user scratch space.
pub const USER_ANNO_U32_SIZE: usize = USER_ANNO_SIZE / 4;

/// Link-level class of a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketKind {
    #[default]
    Host = 0,
    Broadcast = 1,
    Multicast = 2,
    OtherHost = 3,
    Outgoing = 4,
    Loopback = 5,
    FastRoute = 6,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Host => "HOST",
            PacketKind::Broadcast => "BROADCAST",
            PacketKind::Multicast => "MULTICAST",
            PacketKind::OtherHost => "OTHERHOST",
            PacketKind::Outgoing => "OUTGOING",
            PacketKind::Loopback => "LOOPBACK",
            PacketKind::FastRoute => "FASTROUTE",
        };
        write!(f, "{}", name)
    }
}

/// Opaque network-interface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(index: u32) -> Self {
        DeviceId(index)
    }

    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// Packet receive time, seconds plus microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub usec: u32,
}

impl Timestamp {
    pub const fn new(sec: u64, usec: u32) -> Self {
        Timestamp { sec, usec }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Timestamp {
            sec: now.timestamp().max(0) as u64,
            usec: now.timestamp_subsec_micros().min(999_999),
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.sec == 0 && self.usec == 0
    }
}

/// Destination-address annotation.
///
/// The wire representation is a 16-byte union whose first four bytes alias
/// the IPv4 address; here it is a tagged sum and the accessors convert at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddressAnno {
    #[default]
    None,
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
}

/// The fixed-size annotation block carried by every packet handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Annotations {
    dst_addr: AddressAnno,
    user: [u8; USER_ANNO_SIZE],
    timestamp: Timestamp,
    device: Option<DeviceId>,
    kind: PacketKind,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every annotation to its cleared state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn dst_addr_anno(&self) -> AddressAnno {
        self.dst_addr
    }

    pub fn set_dst_addr_anno(&mut self, addr: AddressAnno) {
        self.dst_addr = addr;
    }

    /// IPv4 destination annotation, if one is set.
    pub fn dst_ip_anno(&self) -> Option<Ipv4Addr> {
        match self.dst_addr {
            AddressAnno::Ip4(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn set_dst_ip_anno(&mut self, ip: Ipv4Addr) {
        self.dst_addr = AddressAnno::Ip4(ip);
    }

    /// IPv6 destination annotation, if one is set.
    pub fn dst_ip6_anno(&self) -> Option<Ipv6Addr> {
        match self.dst_addr {
            AddressAnno::Ip6(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn set_dst_ip6_anno(&mut self, ip: Ipv6Addr) {
        self.dst_addr = AddressAnno::Ip6(ip);
    }

    /// One byte lane of user scratch space (`lane < 12`).
    pub fn user_anno_u8(&self, lane: usize) -> u8 {
        self.user[lane]
    }

    pub fn set_user_anno_u8(&mut self, lane: usize, value: u8) {
        self.user[lane] = value;
    }

    /// One 32-bit lane of user scratch space (`lane < 3`), native-endian over
    /// the same bytes as the u8 view. No cross-view portability is promised.
    pub fn user_anno_u32(&self, lane: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.user[lane * 4..lane * 4 + 4]);
        u32::from_ne_bytes(word)
    }

    pub fn set_user_anno_u32(&mut self, lane: usize, value: u32) {
        self.user[lane * 4..lane * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }

    /// Signed view of the same 32-bit lane.
    pub fn user_anno_i32(&self, lane: usize) -> i32 {
        self.user_anno_u32(lane) as i32
    }

    pub fn set_user_anno_i32(&mut self, lane: usize, value: i32) {
        self.set_user_anno_u32(lane, value as u32);
    }

    pub fn timestamp_anno(&self) -> Timestamp {
        self.timestamp
    }

    pub fn set_timestamp_anno(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn device_anno(&self) -> Option<DeviceId> {
        self.device
    }

    pub fn set_device_anno(&mut self, device: Option<DeviceId>) {
        self.device = device;
    }

    pub fn packet_kind_anno(&self) -> PacketKind {
        self.kind
    }

    pub fn set_packet_kind_anno(&mut self, kind: PacketKind) {
        self.kind = kind;
    }
}
