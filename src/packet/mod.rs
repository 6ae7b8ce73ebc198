//! Packet handles over shared buffers
//!
//! A [`Packet`] is an owning handle to a refcounted [`Buffer`]: the payload
//! window `[data, tail)`, cached network/transport header offsets, and a
//! per-handle [`Annotations`] block. Cloning a packet is cheap: the buffer is
//! shared, only the handle state is copied. Mutating payload bytes requires a
//! [`WritablePacket`], obtained through [`Packet::uniqueify`] or one of the
//! growth operations, which guarantees the handle is the buffer's sole owner.
//!
//! Geometry follows the usual headroom/tailroom discipline:
//!
//! ```text
//! head                data              tail               end
//! |----- headroom ----|---- length ----|---- tailroom ----|
//! ```
//!
//! `pull`/`take` shrink the window in place and never touch the buffer;
//! `push`/`put` grow it, reallocating (with spare room for the next few
//! growths) when the fast-path room check fails or the buffer is shared.
//!
//! Header offsets are absolute positions within the buffer, so window moves
//! and copy-on-write leave them pointing at the same bytes. They are trusted:
//! the accessors do not check that a cached header still lies inside
//! `[data, tail)` after the window shrank past it.

pub mod annotations;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::warn;

use crate::buffer::{Buffer, DEFAULT_HEADROOM};
use crate::error::{PacketError, Result};

pub use annotations::{
    AddressAnno, Annotations, DeviceId, PacketKind, Timestamp, USER_ANNO_SIZE, USER_ANNO_U32_SIZE,
};

/// Extra bytes granted to the growing side when `push`/`put` must reallocate,
/// so the next few small growths hit the fast path again.
const GROWTH_SLACK: usize = 128;

fn slack(nbytes: usize) -> usize {
    (nbytes + GROWTH_SLACK) & !3
}

/// An owning handle to one packet.
///
/// Dropping the handle releases its buffer reference; [`Packet::kill`] is the
/// explicit spelling of the same thing. Every path that receives a packet
/// must either forward it or kill it.
#[derive(Clone)]
pub struct Packet {
    buf: Arc<Buffer>,
    data: usize,
    tail: usize,
    network_header: Option<usize>,
    transport_header: Option<usize>,
    anno: Annotations,
}

impl Packet {
    /// Build a packet with `len` zeroed payload bytes, default headroom and
    /// no tailroom.
    pub fn make(len: usize) -> Result<WritablePacket> {
        Packet::make_with(DEFAULT_HEADROOM, None, len, 0)
    }

    /// Build a packet whose payload is a copy of `src`, with default headroom.
    pub fn make_from(src: &[u8]) -> Result<WritablePacket> {
        Packet::make_with(DEFAULT_HEADROOM, Some(src), src.len(), 0)
    }

    /// Build a packet with explicit geometry.
    ///
    /// The buffer capacity is at least `headroom + len + tailroom` (and never
    /// below the minimum buffer length). When `src` is given, its first `len`
    /// bytes become the payload; otherwise the payload is zeroed.
    pub fn make_with(
        headroom: usize,
        src: Option<&[u8]>,
        len: usize,
        tailroom: usize,
    ) -> Result<WritablePacket> {
        if let Some(src) = src {
            if src.len() < len {
                return Err(PacketError::BufferTooSmall {
                    required: len,
                    available: src.len(),
                }
                .into());
            }
        }
        let mut buffer = Buffer::allocate(headroom + len + tailroom)?;
        if let Some(src) = src {
            buffer.as_mut_slice()[headroom..headroom + len].copy_from_slice(&src[..len]);
        }
        Ok(WritablePacket {
            inner: Packet {
                buf: Arc::new(buffer),
                data: headroom,
                tail: headroom + len,
                network_header: None,
                transport_header: None,
                anno: Annotations::new(),
            },
        })
    }

    // --- payload geometry ---

    /// The payload window `[data, tail)`.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf.as_slice()[self.data..self.tail]
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.tail - self.data
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.data
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.capacity() - self.tail
    }

    #[inline]
    pub fn buffer_length(&self) -> usize {
        self.buf.capacity()
    }

    /// The whole buffer `[head, end)`, including headroom and tailroom.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        self.buf.as_slice()
    }

    // --- sharing ---

    /// True whenever another handle holds the same buffer.
    #[inline]
    pub fn shared(&self) -> bool {
        Arc::strong_count(&self.buf) > 1
    }

    /// Release this handle. Consuming the handle makes a second kill
    /// unrepresentable; the buffer is freed when its last handle goes.
    pub fn kill(self) {}

    /// Obtain exclusive ownership of the buffer.
    ///
    /// A non-shared packet is reinterpreted as writable for free. A shared
    /// one gets a fresh buffer holding a byte-exact copy of the whole
    /// `[head, end)` window, so headroom, tailroom and cached header offsets
    /// all survive.
    pub fn uniqueify(mut self) -> Result<WritablePacket> {
        if self.shared() {
            let copy = Buffer::allocate_copy(self.buf.capacity(), 0, self.buf.as_slice())?;
            self.buf = Arc::new(copy);
        }
        Ok(WritablePacket { inner: self })
    }

    // --- headroom/tailroom operations ---

    /// Grow the front of the payload by `n` bytes.
    ///
    /// In place when there is room and the buffer is unshared; otherwise the
    /// packet moves to a fresh buffer with at least `n` bytes of headroom.
    pub fn push(mut self, n: usize) -> Result<WritablePacket> {
        if n <= self.headroom() && !self.shared() {
            self.data -= n;
            Ok(WritablePacket { inner: self })
        } else if n > self.headroom() {
            self.expensive_push(n)
        } else {
            let mut w = self.uniqueify()?;
            w.inner.data -= n;
            Ok(w)
        }
    }

    /// `push` without the uniqueness guarantee: when the room check passes,
    /// the window grows in place even on a shared buffer.
    pub fn nonunique_push(mut self, n: usize) -> Result<Packet> {
        if n <= self.headroom() {
            self.data -= n;
            Ok(self)
        } else {
            Ok(self.expensive_push(n)?.into_packet())
        }
    }

    fn expensive_push(self, n: usize) -> Result<WritablePacket> {
        warn!(
            needed = n,
            headroom = self.headroom(),
            "expensive push: reallocating packet buffer"
        );
        let mut w = self.expensive_uniqueify(slack(n), 0)?;
        w.inner.data -= n;
        Ok(w)
    }

    /// Shrink the front of the payload by `n` bytes, in place. Requests past
    /// the end of the payload clamp to the payload length.
    pub fn pull(&mut self, n: usize) {
        let n = if n > self.length() {
            warn!(requested = n, length = self.length(), "pull exceeds packet length, clamping");
            self.length()
        } else {
            n
        };
        self.data += n;
    }

    /// Grow the back of the payload by `n` bytes.
    ///
    /// In place when there is room and the buffer is unshared; otherwise the
    /// packet moves to a fresh buffer with at least `n` bytes of tailroom.
    pub fn put(mut self, n: usize) -> Result<WritablePacket> {
        if n <= self.tailroom() && !self.shared() {
            self.tail += n;
            Ok(WritablePacket { inner: self })
        } else if n > self.tailroom() {
            self.expensive_put(n)
        } else {
            let mut w = self.uniqueify()?;
            w.inner.tail += n;
            Ok(w)
        }
    }

    /// `put` without the uniqueness guarantee: when the room check passes,
    /// the window grows in place even on a shared buffer.
    pub fn nonunique_put(mut self, n: usize) -> Result<Packet> {
        if n <= self.tailroom() {
            self.tail += n;
            Ok(self)
        } else {
            Ok(self.expensive_put(n)?.into_packet())
        }
    }

    fn expensive_put(self, n: usize) -> Result<WritablePacket> {
        warn!(
            needed = n,
            tailroom = self.tailroom(),
            "expensive put: reallocating packet buffer"
        );
        let mut w = self.expensive_uniqueify(0, slack(n))?;
        w.inner.tail += n;
        Ok(w)
    }

    /// Shrink the back of the payload by `n` bytes, in place. Requests past
    /// the start of the payload clamp to the payload length.
    pub fn take(&mut self, n: usize) {
        let n = if n > self.length() {
            warn!(requested = n, length = self.length(), "take exceeds packet length, clamping");
            self.length()
        } else {
            n
        };
        self.tail -= n;
    }

    /// Reposition the payload window: `data = head + headroom`,
    /// `tail = data + length`. Cached header offsets are left untouched and
    /// almost certainly stale; callers re-set them afterwards.
    pub fn change_headroom_and_length(&mut self, headroom: usize, length: usize) -> Result<()> {
        if headroom + length > self.buffer_length() {
            return Err(PacketError::InvalidGeometry {
                headroom,
                length,
                capacity: self.buffer_length(),
            }
            .into());
        }
        self.data = headroom;
        self.tail = headroom + length;
        Ok(())
    }

    /// Move this packet to a larger buffer, copying the whole `[head, end)`
    /// window shifted by `extra_head`. Post-condition: not shared.
    fn expensive_uniqueify(mut self, extra_head: usize, extra_tail: usize) -> Result<WritablePacket> {
        let capacity = self.buf.capacity() + extra_head + extra_tail;
        let copy = Buffer::allocate_copy(capacity, extra_head, self.buf.as_slice())?;
        self.buf = Arc::new(copy);
        self.data += extra_head;
        self.tail += extra_head;
        if let Some(off) = self.network_header.as_mut() {
            *off += extra_head;
        }
        if let Some(off) = self.transport_header.as_mut() {
            *off += extra_head;
        }
        Ok(WritablePacket { inner: self })
    }

    // --- header offset cache ---

    /// True iff a network header position has been recorded.
    #[inline]
    pub fn has_network_header(&self) -> bool {
        self.network_header.is_some()
    }

    /// Record the network header at `offset` bytes into the current payload,
    /// `len` bytes long; the transport header is cached right behind it.
    pub fn set_network_header(&mut self, offset: usize, len: usize) {
        let header = self.data + offset;
        debug_assert!(header + len <= self.buf.capacity());
        self.network_header = Some(header);
        self.transport_header = Some(header + len);
    }

    /// Alias of [`set_network_header`](Packet::set_network_header) for IPv4.
    pub fn set_ip_header(&mut self, offset: usize, len: usize) {
        self.set_network_header(offset, len);
    }

    /// Record an IPv6 header (fixed 40-byte header).
    pub fn set_ip6_header(&mut self, offset: usize) {
        self.set_network_header(offset, 40);
    }

    /// Record an IPv6 header with extension headers of known total length.
    pub fn set_ip6_header_with_len(&mut self, offset: usize, len: usize) {
        self.set_network_header(offset, len);
    }

    /// The bytes from the cached network header to the end of the buffer.
    /// Offsets are trusted; this window ignores the payload tail.
    pub fn network_header(&self) -> Option<&[u8]> {
        self.network_header.map(|off| &self.buf.as_slice()[off..])
    }

    /// Alias of [`network_header`](Packet::network_header) for IPv4 readers.
    pub fn ip_header(&self) -> Option<&[u8]> {
        self.network_header()
    }

    /// Alias of [`network_header`](Packet::network_header) for IPv6 readers.
    pub fn ip6_header(&self) -> Option<&[u8]> {
        self.network_header()
    }

    /// The bytes from the cached transport header to the end of the buffer.
    pub fn transport_header(&self) -> Option<&[u8]> {
        self.transport_header.map(|off| &self.buf.as_slice()[off..])
    }

    /// Signed distance from `data` to the network header. Negative once the
    /// window has been pulled past the header.
    pub fn network_header_offset(&self) -> Option<isize> {
        self.network_header.map(|off| off as isize - self.data as isize)
    }

    /// Cached network header length (`transport_header - network_header`).
    pub fn network_header_length(&self) -> Option<usize> {
        match (self.network_header, self.transport_header) {
            (Some(net), Some(transport)) => Some(transport - net),
            _ => None,
        }
    }

    /// Signed distance from `data` to the transport header.
    pub fn transport_header_offset(&self) -> Option<isize> {
        self.transport_header.map(|off| off as isize - self.data as isize)
    }

    // --- annotations ---

    #[inline]
    pub fn anno(&self) -> &Annotations {
        &self.anno
    }

    /// Annotations are per-handle, so mutating them needs no uniqueness
    /// witness.
    #[inline]
    pub fn anno_mut(&mut self) -> &mut Annotations {
        &mut self.anno
    }

    /// Zero all annotations and forget the cached header offsets.
    pub fn clear_annotations(&mut self) {
        self.anno.clear();
        self.network_header = None;
        self.transport_header = None;
    }

    /// Copy the annotation block from another handle. Header offsets are not
    /// annotations and are left alone.
    pub fn copy_annotations(&mut self, src: &Packet) {
        self.anno = src.anno;
    }

    pub fn dst_ip_anno(&self) -> Option<std::net::Ipv4Addr> {
        self.anno.dst_ip_anno()
    }

    pub fn set_dst_ip_anno(&mut self, ip: std::net::Ipv4Addr) {
        self.anno.set_dst_ip_anno(ip);
    }

    pub fn dst_ip6_anno(&self) -> Option<std::net::Ipv6Addr> {
        self.anno.dst_ip6_anno()
    }

    pub fn set_dst_ip6_anno(&mut self, ip: std::net::Ipv6Addr) {
        self.anno.set_dst_ip6_anno(ip);
    }

    pub fn timestamp_anno(&self) -> Timestamp {
        self.anno.timestamp_anno()
    }

    pub fn set_timestamp_anno(&mut self, timestamp: Timestamp) {
        self.anno.set_timestamp_anno(timestamp);
    }

    pub fn device_anno(&self) -> Option<DeviceId> {
        self.anno.device_anno()
    }

    pub fn set_device_anno(&mut self, device: Option<DeviceId>) {
        self.anno.set_device_anno(device);
    }

    pub fn packet_kind_anno(&self) -> PacketKind {
        self.anno.packet_kind_anno()
    }

    pub fn set_packet_kind_anno(&mut self, kind: PacketKind) {
        self.anno.set_packet_kind_anno(kind);
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("length", &self.length())
            .field("headroom", &self.headroom())
            .field("tailroom", &self.tailroom())
            .field("shared", &self.shared())
            .field("network_header", &self.network_header)
            .field("transport_header", &self.transport_header)
            .finish()
    }
}

/// A packet handle that is the sole owner of its buffer.
///
/// The witness is established by construction (`make`, `uniqueify`, `push`,
/// `put`) and confers the mutable payload views. It degrades back to a plain
/// [`Packet`] through [`into_packet`](WritablePacket::into_packet) or `From`.
pub struct WritablePacket {
    inner: Packet,
}

impl WritablePacket {
    /// Degrade to a read-only handle.
    pub fn into_packet(self) -> Packet {
        self.inner
    }

    /// Mutable view of the payload window `[data, tail)`.
    ///
    /// Goes through `Arc::make_mut`: for the unique handle this is free, and
    /// if a clone was taken through the shared view since uniquification the
    /// buffer is quietly copied again, keeping every write exclusive.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (data, tail) = (self.inner.data, self.inner.tail);
        &mut Arc::make_mut(&mut self.inner.buf).as_mut_slice()[data..tail]
    }

    /// Mutable view of the whole buffer `[head, end)`.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.inner.buf).as_mut_slice()
    }

    /// Mutable bytes from the cached network header to the end of the buffer.
    pub fn network_header_mut(&mut self) -> Option<&mut [u8]> {
        let off = self.inner.network_header?;
        Some(&mut Arc::make_mut(&mut self.inner.buf).as_mut_slice()[off..])
    }

    /// Alias of [`network_header_mut`](WritablePacket::network_header_mut).
    pub fn ip_header_mut(&mut self) -> Option<&mut [u8]> {
        self.network_header_mut()
    }

    /// Mutable bytes from the cached transport header to the end of the
    /// buffer.
    pub fn transport_header_mut(&mut self) -> Option<&mut [u8]> {
        let off = self.inner.transport_header?;
        Some(&mut Arc::make_mut(&mut self.inner.buf).as_mut_slice()[off..])
    }

    /// Grow the front; stays writable.
    pub fn push(self, n: usize) -> Result<WritablePacket> {
        self.inner.push(n)
    }

    /// Grow the back; stays writable.
    pub fn put(self, n: usize) -> Result<WritablePacket> {
        self.inner.put(n)
    }

    /// Release this handle.
    pub fn kill(self) {}
}

impl Deref for WritablePacket {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.inner
    }
}

impl DerefMut for WritablePacket {
    fn deref_mut(&mut self) -> &mut Packet {
        &mut self.inner
    }
}

impl From<WritablePacket> for Packet {
    fn from(w: WritablePacket) -> Packet {
        w.inner
    }
}

impl std::fmt::Debug for WritablePacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MIN_BUFFER_LENGTH;

    #[test]
    fn test_make_geometry() {
        let p = Packet::make(100).unwrap();
        assert_eq!(p.headroom(), DEFAULT_HEADROOM);
        assert_eq!(p.length(), 100);
        assert!(p.buffer_length() >= 128);
        assert_eq!(p.headroom() + p.length() + p.tailroom(), p.buffer_length());
    }

    #[test]
    fn test_make_minimum_capacity() {
        let p = Packet::make_with(0, None, 4, 0).unwrap();
        assert_eq!(p.buffer_length(), MIN_BUFFER_LENGTH);
        assert_eq!(p.length(), 4);
        assert_eq!(p.tailroom(), MIN_BUFFER_LENGTH - 4);
    }

    #[test]
    fn test_make_from_copies_payload() {
        let p = Packet::make_from(b"hello").unwrap();
        assert_eq!(p.data(), b"hello");
    }

    #[test]
    fn test_make_with_short_source_fails() {
        assert!(Packet::make_with(0, Some(b"ab"), 4, 0).is_err());
    }

    #[test]
    fn test_push_fast_path_keeps_buffer() {
        let p = Packet::make(100).unwrap();
        let addr = p.buffer().as_ptr();
        let w = p.push(14).unwrap();
        assert_eq!(w.buffer().as_ptr(), addr);
        assert_eq!(w.headroom(), DEFAULT_HEADROOM - 14);
        assert_eq!(w.length(), 114);
    }

    #[test]
    fn test_push_slow_path_preserves_payload() {
        let p = Packet::make_from(b"AB").unwrap();
        let addr = p.buffer().as_ptr();
        let w = p.push(40).unwrap();
        assert_ne!(w.buffer().as_ptr(), addr);
        assert_eq!(w.length(), 42);
        assert_eq!(&w.data()[40..], b"AB");
    }

    #[test]
    fn test_push_on_shared_buffer_copies() {
        let p = Packet::make_from(b"shared").unwrap().into_packet();
        let q = p.clone();
        let w = p.push(4).unwrap();
        assert!(!w.shared());
        assert_eq!(&w.data()[4..], b"shared");
        assert_eq!(q.data(), b"shared");
    }

    #[test]
    fn test_pull_take_round_trip() {
        let mut w = Packet::make(100).unwrap();
        let w2 = w.push(10).unwrap();
        let mut p = w2.into_packet();
        p.pull(10);
        assert_eq!(p.length(), 100);
        assert_eq!(p.headroom(), DEFAULT_HEADROOM);

        w = p.put(16).unwrap();
        w.take(16);
        assert_eq!(w.length(), 100);
    }

    #[test]
    fn test_pull_clamps() {
        let mut p = Packet::make(10).unwrap().into_packet();
        p.pull(50);
        assert_eq!(p.length(), 0);
        p.take(50);
        assert_eq!(p.length(), 0);
    }

    #[test]
    fn test_put_grows_tail() {
        let p = Packet::make_with(0, None, 8, 16).unwrap();
        let tail_before = p.tailroom();
        let w = p.put(8).unwrap();
        assert_eq!(w.length(), 16);
        assert_eq!(w.tailroom(), tail_before - 8);
    }

    #[test]
    fn test_clone_shares_uniqueify_splits() {
        let mut w = Packet::make(32).unwrap();
        w.data_mut()[0] = 0x11;
        let p = w.into_packet();
        let q = p.clone();
        assert!(p.shared() && q.shared());

        let mut u = q.uniqueify().unwrap();
        assert!(!p.shared());
        assert!(!u.shared());
        assert_eq!(u.data(), p.data());

        u.data_mut()[0] = 0x22;
        assert_eq!(p.data()[0], 0x11);
    }

    #[test]
    fn test_uniqueify_preserves_geometry_and_headers() {
        let mut w = Packet::make(60).unwrap();
        w.set_ip_header(0, 20);
        let p = w.into_packet();
        let q = p.clone();

        let u = p.uniqueify().unwrap();
        assert_eq!(u.headroom(), q.headroom());
        assert_eq!(u.tailroom(), q.tailroom());
        assert_eq!(u.network_header_offset(), Some(0));
        assert_eq!(u.transport_header_offset(), Some(20));
        q.kill();
    }

    #[test]
    fn test_nonunique_push_keeps_sharing() {
        let p = Packet::make(20).unwrap().into_packet();
        let q = p.clone();
        let p = p.nonunique_push(8).unwrap();
        assert!(p.shared());
        assert_eq!(p.length(), 28);
        assert_eq!(q.length(), 20);
    }

    #[test]
    fn test_header_cache_survives_window_moves() {
        let mut w = Packet::make(60).unwrap();
        w.set_network_header(14, 20);
        let mut p = w.into_packet();
        assert_eq!(p.network_header_offset(), Some(14));
        assert_eq!(p.network_header_length(), Some(20));
        assert_eq!(p.transport_header_offset(), Some(34));

        p.pull(20);
        assert_eq!(p.network_header_offset(), Some(-6));
        assert_eq!(p.transport_header_offset(), Some(14));
    }

    #[test]
    fn test_expensive_push_shifts_header_cache() {
        let mut w = Packet::make_with(0, None, 40, 0).unwrap();
        w.set_ip_header(0, 20);
        let w = w.push(14).unwrap();
        assert_eq!(w.network_header_offset(), Some(14));
        assert_eq!(w.network_header_length(), Some(20));
    }

    #[test]
    fn test_change_headroom_and_length() {
        let mut p = Packet::make(40).unwrap().into_packet();
        p.change_headroom_and_length(4, 16).unwrap();
        assert_eq!(p.headroom(), 4);
        assert_eq!(p.length(), 16);

        let cap = p.buffer_length();
        assert!(p.change_headroom_and_length(cap, 1).is_err());
    }

    #[test]
    fn test_clear_annotations_drops_header_cache() {
        let mut w = Packet::make(40).unwrap();
        w.set_ip_header(0, 20);
        w.set_packet_kind_anno(PacketKind::Broadcast);
        w.clear_annotations();
        assert!(!w.has_network_header());
        assert_eq!(w.packet_kind_anno(), PacketKind::Host);
    }

    #[test]
    fn test_copy_annotations_skips_header_cache() {
        let mut a = Packet::make(10).unwrap().into_packet();
        a.set_packet_kind_anno(PacketKind::Outgoing);
        a.set_device_anno(Some(DeviceId::new(7)));

        let mut b = Packet::make(10).unwrap().into_packet();
        b.set_ip_header(0, 20);
        b.copy_annotations(&a);
        assert_eq!(b.packet_kind_anno(), PacketKind::Outgoing);
        assert_eq!(b.device_anno(), Some(DeviceId::new(7)));
        assert!(b.has_network_header());
    }

    #[test]
    fn test_annotations_independent_across_clones() {
        let mut p = Packet::make(10).unwrap().into_packet();
        p.anno_mut().set_user_anno_u32(0, 1234);
        let mut q = p.clone();
        q.anno_mut().set_user_anno_u32(0, 5678);
        assert_eq!(p.anno().user_anno_u32(0), 1234);
        assert_eq!(q.anno().user_anno_u32(0), 5678);
    }
}
