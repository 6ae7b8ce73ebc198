//! Contiguous packet buffer storage
//!
//! A [`Buffer`] is one heap allocation holding a packet's bytes. It is always
//! shared through `Arc`, whose strong count doubles as the buffer use count:
//! increments are relaxed, the decrement on drop is release with an acquire
//! fence before the final free, which is exactly the ordering the forwarding
//! path needs.
//!
//! The buffer itself knows nothing about payload boundaries. `data`/`tail`
//! offsets live on each [`Packet`](crate::packet::Packet) handle, so two
//! clones sharing one buffer can trim it independently.

use crate::error::{PacketError, Result};

/// Smallest buffer ever allocated, so short packets can still grow a little
/// without reallocating.
pub const MIN_BUFFER_LENGTH: usize = 64;

/// Headroom reserved by the default `make` variants; enough for an Ethernet
/// header plus a VLAN tag in front of an IP packet.
pub const DEFAULT_HEADROOM: usize = 28;

/// One contiguous byte region backing a packet.
///
/// `head` is always offset 0 and `end` is `capacity()`; the interesting
/// offsets are per-handle. Cloning a `Buffer` value copies the bytes, which is
/// what `Arc::make_mut` relies on for copy-on-write.
#[derive(Clone)]
pub struct Buffer {
    bytes: Box<[u8]>,
}

impl Buffer {
    /// Allocate a zeroed buffer of at least `len` bytes, clamped up to
    /// [`MIN_BUFFER_LENGTH`].
    ///
    /// Allocation failure is reported, not aborted on; the forwarding path
    /// treats a rejected allocation as a dropped packet.
    pub fn allocate(len: usize) -> Result<Buffer> {
        let len = len.max(MIN_BUFFER_LENGTH);
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| PacketError::Allocation { requested: len })?;
        bytes.resize(len, 0);
        Ok(Buffer { bytes: bytes.into_boxed_slice() })
    }

    /// Allocate a buffer and copy an existing window into it at `offset`.
    ///
    /// Used by the copy-on-write slow paths: the caller picks the new offset
    /// so that the headroom it is about to consume exists in the new buffer.
    pub fn allocate_copy(len: usize, offset: usize, window: &[u8]) -> Result<Buffer> {
        if offset + window.len() > len.max(MIN_BUFFER_LENGTH) {
            return Err(PacketError::BufferTooSmall {
                required: offset + window.len(),
                available: len.max(MIN_BUFFER_LENGTH),
            }
            .into());
        }
        let mut buffer = Buffer::allocate(len)?;
        buffer.bytes[offset..offset + window.len()].copy_from_slice(window);
        Ok(buffer)
    }

    /// Total usable capacity: `end - head` in offset terms.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("capacity", &self.capacity()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_respects_minimum() {
        let buffer = Buffer::allocate(8).unwrap();
        assert_eq!(buffer.capacity(), MIN_BUFFER_LENGTH);

        let buffer = Buffer::allocate(200).unwrap();
        assert_eq!(buffer.capacity(), 200);
    }

    #[test]
    fn test_allocate_copy_places_window() {
        let buffer = Buffer::allocate_copy(128, 28, b"payload").unwrap();
        assert_eq!(&buffer.as_slice()[28..35], b"payload");
        assert!(buffer.as_slice()[..28].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_copy_rejects_overflow() {
        let result = Buffer::allocate_copy(64, 60, &[0u8; 16]);
        assert!(result.is_err());
    }

    #[test]
    fn test_clone_copies_bytes() {
        let mut buffer = Buffer::allocate(64).unwrap();
        buffer.as_mut_slice()[0] = 0xAB;
        let copy = buffer.clone();
        buffer.as_mut_slice()[0] = 0xCD;
        assert_eq!(copy.as_slice()[0], 0xAB);
    }
}
