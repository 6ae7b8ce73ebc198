//! Packet buffers and header-check stages for modular packet processing.
//!
//! packet-pipeline provides the buffer abstraction a packet-processing
//! framework carries between stages: refcounted buffers with cheap zero-copy
//! cloning, copy-on-write mutation through a uniqueness witness, in-place
//! header growth and shrink at both ends, a fixed-size per-handle annotation
//! block, and cached network/transport header offsets. Two stages,
//! [`CheckTcpHeader`] and [`CheckUdpHeader`], validate L4 framing and
//! checksums and exercise the whole contract.
//!
//! # Example
//!
//! ```
//! use packet_pipeline::{Packet, Result};
//!
//! # fn example() -> Result<()> {
//! let mut w = Packet::make_from(&[0u8; 34])?;
//! w.set_ip_header(14, 20);
//! let p = w.into_packet();
//!
//! let q = p.clone();            // zero-copy, shared buffer
//! assert!(p.shared());
//!
//! let mut w = q.uniqueify()?;   // exclusive again, copied if needed
//! w.data_mut()[0] = 0x45;
//! assert_eq!(p.data()[0], 0);   // the sibling never sees the write
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod element;
pub mod error;
pub mod packet;

// Re-export key types
pub use buffer::{Buffer, DEFAULT_HEADROOM, MIN_BUFFER_LENGTH};
pub use element::{
    CheckTcpHeader, CheckUdpHeader, CheckerConfig, DropReason, Element, Emit, StageCounters,
    PORT_DROP, PORT_FORWARD,
};
pub use error::{PipelineError, Result};
pub use packet::{
    AddressAnno, Annotations, DeviceId, Packet, PacketKind, Timestamp, WritablePacket,
};
