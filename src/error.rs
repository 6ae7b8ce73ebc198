//! Centralized error handling for packet-pipeline
//!
//! All failures in the buffer core are surfaced as values; nothing in the
//! packet path unwinds. Size-domain faults (over-long `pull`/`take`) are not
//! errors at all: they clamp and warn through the logger.

use std::fmt;

/// Main error type for the packet-pipeline library
#[derive(Debug)]
pub enum PipelineError {
    /// Packet buffer errors
    Packet(PacketError),
    /// Stage configuration errors
    Config(ConfigError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// The allocator rejected a buffer request
    Allocation { requested: usize },
    /// A caller-provided region does not fit the buffer
    BufferTooSmall { required: usize, available: usize },
    /// Requested headroom/length do not fit the buffer capacity
    InvalidGeometry { headroom: usize, length: usize, capacity: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { field: String, value: String, reason: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Packet(e) => write!(f, "Packet error: {}", e),
            PipelineError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Allocation { requested } => {
                write!(f, "Failed to allocate packet buffer of {} bytes", requested)
            }
            PacketError::BufferTooSmall { required, available } => {
                write!(f, "Buffer too small: required {}, available {}", required, available)
            }
            PacketError::InvalidGeometry { headroom, length, capacity } => {
                write!(
                    f,
                    "Invalid geometry: headroom {} + length {} exceeds capacity {}",
                    headroom, length, capacity
                )
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Packet(e) => Some(e),
            PipelineError::Config(e) => Some(e),
        }
    }
}

impl std::error::Error for PacketError {}
impl std::error::Error for ConfigError {}

impl From<PacketError> for PipelineError {
    fn from(error: PacketError) -> Self {
        PipelineError::Packet(error)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(error: ConfigError) -> Self {
        PipelineError::Config(error)
    }
}

/// Type alias for Results used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PacketError::BufferTooSmall { required: 128, available: 64 };
        assert_eq!(e.to_string(), "Buffer too small: required 128, available 64");

        let e: PipelineError = PacketError::Allocation { requested: 4096 }.into();
        assert!(e.to_string().contains("4096"));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let e: PipelineError = PacketError::Allocation { requested: 1 }.into();
        assert!(e.source().is_some());
    }
}
