//! Error types for the link-layer engine

use std::fmt;

/// Result type for engine operations
pub type LinkCoreResult<T> = std::result::Result<T, LinkCoreError>;

/// Errors produced by the engine.
///
/// Checksum failures, out-of-sequence frames and receive-pool exhaustion are
/// recovered inside the engine and only show up in [`LinkStats`](crate::LinkStats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCoreError {
    /// Protocol-level errors (invalid frames, bad state)
    Protocol { message: String },
    /// Buffer errors (payload larger than MTU, buffer capacity exceeded)
    Buffer { message: String },
    /// Invalid configuration
    Config { message: String },
    /// Send window is full; retry once an acknowledgment arrives
    WindowFull,
    /// The link is not in the connected state
    NotConnected,
    /// Connect request was not acknowledged within the retry budget
    HandshakeFailed,
    /// Retransmissions exhausted; the link is down
    ConnectionLost,
}

impl LinkCoreError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        LinkCoreError::Protocol {
            message: message.into(),
        }
    }

    /// Create a buffer error
    pub fn buffer(message: impl Into<String>) -> Self {
        LinkCoreError::Buffer {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        LinkCoreError::Config {
            message: message.into(),
        }
    }

    /// Check if this error terminates the link
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkCoreError::ConnectionLost | LinkCoreError::HandshakeFailed
        )
    }

    /// Check if the operation may succeed when retried later
    pub fn is_transient(&self) -> bool {
        matches!(self, LinkCoreError::WindowFull)
    }
}

impl fmt::Display for LinkCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkCoreError::Protocol { message } => write!(f, "Protocol error: {message}"),
            LinkCoreError::Buffer { message } => write!(f, "Buffer error: {message}"),
            LinkCoreError::Config { message } => write!(f, "Configuration error: {message}"),
            LinkCoreError::WindowFull => write!(f, "Send window full"),
            LinkCoreError::NotConnected => write!(f, "Link not connected"),
            LinkCoreError::HandshakeFailed => write!(f, "Link handshake failed"),
            LinkCoreError::ConnectionLost => write!(f, "Connection lost"),
        }
    }
}

impl std::error::Error for LinkCoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LinkCoreError::ConnectionLost.is_fatal());
        assert!(LinkCoreError::HandshakeFailed.is_fatal());
        assert!(!LinkCoreError::WindowFull.is_fatal());
        assert!(LinkCoreError::WindowFull.is_transient());
        assert!(!LinkCoreError::buffer("too big").is_transient());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LinkCoreError::protocol("bad control").to_string(),
            "Protocol error: bad control"
        );
        assert_eq!(LinkCoreError::ConnectionLost.to_string(), "Connection lost");
    }
}
