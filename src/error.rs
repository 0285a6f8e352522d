//! Error types for tinylink.
//!
//! [`LinkError`] extends [`tinylink_core::LinkCoreError`] with I/O, timeout,
//! initialization and connection variants needed by the session layer.

use std::fmt;
use thiserror::Error;
use tinylink_core::LinkCoreError;

pub type Result<T> = std::result::Result<T, LinkError>;

// ── Error types ─────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Initialization failed: {message}")]
    InitFailed { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection error: {kind}")]
    Connection { kind: ConnectionError },

    #[error("Buffer error: {message}")]
    Buffer { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// Closed locally or by the peer
    Closed,
    /// Retransmissions exhausted
    Lost,
    /// Connect request never acknowledged
    HandshakeFailed,
    NotConnected,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Lost => write!(f, "connection lost"),
            Self::HandshakeFailed => write!(f, "handshake failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

// ── Bridge: core errors → LinkError ─────────────────────────────────────

impl From<LinkCoreError> for LinkError {
    fn from(e: LinkCoreError) -> Self {
        match e {
            LinkCoreError::Protocol { message } => Self::Protocol { message },
            LinkCoreError::Buffer { message } => Self::Buffer { message },
            LinkCoreError::Config { message } => Self::Config { message },
            LinkCoreError::WindowFull => Self::buffer("send window full"),
            LinkCoreError::NotConnected => Self::connection(ConnectionError::NotConnected),
            LinkCoreError::HandshakeFailed => Self::connection(ConnectionError::HandshakeFailed),
            LinkCoreError::ConnectionLost => Self::connection(ConnectionError::Lost),
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────────

impl LinkError {
    pub fn init_failed(message: impl Into<String>) -> Self {
        Self::InitFailed { message: message.into() }
    }

    pub fn connection(kind: ConnectionError) -> Self {
        Self::Connection { kind }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn buffer(message: impl Into<String>) -> Self {
        Self::Buffer { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

// ── Predicates ──────────────────────────────────────────────────────────

impl LinkError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Timeout { .. } | Self::Buffer { .. } => true,
            _ => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                kind: ConnectionError::Lost
                    | ConnectionError::Closed
                    | ConnectionError::HandshakeFailed
            } | Self::InitFailed { .. }
                | Self::Internal { .. }
        )
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Connection { kind } => matches!(kind, ConnectionError::Closed),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let err: LinkError = LinkCoreError::ConnectionLost.into();
        assert!(matches!(
            err,
            LinkError::Connection { kind: ConnectionError::Lost }
        ));
        assert!(err.is_fatal());

        let err: LinkError = LinkCoreError::config("window").into();
        assert!(matches!(err, LinkError::Config { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_predicates() {
        assert!(LinkError::timeout(10).is_recoverable());
        assert!(LinkError::connection(ConnectionError::Closed).is_closed());
        assert!(LinkError::connection(ConnectionError::HandshakeFailed).is_connection_error());

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(LinkError::from(io).is_closed());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LinkError::timeout(250).to_string(),
            "Operation timed out after 250ms"
        );
        assert_eq!(
            LinkError::connection(ConnectionError::Lost).to_string(),
            "Connection error: connection lost"
        );
    }
}
