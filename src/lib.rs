//! # tinylink — reliable framed messaging over serial links
//!
//! HDLC-style framing with a selectable checksum, and a modulo-8 go-back-N
//! ARQ channel that delivers every message exactly once and in order over a
//! lossy byte stream such as a UART.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │  tinylink  (this crate)               │
//! │                                       │
//! │  Session        ← user API            │
//! │  events         ← pump signalling     │
//! │  transport      ← serial / loopback   │
//! ├───────────────────────────────────────┤
//! │  tinylink-core  (dependency)          │
//! │                                       │
//! │  ReliableChannel ← sans-I/O ARQ       │
//! │  FrameCodec      ← byte stuffing+FCS  │
//! │  FramePool       ← fixed buffers      │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tinylink::{LinkConfig, LoopbackTransport, Session};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (left, right) = LoopbackTransport::pair();
//!     let peer = std::thread::spawn(move || {
//!         let session = Session::open(right, LinkConfig::new())?;
//!         if let Some(frame) = session.read(Duration::from_secs(1))? {
//!             session.send(&frame, Duration::from_secs(1))?;
//!         }
//!         session.close()
//!     });
//!
//!     let session = Session::open(left, LinkConfig::new())?;
//!     session.send(b"Hello, link!", Duration::from_secs(1))?;
//!     if let Some(echo) = session.read(Duration::from_secs(1))? {
//!         println!("Received: {:?}", &echo[..]);
//!     }
//!     session.close()?;
//!     peer.join().expect("peer thread")?;
//!     Ok(())
//! }
//! ```

// ── Layer 1: Core protocol (re-exported from tinylink-core) ────────────

/// Core protocol types, constants, and wire format.
pub use tinylink_core::protocol;

/// Direct access to the standalone `tinylink-core` crate.
pub use tinylink_core;

pub use tinylink_core::{ChecksumMode, FcsAlgorithms, FrameBuf, LinkState, LinkStats};

// ── Layer 2: Transport & signalling ─────────────────────────────────────

pub mod events;
pub mod transport;
pub use events::EventFlags;
pub use transport::{FaultConfig, FaultyTransport, LoopbackTransport, Transport};
#[cfg(feature = "serial")]
pub use transport::SerialTransport;

// ── Layer 3: Configuration & errors (extends core with session concerns) ─

pub mod config;
pub mod error;
pub use config::{LinkConfig, SchedulingMode};
pub use error::{ConnectionError, LinkError, Result};

// ── Layer 4: Session ────────────────────────────────────────────────────

pub mod metrics;
pub mod session;
pub use metrics::MetricsSnapshot;
pub use session::Session;

// ── Version info ────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
