//! Pure synchronous link-layer engine for serial links.
//!
//! This crate implements HDLC-style framing and a modulo-8 go-back-N ARQ
//! channel with no runtime dependencies: no threads, no clocks of its own,
//! no I/O. Callers feed it received bytes, pull bytes to transmit, and pass
//! the current `Instant` so timers can be evaluated.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │  tinylink-core                   │
//! │                                  │
//! │  channel   ← ARQ state machine   │
//! │  codec     ← byte stuffing + FCS │
//! │  checksum  ← CRC strategies      │
//! │  pool      ← fixed buffer arena  │
//! │  protocol  ← wire types          │
//! │  config    ← tuning              │
//! │  error     ← error variants      │
//! └──────────────────────────────────┘
//! ```

pub mod channel;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;

pub use channel::{ReliableChannel, RxOutcome};
pub use checksum::{ChecksumMode, Fcs, FcsAlgorithms};
pub use codec::{CodecStats, FrameCodec, FrameEncoder};
pub use config::ChannelConfig;
pub use error::{LinkCoreError, LinkCoreResult};
pub use pool::{FrameBuf, FramePool};
pub use protocol::*;
