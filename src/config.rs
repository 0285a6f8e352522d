//! Configuration types for tinylink.
//!
//! [`LinkConfig`] extends the core [`ChannelConfig`] with session-level
//! settings (scheduling mode, polling, I/O and close timeouts).

use crate::error::{LinkError, Result};
use std::time::Duration;
use tinylink_core::{ChannelConfig, ChecksumMode, FcsAlgorithms};

/// How the session drives the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingMode {
    /// No background threads; `send`, `read`, `open` and `close` pump the
    /// transport themselves
    #[default]
    Cooperative,
    /// Dedicated ingestion and emission threads run until the session closes
    Threaded,
}

// ── LinkConfig ──────────────────────────────────────────────────────────

/// Full link configuration: protocol settings plus session settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    // Protocol settings (forwarded to the core channel)
    pub mtu: usize,
    pub window: u8,
    pub checksum: ChecksumMode,
    pub fcs: FcsAlgorithms,
    pub retry_timeout: Duration,
    pub max_retries: u32,
    pub ack_delay: Duration,
    pub rx_buffers: usize,

    // Session settings
    pub scheduling: SchedulingMode,
    /// Pause before the first handshake, for peers that reset on port open
    pub startup_delay: Duration,
    /// Longest single transport wait inside a pump
    pub poll_interval: Duration,
    /// Budget for flushing one transmit chunk to the transport
    pub io_timeout: Duration,
    /// Budget for the disconnect handshake on close
    pub close_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            mtu: channel.mtu,
            window: channel.window,
            checksum: channel.checksum,
            fcs: channel.fcs,
            retry_timeout: channel.retry_timeout,
            max_retries: channel.max_retries,
            ack_delay: channel.ack_delay,
            rx_buffers: channel.rx_buffers,

            scheduling: SchedulingMode::Cooperative,
            startup_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(2),
            io_timeout: Duration::from_millis(100),
            close_timeout: Duration::from_millis(500),
        }
    }
}

/// Extracts the protocol-only fields that `ReliableChannel` reads.
impl From<LinkConfig> for ChannelConfig {
    fn from(c: LinkConfig) -> Self {
        Self {
            mtu: c.mtu,
            window: c.window,
            checksum: c.checksum,
            fcs: c.fcs,
            retry_timeout: c.retry_timeout,
            max_retries: c.max_retries,
            ack_delay: c.ack_delay,
            rx_buffers: c.rx_buffers,
        }
    }
}

// ── Builder methods ─────────────────────────────────────────────────────

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Protocol tuning --

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }

    pub fn checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn fcs_algorithms(mut self, algorithms: FcsAlgorithms) -> Self {
        self.fcs = algorithms;
        self
    }

    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn rx_buffers(mut self, buffers: usize) -> Self {
        self.rx_buffers = buffers;
        self
    }

    // -- Session tuning --

    pub fn scheduling(mut self, mode: SchedulingMode) -> Self {
        self.scheduling = mode;
        self
    }

    pub fn threaded(self) -> Self {
        self.scheduling(SchedulingMode::Threaded)
    }

    pub fn cooperative(self) -> Self {
        self.scheduling(SchedulingMode::Cooperative)
    }

    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    // -- Validation --

    pub fn validate(&self) -> Result<()> {
        ChannelConfig::from(self.clone()).validate()?;
        if self.poll_interval.is_zero() {
            return Err(LinkError::config("Poll interval must be greater than 0"));
        }
        if self.io_timeout.is_zero() {
            return Err(LinkError::config("I/O timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Upper bound on how long the connect handshake can take
    pub fn handshake_budget(&self) -> Duration {
        self.retry_timeout * (self.max_retries + 2)
    }
}

// ── Presets ──────────────────────────────────────────────────────────────

impl LinkConfig {
    /// Small frames and few buffers for RAM-constrained targets
    pub fn microcontroller() -> Self {
        Self::default()
            .mtu(32)
            .window(3)
            .rx_buffers(3)
            .checksum(ChecksumMode::Crc8)
    }

    /// Large frames, full window and background pumps
    pub fn desktop() -> Self {
        Self::default()
            .mtu(1024)
            .window(7)
            .rx_buffers(14)
            .checksum(ChecksumMode::Crc32)
            .retry_timeout(Duration::from_millis(100))
            .threaded()
    }

    /// Slow UART to a board that reboots when the port opens
    pub fn arduino() -> Self {
        Self::default()
            .mtu(32)
            .window(2)
            .rx_buffers(2)
            .retry_timeout(Duration::from_millis(500))
            .max_retries(8)
            .ack_delay(Duration::from_millis(20))
            .startup_delay(Duration::from_secs(2))
    }
}
