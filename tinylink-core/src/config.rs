//! Configuration for the link-layer engine

use crate::checksum::{ChecksumMode, FcsAlgorithms};
use crate::error::{LinkCoreError, LinkCoreResult};
use crate::protocol::constants;
use std::time::Duration;

/// Protocol-only configuration for [`ReliableChannel`](crate::ReliableChannel).
///
/// Contains only the fields the engine reads; transport and scheduling
/// settings live in the runtime crate.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum payload bytes per frame
    pub mtu: usize,
    /// Maximum unacknowledged information frames, 1..=7
    pub window: u8,
    /// Frame check sequence width
    pub checksum: ChecksumMode,
    /// Polynomials used for each checksum width
    pub fcs: FcsAlgorithms,
    /// Time before an unacknowledged frame is retransmitted
    pub retry_timeout: Duration,
    /// Retransmissions allowed before the link is declared lost
    pub max_retries: u32,
    /// Grace period for piggybacking an acknowledgment before a standalone RR
    pub ack_delay: Duration,
    /// Receive buffers available for frames awaiting the application
    pub rx_buffers: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mtu: 64,
            window: constants::MAX_WINDOW,
            checksum: ChecksumMode::Crc16,
            fcs: FcsAlgorithms::default(),
            retry_timeout: Duration::from_millis(200),
            max_retries: 5,
            ack_delay: Duration::from_millis(5),
            rx_buffers: constants::MAX_WINDOW as usize,
        }
    }
}

impl ChannelConfig {
    /// Largest unescaped frame the decoder accepts, FCS excluded
    pub fn max_frame_size(&self) -> usize {
        constants::HEADER_SIZE + self.mtu
    }

    pub fn validate(&self) -> LinkCoreResult<()> {
        if self.mtu == 0 || self.mtu > u16::MAX as usize {
            return Err(LinkCoreError::config("MTU must be between 1 and 65535"));
        }
        if self.window == 0 || self.window > constants::MAX_WINDOW {
            return Err(LinkCoreError::config("Window size must be between 1 and 7"));
        }
        if self.retry_timeout.is_zero() {
            return Err(LinkCoreError::config("Retry timeout must be greater than 0"));
        }
        if self.rx_buffers == 0 {
            return Err(LinkCoreError::config("At least one receive buffer is required"));
        }
        if self.ack_delay >= self.retry_timeout {
            return Err(LinkCoreError::config(
                "Acknowledgment delay must be shorter than the retry timeout",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        ChannelConfig::default().validate().unwrap();
    }

    #[test]
    fn test_window_bounds() {
        let mut config = ChannelConfig::default();
        config.window = 0;
        assert!(config.validate().is_err());
        config.window = 8;
        assert!(config.validate().is_err());
        config.window = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ack_delay_must_beat_retry_timeout() {
        let config = ChannelConfig {
            ack_delay: Duration::from_millis(300),
            ..ChannelConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkCoreError::Config { .. })));
    }

    #[test]
    fn test_max_frame_size() {
        let config = ChannelConfig {
            mtu: 32,
            ..ChannelConfig::default()
        };
        assert_eq!(config.max_frame_size(), 34);
    }
}
