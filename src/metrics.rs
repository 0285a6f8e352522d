//! Application-level counters for a session

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-session metrics collector
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Messages accepted by `send`
    pub packets_sent: AtomicU64,
    /// Messages handed to the application by `read`
    pub packets_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    /// `send` calls that gave up waiting for window space
    pub send_timeouts: AtomicU64,
    /// `read` calls that returned without a message
    pub read_timeouts: AtomicU64,
}

impl SessionMetrics {
    pub fn packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn packet_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_timeouts: u64,
    pub read_timeouts: u64,
}

impl MetricsSnapshot {
    /// Application payload throughput in bytes per second
    pub fn throughput_bps(&self, duration: Duration) -> f64 {
        let total_bytes = self.bytes_sent + self.bytes_received;
        total_bytes as f64 / duration.as_secs_f64()
    }
}

/// Format metrics for human-readable display
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    format!(
        "Link Metrics:\n\
         Messages: {} sent, {} received\n\
         Payload: {} bytes sent, {} bytes received\n\
         Timeouts: {} send, {} read",
        snapshot.packets_sent,
        snapshot.packets_received,
        snapshot.bytes_sent,
        snapshot.bytes_received,
        snapshot.send_timeouts,
        snapshot.read_timeouts,
    )
}
