//! Event flags shared between the application and the pump threads

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A delivered frame is waiting for `read`
pub const RX_MESSAGE: u32 = 1 << 0;
/// An acknowledgment freed send-window space, or the link came up
pub const WINDOW_FREE: u32 = 1 << 1;
/// The channel has bytes for the transport
pub const TX_READY: u32 = 1 << 2;
/// The link failed or was closed by the peer
pub const LINK_DOWN: u32 = 1 << 3;

/// Settable bitmask with timed waits.
///
/// Flags are hints: waiters re-check the channel after waking, so a
/// consumed or spurious flag never loses an event.
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: Mutex<u32>,
    changed: Condvar,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bits: u32) {
        let mut current = self.bits.lock().unwrap_or_else(PoisonError::into_inner);
        *current |= bits;
        self.changed.notify_all();
    }

    pub fn clear(&self, bits: u32) {
        let mut current = self.bits.lock().unwrap_or_else(PoisonError::into_inner);
        *current &= !bits;
    }

    pub fn get(&self) -> u32 {
        *self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until any bit of `mask` is set or `timeout` passes.
    ///
    /// Returns the matching bits (0 on timeout). With `consume` the returned
    /// bits are cleared.
    pub fn wait(&self, mask: u32, consume: bool, timeout: Duration) -> u32 {
        let current = self.bits.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut current, _) = self
            .changed
            .wait_timeout_while(current, timeout, |bits| *bits & mask == 0)
            .unwrap_or_else(PoisonError::into_inner);

        let hit = *current & mask;
        if consume {
            *current &= !hit;
        }
        hit
    }
}
