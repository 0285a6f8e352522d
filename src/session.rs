//! Session: drives a [`ReliableChannel`] over a [`Transport`].
//!
//! In [`SchedulingMode::Cooperative`] every blocking call pumps the
//! transport itself: transmit pending bytes, read one chunk, re-check. In
//! [`SchedulingMode::Threaded`] an ingestion thread and an emission thread do
//! the pumping and application calls wait on [`EventFlags`].

use crate::config::{LinkConfig, SchedulingMode};
use crate::error::{ConnectionError, LinkError, Result};
use crate::events::{self, EventFlags};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::transport::Transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tinylink_core::{
    FrameBuf, LinkCoreError, LinkCoreResult, LinkState, LinkStats, ReliableChannel,
};
use tracing::{debug, error, info, trace, warn};

/// Bytes moved per transport call
const IO_CHUNK: usize = 256;

/// State shared by the application handle and the pump threads
struct Shared<T: Transport> {
    channel: Mutex<ReliableChannel>,
    transport: T,
    /// Held from `get_tx_data` until the bytes are written
    tx_io: Mutex<()>,
    /// Held from the transport read until the bytes reach the channel
    rx_io: Mutex<()>,
    events: EventFlags,
    terminate: AtomicBool,
    failure: Mutex<Option<ConnectionError>>,
    metrics: SessionMetrics,
    config: LinkConfig,
}

impl<T: Transport> Shared<T> {
    fn lock_channel(&self) -> MutexGuard<'_, ReliableChannel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the first failure and wake every waiter
    fn fail(&self, kind: ConnectionError) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            warn!(reason = %kind, "Link down");
            *failure = Some(kind);
        }
        drop(failure);
        self.events.set(events::LINK_DOWN);
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(kind) => Err(LinkError::connection(kind)),
            None => Ok(()),
        }
    }

    /// React to engine results and state transitions
    fn observe(&self, prev: LinkState, channel: &ReliableChannel, result: LinkCoreResult<()>) {
        match result {
            Ok(()) => {}
            Err(LinkCoreError::ConnectionLost) => self.fail(ConnectionError::Lost),
            Err(LinkCoreError::HandshakeFailed) => self.fail(ConnectionError::HandshakeFailed),
            Err(e) => warn!(error = %e, "Channel update failed"),
        }

        let state = channel.state();
        if state != prev {
            trace!(from = %prev, to = %state, "Link state changed");
            match state {
                LinkState::Connected => self.events.set(events::WINDOW_FREE),
                LinkState::Disconnected if prev == LinkState::Connected => {
                    self.fail(ConnectionError::Closed)
                }
                _ => {}
            }
        }
    }

    /// Run timers and write everything the channel has to send
    fn pump_tx(&self) -> Result<usize> {
        let _io = self.tx_io.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; IO_CHUNK];
        let mut total = 0;

        loop {
            let n = {
                let mut channel = self.lock_channel();
                let now = Instant::now();
                let prev = channel.state();
                let result = channel.update(now);
                self.observe(prev, &channel, result);
                channel.get_tx_data(&mut buf, now)
            };
            if n == 0 {
                return Ok(total);
            }
            self.write_all(&buf[..n])?;
            total += n;
        }
    }

    /// Read one chunk, waiting at most `wait`, and feed it to the channel
    fn pump_rx(&self, wait: Duration) -> Result<usize> {
        let io = self.rx_io.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; IO_CHUNK];
        let n = self.transport.read_timeout(&mut buf, wait)?;
        if n == 0 {
            return Ok(0);
        }

        let now = Instant::now();
        let mut channel = self.lock_channel();
        let prev = channel.state();
        let outcome = channel.on_rx_data(&buf[..n], now);
        self.observe(prev, &channel, Ok(()));
        let tx_pending = channel.has_tx_data(now);
        drop(channel);
        drop(io);

        let mut flags = 0;
        if outcome.delivered > 0 {
            flags |= events::RX_MESSAGE;
        }
        if outcome.acked > 0 {
            flags |= events::WINDOW_FREE;
        }
        if tx_pending {
            flags |= events::TX_READY;
        }
        if flags != 0 {
            self.events.set(flags);
        }
        Ok(n)
    }

    /// Write `data` completely or give up after `io_timeout`.
    ///
    /// A partial frame left behind fails its checksum at the peer and is
    /// recovered by retransmission.
    fn write_all(&self, data: &[u8]) -> Result<()> {
        let deadline = Instant::now() + self.config.io_timeout;
        let mut written = 0;
        while written < data.len() {
            let now = Instant::now();
            if now >= deadline {
                debug!(dropped = data.len() - written, "Transport write timed out");
                return Ok(());
            }
            written += self
                .transport
                .write_timeout(&data[written..], deadline - now)?;
        }
        Ok(())
    }

    /// Wait until `ready` yields a value, the link fails, or `deadline` passes.
    ///
    /// `ready` is evaluated under the channel lock before every wait.
    /// Returns `Ok(None)` on timeout.
    fn wait_for<R>(
        &self,
        mask: u32,
        deadline: Instant,
        mut ready: impl FnMut(&mut ReliableChannel) -> Result<Option<R>>,
    ) -> Result<Option<R>> {
        loop {
            let value = {
                let mut channel = self.lock_channel();
                ready(&mut *channel)?
            };
            if value.is_some() {
                return Ok(value);
            }
            self.check_failure()?;

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.config.poll_interval);

            match self.config.scheduling {
                SchedulingMode::Cooperative => {
                    self.pump_tx()?;
                    self.pump_rx(wait)?;
                }
                SchedulingMode::Threaded => {
                    self.events.wait(mask | events::LINK_DOWN, true, wait);
                }
            }
        }
    }

    fn run_rx(&self) {
        while !self.terminate.load(Ordering::Acquire) {
            if let Err(e) = self.pump_rx(self.config.poll_interval) {
                if !self.terminate.load(Ordering::Acquire) {
                    error!(error = %e, "Receive pump failed, stopping");
                    self.fail(ConnectionError::Closed);
                }
                break;
            }
        }
        trace!("Receive pump exited");
    }

    fn run_tx(&self) {
        while !self.terminate.load(Ordering::Acquire) {
            match self.pump_tx() {
                Ok(0) => {
                    self.events
                        .wait(events::TX_READY, true, self.config.poll_interval);
                }
                Ok(_) => {}
                Err(e) => {
                    if !self.terminate.load(Ordering::Acquire) {
                        error!(error = %e, "Transmit pump failed, stopping");
                        self.fail(ConnectionError::Closed);
                    }
                    break;
                }
            }
        }
        trace!("Transmit pump exited");
    }
}

// ── Session ─────────────────────────────────────────────────────────────

/// A connected link over a transport.
///
/// All calls take `&self`, so one session can be shared between a sending
/// and a reading thread. Transport reads and writes are serialized, so
/// concurrent callers in cooperative mode never interleave frame bytes.
pub struct Session<T: Transport> {
    shared: Arc<Shared<T>>,
    pumps: Vec<JoinHandle<()>>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Build the channel over `transport` and run the connect handshake.
    pub fn open(transport: T, config: LinkConfig) -> Result<Self> {
        config.validate()?;

        let channel = ReliableChannel::new(config.clone().into())
            .map_err(|e| LinkError::init_failed(e.to_string()))?;

        if !config.startup_delay.is_zero() {
            debug!(delay_ms = config.startup_delay.as_millis() as u64, "Startup delay");
            thread::sleep(config.startup_delay);
        }

        let shared = Arc::new(Shared {
            channel: Mutex::new(channel),
            transport,
            tx_io: Mutex::new(()),
            rx_io: Mutex::new(()),
            events: EventFlags::new(),
            terminate: AtomicBool::new(false),
            failure: Mutex::new(None),
            metrics: SessionMetrics::default(),
            config,
        });

        let mut session = Self {
            shared,
            pumps: Vec::new(),
            closed: false,
        };

        if session.shared.config.scheduling == SchedulingMode::Threaded {
            session.spawn_pumps()?;
        }

        session.handshake().map_err(|e| match e {
            LinkError::Io(err) => LinkError::init_failed(format!("transport failed: {err}")),
            LinkError::Connection {
                kind: ConnectionError::Closed,
            } => LinkError::init_failed("transport closed during handshake"),
            other => other,
        })?;
        info!(
            mtu = session.shared.config.mtu,
            window = session.shared.config.window,
            scheduling = ?session.shared.config.scheduling,
            "Session open"
        );
        Ok(session)
    }

    fn spawn_pumps(&mut self) -> Result<()> {
        let rx = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("tinylink-rx".into())
            .spawn(move || rx.run_rx())
            .map_err(|e| LinkError::init_failed(format!("spawn receive pump: {e}")))?;
        self.pumps.push(handle);

        let tx = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("tinylink-tx".into())
            .spawn(move || tx.run_tx())
            .map_err(|e| LinkError::init_failed(format!("spawn transmit pump: {e}")))?;
        self.pumps.push(handle);
        Ok(())
    }

    fn handshake(&self) -> Result<()> {
        self.shared.lock_channel().connect();
        self.shared.events.set(events::TX_READY);

        let deadline = Instant::now() + self.shared.config.handshake_budget();
        let connected = self.shared.wait_for(events::WINDOW_FREE, deadline, |channel| {
            Ok(channel.is_connected().then_some(()))
        })?;

        match connected {
            Some(()) => Ok(()),
            None => Err(LinkError::connection(ConnectionError::HandshakeFailed)),
        }
    }

    /// Queue `payload` for reliable delivery.
    ///
    /// Waits for send-window space up to `timeout`; a timed-out send leaves
    /// nothing queued.
    pub fn send(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        let mtu = self.shared.config.mtu;
        if payload.len() > mtu {
            return Err(LinkError::buffer(format!(
                "payload of {} bytes exceeds MTU {mtu}",
                payload.len()
            )));
        }

        let shared = &self.shared;
        let deadline = Instant::now() + timeout;
        let queued = shared.wait_for(events::WINDOW_FREE, deadline, |channel| {
            match channel.send(payload) {
                Ok(()) => Ok(Some(())),
                Err(e) if e.is_transient() => Ok(None),
                Err(LinkCoreError::NotConnected) => {
                    shared.check_failure()?;
                    Err(LinkError::connection(ConnectionError::NotConnected))
                }
                Err(e) => Err(e.into()),
            }
        })?;

        if queued.is_none() {
            shared.metrics.send_timeout();
            return Err(LinkError::timeout(timeout.as_millis() as u64));
        }

        shared.metrics.packet_sent(payload.len());
        match shared.config.scheduling {
            SchedulingMode::Cooperative => {
                shared.pump_tx()?;
            }
            SchedulingMode::Threaded => shared.events.set(events::TX_READY),
        }
        Ok(())
    }

    /// Take the next message, waiting up to `timeout`.
    ///
    /// The returned buffer belongs to the receive pool; dropping it makes the
    /// slot available for the next frame. `Ok(None)` means the wait timed out.
    pub fn read(&self, timeout: Duration) -> Result<Option<FrameBuf>> {
        let deadline = Instant::now() + timeout;
        let frame = self
            .shared
            .wait_for(events::RX_MESSAGE, deadline, |channel| Ok(channel.recv()))?;

        match frame {
            Some(frame) => {
                self.shared.metrics.packet_received(frame.len());
                Ok(Some(frame))
            }
            None => {
                self.shared.metrics.read_timeout();
                Ok(None)
            }
        }
    }

    /// Copy the next message into `out`, returning its length.
    ///
    /// `out` must hold a full MTU so no message is ever truncated.
    pub fn read_into(&self, out: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        let mtu = self.shared.config.mtu;
        if out.len() < mtu {
            return Err(LinkError::buffer(format!(
                "read buffer of {} bytes is smaller than MTU {mtu}",
                out.len()
            )));
        }

        Ok(self.read(timeout)?.map(|frame| {
            out[..frame.len()].copy_from_slice(&frame);
            frame.len()
        }))
    }

    /// Disconnect, stop the pumps and close the transport
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    pub fn state(&self) -> LinkState {
        self.shared.lock_channel().state()
    }

    pub fn stats(&self) -> LinkStats {
        *self.shared.lock_channel().stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let close_timeout = self.shared.config.close_timeout;

        // Best effort throughout: the peer may already be gone
        let deadline = Instant::now() + close_timeout;
        let drained = self.shared.wait_for(events::WINDOW_FREE, deadline, |channel| {
            Ok((!channel.is_connected() || channel.outstanding() == 0).then_some(()))
        });
        if let Ok(None) = drained {
            debug!("Unacknowledged frames discarded on close");
        }

        self.shared.lock_channel().disconnect();
        self.shared.events.set(events::TX_READY);

        let deadline = Instant::now() + close_timeout;
        let disconnected = self.shared.wait_for(0, deadline, |channel| {
            Ok((channel.state() == LinkState::Disconnected).then_some(()))
        });
        if let Err(e) = disconnected {
            debug!(error = %e, "Disconnect handshake incomplete");
        }

        self.shared.terminate.store(true, Ordering::Release);
        self.shared.events.set(events::TX_READY | events::LINK_DOWN);
        for handle in self.pumps.drain(..) {
            if handle.join().is_err() {
                error!("Pump thread panicked");
            }
        }

        // Pending UA or DM for the peer
        if let Err(e) = self.shared.pump_tx() {
            trace!(error = %e, "Final flush failed");
        }

        info!("Session closed");
        self.shared.transport.close()?;
        Ok(())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!(error = %e, "Error while closing session");
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("scheduling", &self.shared.config.scheduling)
            .field("closed", &self.closed)
            .finish()
    }
}
