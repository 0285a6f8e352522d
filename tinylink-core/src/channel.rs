//! Sliding-window go-back-N ARQ channel
//!
//! [`ReliableChannel`] is a sans-I/O state machine: received bytes go in
//! through [`on_rx_data`](ReliableChannel::on_rx_data), bytes to transmit come
//! out of [`get_tx_data`](ReliableChannel::get_tx_data), and timers are driven
//! by [`update`](ReliableChannel::update). Every time-dependent call takes the
//! current `Instant`, so the engine never reads a clock itself.

use crate::codec::{CodecStats, FrameCodec, FrameEncoder};
use crate::config::ChannelConfig;
use crate::error::{LinkCoreError, LinkCoreResult};
use crate::pool::{FrameBuf, FramePool};
use crate::protocol::constants::{ADDRESS, HEADER_SIZE, SEQ_MODULUS};
use crate::protocol::*;

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Pending-acknowledgment slot for one information frame
struct TxSlot {
    buf: FrameBuf,
    /// Last transmission; `None` while waiting to be (re)sent
    sent_at: Option<Instant>,
    transmissions: u32,
}

/// Connect or disconnect request awaiting UA
#[derive(Debug)]
struct Handshake {
    request: UnnumberedKind,
    sent_at: Option<Instant>,
    retries: u32,
}

/// Queued control frame; N(R) is filled in when the frame is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlRequest {
    Reject,
    NotReady,
    Unnumbered(UnnumberedKind),
}

/// What one call to [`ReliableChannel::on_rx_data`] accomplished
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RxOutcome {
    /// Frames that passed the checksum
    pub frames: usize,
    /// Information frames queued for the application
    pub delivered: usize,
    /// Pending frames retired by acknowledgments
    pub acked: usize,
}

/// Modulo-8 go-back-N channel over a [`FrameCodec`]
pub struct ReliableChannel {
    config: ChannelConfig,
    state: LinkState,
    codec: FrameCodec,
    tx_pool: FramePool,
    rx_pool: FramePool,

    // Send side
    pending: [Option<TxSlot>; SEQ_MODULUS as usize],
    snd_una: Seq,
    snd_nxt: Seq,
    snd_cursor: Seq,
    retries: u32,
    /// Set by RNR; I-frames are held until RR, REJ or the busy timer expires
    peer_busy: Option<Instant>,

    // Receive side
    rcv_nxt: Seq,
    ack_due: Option<Instant>,
    reject_sent: bool,
    /// An in-sequence frame was dropped for lack of buffers and RNR sent
    local_busy: bool,
    delivered: VecDeque<FrameBuf>,

    control: VecDeque<ControlRequest>,
    handshake: Option<Handshake>,
    tx_frame: Option<FrameEncoder>,
    stats: LinkStats,
}

impl ReliableChannel {
    /// Create a disconnected channel with freshly allocated buffer pools
    pub fn new(config: ChannelConfig) -> LinkCoreResult<Self> {
        config.validate()?;

        let codec = FrameCodec::with_algorithms(config.checksum, config.fcs, config.max_frame_size());
        let tx_pool = FramePool::new(config.window as usize, config.mtu);
        let rx_pool = FramePool::new(config.rx_buffers, config.mtu);

        Ok(Self {
            state: LinkState::Disconnected,
            codec,
            tx_pool,
            rx_pool,

            pending: std::array::from_fn(|_| None),
            snd_una: 0,
            snd_nxt: 0,
            snd_cursor: 0,
            retries: 0,
            peer_busy: None,

            rcv_nxt: 0,
            ack_due: None,
            reject_sent: false,
            local_busy: false,
            delivered: VecDeque::with_capacity(config.rx_buffers),

            control: VecDeque::new(),
            handshake: None,
            tx_frame: None,
            stats: LinkStats::default(),

            config,
        })
    }

    /// Start the connect handshake (SABM)
    pub fn connect(&mut self) {
        if matches!(self.state, LinkState::Connected | LinkState::Connecting) {
            return;
        }

        self.reset_link();
        self.control.clear();
        self.start_handshake(UnnumberedKind::Sabm);
        self.state = LinkState::Connecting;
        info!("Link connecting");
    }

    /// Start the disconnect handshake (DISC); pending frames are released
    pub fn disconnect(&mut self) {
        if matches!(self.state, LinkState::Disconnected | LinkState::Disconnecting) {
            return;
        }

        self.reset_link();
        self.control.clear();
        self.start_handshake(UnnumberedKind::Disc);
        self.state = LinkState::Disconnecting;
        info!("Link disconnecting");
    }

    /// Queue `payload` as the next information frame.
    ///
    /// Fails with [`LinkCoreError::WindowFull`] while `window` frames are
    /// outstanding; that condition clears once an acknowledgment arrives.
    pub fn send(&mut self, payload: &[u8]) -> LinkCoreResult<()> {
        if self.state != LinkState::Connected {
            return Err(LinkCoreError::NotConnected);
        }
        if payload.len() > self.config.mtu {
            return Err(LinkCoreError::buffer(format!(
                "payload of {} bytes exceeds MTU {}",
                payload.len(),
                self.config.mtu
            )));
        }
        if self.outstanding() >= self.config.window as usize {
            return Err(LinkCoreError::WindowFull);
        }
        let Some(mut buf) = self.tx_pool.acquire() else {
            return Err(LinkCoreError::WindowFull);
        };
        buf.put_slice(payload)?;

        let ns = self.snd_nxt;
        self.pending[ns as usize] = Some(TxSlot {
            buf,
            sent_at: None,
            transmissions: 0,
        });
        self.snd_nxt = seq_next(ns);
        self.stats.bytes_sent += payload.len() as u64;

        trace!(ns, bytes = payload.len(), "Frame queued");
        Ok(())
    }

    /// Take the next frame delivered in sequence
    pub fn recv(&mut self) -> Option<FrameBuf> {
        self.delivered.pop_front()
    }

    /// Process bytes read from the transport
    pub fn on_rx_data(&mut self, data: &[u8], now: Instant) -> RxOutcome {
        let mut outcome = RxOutcome::default();

        for frame in self.codec.feed(data) {
            outcome.frames += 1;
            self.stats.frames_received += 1;
            self.handle_frame(frame, now, &mut outcome);
        }

        let codec = self.codec.stats();
        self.stats.crc_errors = codec.crc_errors;
        self.stats.oversize_errors = codec.oversize_errors;
        outcome
    }

    /// Fill `out` with bytes to transmit, returning how many were written.
    ///
    /// At most one frame is being encoded at a time; a frame that does not
    /// fit is continued on the next call.
    pub fn get_tx_data(&mut self, out: &mut [u8], now: Instant) -> usize {
        let mut written = 0;

        while written < out.len() {
            if self.tx_frame.is_none() {
                match self.next_frame(now) {
                    Some(frame) => self.tx_frame = Some(frame),
                    None => break,
                }
            }
            if let Some(frame) = self.tx_frame.as_mut() {
                written += frame.fill(&mut out[written..]);
                if frame.is_done() {
                    self.tx_frame = None;
                }
            }
        }

        written
    }

    /// Evaluate retransmission and handshake timers.
    ///
    /// Returns [`LinkCoreError::ConnectionLost`] or
    /// [`LinkCoreError::HandshakeFailed`] once, when the retry budget runs
    /// out; the channel is `Disconnected` afterwards.
    pub fn update(&mut self, now: Instant) -> LinkCoreResult<()> {
        match self.state {
            LinkState::Connecting | LinkState::Disconnecting => self.check_handshake(now),
            LinkState::Connected => self.check_retransmit(now),
            LinkState::Disconnected => Ok(()),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Information frames sent or queued but not yet acknowledged
    pub fn outstanding(&self) -> usize {
        seq_distance(self.snd_una, self.snd_nxt) as usize
    }

    /// Whether `send` would currently accept a frame
    pub fn can_send(&self) -> bool {
        self.is_connected() && self.outstanding() < self.config.window as usize
    }

    /// Frames waiting for the application
    pub fn pending_delivery(&self) -> usize {
        self.delivered.len()
    }

    /// Whether `get_tx_data` has something to emit at `now`
    pub fn has_tx_data(&self, now: Instant) -> bool {
        let unsent = self.snd_cursor != self.snd_nxt && self.peer_busy.is_none();
        self.tx_frame.is_some()
            || !self.control.is_empty()
            || (self.is_connected() && unsent)
            || self.receiver_ready()
            || self.ack_due.is_some_and(|due| now >= due)
    }

    /// Earliest instant at which a timer needs attention
    pub fn next_deadline(&self) -> Option<Instant> {
        let retransmit = match self.peer_busy {
            Some(since) => Some(since),
            None => self.pending[self.snd_una as usize]
                .as_ref()
                .and_then(|slot| slot.sent_at),
        }
        .map(|t| t + self.config.retry_timeout);
        let handshake = self
            .handshake
            .as_ref()
            .and_then(|h| h.sent_at)
            .map(|t| t + self.config.retry_timeout);

        [retransmit, handshake, self.ack_due]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn codec_stats(&self) -> &CodecStats {
        self.codec.stats()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Pool backing frames delivered to the application
    pub fn rx_pool(&self) -> &FramePool {
        &self.rx_pool
    }

    /// Pool backing frames awaiting acknowledgment
    pub fn tx_pool(&self) -> &FramePool {
        &self.tx_pool
    }

    // ── Receive path ────────────────────────────────────────────────────

    fn handle_frame(&mut self, frame: Bytes, now: Instant, outcome: &mut RxOutcome) {
        if frame.len() < HEADER_SIZE || frame[0] != ADDRESS {
            self.stats.invalid_frames += 1;
            debug!(len = frame.len(), "Frame with bad header dropped");
            return;
        }
        let Some(control) = Control::decode(frame[1]) else {
            self.stats.invalid_frames += 1;
            debug!(control = frame[1], "Unsupported control field");
            return;
        };

        trace!(frame = control.name(), state = %self.state, "Frame received");

        match control {
            Control::Unnumbered(kind) => self.on_unnumbered(kind),
            Control::Supervisory { kind, nr } => {
                if !self.accepts_numbered() {
                    return;
                }
                outcome.acked += self.process_ack(nr);
                match kind {
                    SupervisoryKind::ReceiveReady => {
                        // Frames sent while the peer was busy were discarded
                        if self.peer_busy.take().is_some() {
                            debug!(nr, "Peer ready again, going back");
                            self.rewind();
                        }
                    }
                    SupervisoryKind::ReceiveNotReady => {
                        if self.peer_busy.is_none() {
                            debug!(nr, "Peer busy, holding I-frames");
                        }
                        self.peer_busy = Some(now);
                        self.retries = 0;
                    }
                    SupervisoryKind::Reject => {
                        self.stats.rejects_received += 1;
                        self.peer_busy = None;
                        debug!(nr, "Reject received, going back");
                        self.rewind();
                    }
                }
            }
            Control::Information { ns, nr } => {
                if !self.accepts_numbered() {
                    return;
                }
                outcome.acked += self.process_ack(nr);
                self.on_information(ns, &frame[HEADER_SIZE..], now, outcome);
            }
        }
    }

    fn on_information(&mut self, ns: Seq, payload: &[u8], now: Instant, outcome: &mut RxOutcome) {
        if ns != self.rcv_nxt {
            self.stats.out_of_sequence += 1;
            debug!(ns, expected = self.rcv_nxt, "Out-of-sequence frame discarded");
            if self.local_busy {
                self.push_control(ControlRequest::NotReady);
            } else if self.reject_sent {
                // One REJ per exception condition; keep the peer informed with RR
                self.ack_due.get_or_insert(now);
            } else {
                self.reject_sent = true;
                self.push_control(ControlRequest::Reject);
            }
            return;
        }

        // Not acknowledged; RNR holds the peer until a buffer comes back
        let Some(mut buf) = self.rx_pool.acquire() else {
            self.stats.lost_frames += 1;
            self.local_busy = true;
            self.push_control(ControlRequest::NotReady);
            debug!(ns, "No receive buffer free, frame dropped");
            return;
        };
        if let Err(e) = buf.put_slice(payload) {
            self.stats.invalid_frames += 1;
            warn!(error = %e, "Information frame dropped");
            return;
        }

        self.delivered.push_back(buf);
        self.rcv_nxt = seq_next(ns);
        self.reject_sent = false;
        self.stats.i_frames_delivered += 1;
        self.stats.bytes_received += payload.len() as u64;
        outcome.delivered += 1;
        self.ack_due.get_or_insert(now + self.config.ack_delay);
    }

    fn on_unnumbered(&mut self, kind: UnnumberedKind) {
        match kind {
            UnnumberedKind::Sabm => {
                if self.state == LinkState::Disconnecting {
                    self.push_control(ControlRequest::Unnumbered(UnnumberedKind::Dm));
                    return;
                }
                let was = self.state;
                let unacked = self.take_pending();
                self.reset_link();
                self.control
                    .retain(|c| *c != ControlRequest::Unnumbered(UnnumberedKind::Sabm));
                self.push_control(ControlRequest::Unnumbered(UnnumberedKind::Ua));
                self.handshake = None;
                self.state = LinkState::Connected;
                if was == LinkState::Connected {
                    warn!(requeued = unacked.len(), "Peer reset the link");
                } else {
                    info!("Link established by peer request");
                }
                // Unacknowledged frames restart from N(S) = 0
                for buf in unacked {
                    self.pending[self.snd_nxt as usize] = Some(TxSlot {
                        buf,
                        sent_at: None,
                        transmissions: 0,
                    });
                    self.snd_nxt = seq_next(self.snd_nxt);
                }
            }
            UnnumberedKind::Ua => match self.state {
                LinkState::Connecting => {
                    self.handshake = None;
                    self.state = LinkState::Connected;
                    info!("Link established");
                }
                LinkState::Disconnecting => {
                    self.handshake = None;
                    self.state = LinkState::Disconnected;
                    info!("Link closed");
                }
                _ => trace!("Unsolicited UA ignored"),
            },
            UnnumberedKind::Disc => {
                if self.state != LinkState::Disconnected {
                    self.reset_link();
                    info!("Link closed by peer");
                }
                self.control.clear();
                self.handshake = None;
                self.state = LinkState::Disconnected;
                self.push_control(ControlRequest::Unnumbered(UnnumberedKind::Ua));
            }
            UnnumberedKind::Dm => match self.state {
                LinkState::Connected | LinkState::Disconnecting => {
                    self.reset_link();
                    self.handshake = None;
                    self.state = LinkState::Disconnected;
                    info!("Peer is in disconnected mode");
                }
                // Peer not up yet; the SABM retry policy keeps going
                _ => {}
            },
            UnnumberedKind::Frmr => {
                warn!("Peer rejected a frame");
            }
        }
    }

    /// Numbered frames are only meaningful while connected; a disconnected
    /// station answers them with DM.
    fn accepts_numbered(&mut self) -> bool {
        match self.state {
            LinkState::Connected => true,
            LinkState::Disconnected => {
                self.push_control(ControlRequest::Unnumbered(UnnumberedKind::Dm));
                false
            }
            _ => false,
        }
    }

    /// Cumulative acknowledgment: retire every pending frame before `nr`
    fn process_ack(&mut self, nr: Seq) -> usize {
        let acked = seq_distance(self.snd_una, nr);
        if acked == 0 {
            return 0;
        }
        if acked > seq_distance(self.snd_una, self.snd_nxt) {
            self.stats.invalid_acks += 1;
            warn!(
                nr,
                una = self.snd_una,
                nxt = self.snd_nxt,
                "Acknowledgment outside send window ignored"
            );
            return 0;
        }

        for _ in 0..acked {
            // Dropping the slot returns its buffer to the pool
            self.pending[self.snd_una as usize] = None;
            self.snd_una = seq_next(self.snd_una);
        }
        self.retries = 0;

        // The cursor never trails the window start
        if seq_distance(self.snd_una, self.snd_cursor) > seq_distance(self.snd_una, self.snd_nxt) {
            self.snd_cursor = self.snd_una;
        }

        trace!(nr, acked, outstanding = self.outstanding(), "Frames acknowledged");
        acked as usize
    }

    // ── Transmit path ───────────────────────────────────────────────────

    fn next_frame(&mut self, now: Instant) -> Option<FrameEncoder> {
        if let Some(request) = self.control.pop_front() {
            let control = match request {
                ControlRequest::Reject => {
                    self.stats.rejects_sent += 1;
                    self.ack_due = None;
                    Control::Supervisory {
                        kind: SupervisoryKind::Reject,
                        nr: self.rcv_nxt,
                    }
                }
                ControlRequest::NotReady => {
                    self.ack_due = None;
                    Control::Supervisory {
                        kind: SupervisoryKind::ReceiveNotReady,
                        nr: self.rcv_nxt,
                    }
                }
                ControlRequest::Unnumbered(kind) => {
                    if let Some(handshake) = self.handshake.as_mut() {
                        if handshake.request == kind {
                            handshake.sent_at = Some(now);
                        }
                    }
                    Control::Unnumbered(kind)
                }
            };
            return Some(self.encode_control(control));
        }

        if self.state != LinkState::Connected {
            return None;
        }

        if self.receiver_ready() {
            self.local_busy = false;
            self.ack_due = None;
            debug!(nr = self.rcv_nxt, "Receive buffer free, peer released");
            return Some(self.encode_control(Control::Supervisory {
                kind: SupervisoryKind::ReceiveReady,
                nr: self.rcv_nxt,
            }));
        }

        if self.snd_cursor != self.snd_nxt && self.peer_busy.is_none() {
            let ns = self.snd_cursor;
            let control = Control::Information {
                ns,
                nr: self.rcv_nxt,
            };
            let Some(slot) = self.pending[ns as usize].as_mut() else {
                warn!(ns, "Send cursor points at an empty slot");
                self.snd_cursor = self.snd_nxt;
                return None;
            };

            slot.sent_at = Some(now);
            slot.transmissions += 1;
            if slot.transmissions > 1 {
                self.stats.retransmissions += 1;
            }
            let frame = self
                .codec
                .encode(&[ADDRESS, control.encode()], slot.buf.as_slice());

            self.snd_cursor = seq_next(ns);
            self.ack_due = None;
            self.stats.frames_sent += 1;
            self.stats.i_frames_sent += 1;
            trace!(ns, nr = self.rcv_nxt, "I-frame encoded");
            return Some(frame);
        }

        if self.ack_due.is_some_and(|due| now >= due) {
            self.ack_due = None;
            return Some(self.encode_control(Control::Supervisory {
                kind: SupervisoryKind::ReceiveReady,
                nr: self.rcv_nxt,
            }));
        }

        None
    }

    fn encode_control(&mut self, control: Control) -> FrameEncoder {
        self.stats.frames_sent += 1;
        trace!(frame = control.name(), "Control frame encoded");
        self.codec.encode(&[ADDRESS, control.encode()], &[])
    }

    // ── Timers ──────────────────────────────────────────────────────────

    fn check_handshake(&mut self, now: Instant) -> LinkCoreResult<()> {
        let retry_timeout = self.config.retry_timeout;
        let max_retries = self.config.max_retries;
        let Some(handshake) = self.handshake.as_mut() else {
            return Ok(());
        };
        let Some(sent_at) = handshake.sent_at else {
            return Ok(());
        };
        if now.saturating_duration_since(sent_at) < retry_timeout {
            return Ok(());
        }

        handshake.retries += 1;
        handshake.sent_at = None;
        let request = handshake.request;
        let retries = handshake.retries;

        if retries > max_retries {
            self.handshake = None;
            self.control
                .retain(|c| *c != ControlRequest::Unnumbered(request));
            let connecting = self.state == LinkState::Connecting;
            self.state = LinkState::Disconnected;
            if connecting {
                warn!(retries = max_retries, "Connect request unanswered, giving up");
                return Err(LinkCoreError::HandshakeFailed);
            }
            info!("Disconnect request unanswered, link closed");
            return Ok(());
        }

        debug!(?request, attempt = retries, "Handshake timeout, resending");
        self.push_control(ControlRequest::Unnumbered(request));
        Ok(())
    }

    fn check_retransmit(&mut self, now: Instant) -> LinkCoreResult<()> {
        // A busy peer is alive; its timer resends without spending retries
        if let Some(since) = self.peer_busy {
            if now.saturating_duration_since(since) >= self.config.retry_timeout {
                self.peer_busy = None;
                self.stats.timeouts += 1;
                debug!(ns = self.snd_una, "Peer busy timeout, resending");
                self.rewind();
            }
            return Ok(());
        }
        if self.snd_una == self.snd_nxt {
            return Ok(());
        }
        let Some(sent_at) = self.pending[self.snd_una as usize]
            .as_ref()
            .and_then(|slot| slot.sent_at)
        else {
            return Ok(());
        };
        if now.saturating_duration_since(sent_at) < self.config.retry_timeout {
            return Ok(());
        }

        self.stats.timeouts += 1;
        self.retries += 1;
        if self.retries > self.config.max_retries {
            warn!(
                retries = self.config.max_retries,
                ns = self.snd_una,
                "Retransmissions exhausted, link lost"
            );
            self.reset_link();
            self.handshake = None;
            self.state = LinkState::Disconnected;
            return Err(LinkCoreError::ConnectionLost);
        }

        debug!(
            ns = self.snd_una,
            outstanding = self.outstanding(),
            attempt = self.retries,
            "Retransmit timeout, going back"
        );
        self.rewind();
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Go-back-N: resend from the oldest unacknowledged frame
    fn rewind(&mut self) {
        self.snd_cursor = self.snd_una;
        for slot in self.pending.iter_mut().flatten() {
            slot.sent_at = None;
        }
    }

    /// Busy receiver whose application has released a buffer
    fn receiver_ready(&self) -> bool {
        self.local_busy && self.is_connected() && self.rx_pool.available() > 0
    }

    /// Remove unacknowledged frames in sequence order
    fn take_pending(&mut self) -> Vec<FrameBuf> {
        let mut frames = Vec::with_capacity(self.outstanding());
        let mut seq = self.snd_una;
        while seq != self.snd_nxt {
            if let Some(slot) = self.pending[seq as usize].take() {
                frames.push(slot.buf);
            }
            seq = seq_next(seq);
        }
        frames
    }

    fn start_handshake(&mut self, request: UnnumberedKind) {
        self.handshake = Some(Handshake {
            request,
            sent_at: None,
            retries: 0,
        });
        self.push_control(ControlRequest::Unnumbered(request));
    }

    fn push_control(&mut self, request: ControlRequest) {
        if !self.control.contains(&request) {
            self.control.push_back(request);
        }
    }

    /// Reset sequence state and release pending frames. Frames already
    /// delivered stay queued for the application.
    fn reset_link(&mut self) {
        for slot in self.pending.iter_mut() {
            *slot = None;
        }
        self.snd_una = 0;
        self.snd_nxt = 0;
        self.snd_cursor = 0;
        self.retries = 0;
        self.peer_busy = None;
        self.rcv_nxt = 0;
        self.ack_due = None;
        self.reject_sent = false;
        self.local_busy = false;
        self.control
            .retain(|c| matches!(c, ControlRequest::Unnumbered(_)));
    }
}

impl std::fmt::Debug for ReliableChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableChannel")
            .field("state", &self.state)
            .field("snd_una", &self.snd_una)
            .field("snd_nxt", &self.snd_nxt)
            .field("snd_cursor", &self.snd_cursor)
            .field("rcv_nxt", &self.rcv_nxt)
            .field("delivered", &self.delivered.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumMode;
    use std::time::Duration;

    fn pump(a: &mut ReliableChannel, b: &mut ReliableChannel, now: Instant) {
        let mut buf = [0u8; 256];
        loop {
            let n = a.get_tx_data(&mut buf, now);
            if n == 0 {
                break;
            }
            b.on_rx_data(&buf[..n], now);
        }
    }

    #[test]
    fn test_starts_disconnected() {
        let channel = ReliableChannel::new(ChannelConfig::default()).unwrap();
        assert_eq!(channel.state(), LinkState::Disconnected);
        assert!(!channel.can_send());
    }

    #[test]
    fn test_send_requires_connection() {
        let mut channel = ReliableChannel::new(ChannelConfig::default()).unwrap();
        assert_eq!(channel.send(b"x"), Err(LinkCoreError::NotConnected));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChannelConfig {
            window: 9,
            ..ChannelConfig::default()
        };
        assert!(ReliableChannel::new(config).is_err());
    }

    #[test]
    fn test_connect_emits_sabm() {
        let config = ChannelConfig {
            checksum: ChecksumMode::Off,
            ..ChannelConfig::default()
        };
        let mut channel = ReliableChannel::new(config).unwrap();
        channel.connect();
        assert_eq!(channel.state(), LinkState::Connecting);

        let mut buf = [0u8; 16];
        let n = channel.get_tx_data(&mut buf, Instant::now());
        let expected = Control::Unnumbered(UnnumberedKind::Sabm).encode();
        assert_eq!(&buf[..n], &[0x7E, ADDRESS, expected, 0x7E]);
    }

    #[test]
    fn test_passive_open() {
        let now = Instant::now();
        let mut a = ReliableChannel::new(ChannelConfig::default()).unwrap();
        let mut b = ReliableChannel::new(ChannelConfig::default()).unwrap();

        a.connect();
        pump(&mut a, &mut b, now);
        assert_eq!(b.state(), LinkState::Connected);
        pump(&mut b, &mut a, now);
        assert_eq!(a.state(), LinkState::Connected);
    }

    #[test]
    fn test_mtu_enforced() {
        let now = Instant::now();
        let config = ChannelConfig {
            mtu: 4,
            ..ChannelConfig::default()
        };
        let mut a = ReliableChannel::new(config.clone()).unwrap();
        let mut b = ReliableChannel::new(config).unwrap();
        a.connect();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);

        assert!(matches!(a.send(b"12345"), Err(LinkCoreError::Buffer { .. })));
        assert!(a.send(b"1234").is_ok());
    }

    #[test]
    fn test_standalone_ack_after_grace() {
        let now = Instant::now();
        let config = ChannelConfig {
            ack_delay: Duration::from_millis(10),
            ..ChannelConfig::default()
        };
        let mut a = ReliableChannel::new(config.clone()).unwrap();
        let mut b = ReliableChannel::new(config).unwrap();
        a.connect();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);

        a.send(b"ping").unwrap();
        pump(&mut a, &mut b, now);
        assert_eq!(b.pending_delivery(), 1);

        // Inside the grace period nothing goes out
        assert!(!b.has_tx_data(now));
        let later = now + Duration::from_millis(10);
        assert!(b.has_tx_data(later));
        pump(&mut b, &mut a, later);
        assert_eq!(a.outstanding(), 0);
        assert_eq!(a.tx_pool().available(), a.tx_pool().capacity());
    }
}
