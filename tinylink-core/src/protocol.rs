//! Wire types, constants, and sequence arithmetic

use std::fmt;

/// Link protocol constants
pub mod constants {
    pub const FLAG: u8 = 0x7E; // frame delimiter
    pub const ESCAPE: u8 = 0x7D; // control escape
    pub const ESCAPE_MASK: u8 = 0x20; // xor applied to escaped byte
    pub const ADDRESS: u8 = 0xFF; // all-stations address
    pub const HEADER_SIZE: usize = 2; // address + control
    pub const SEQ_MODULUS: u8 = 8;
    pub const SEQ_MASK: u8 = SEQ_MODULUS - 1;
    pub const MAX_WINDOW: u8 = 7;
    pub const PF_BIT: u8 = 0x10; // poll/final

    pub const S_FRAME_BITS: u8 = 0x01;
    pub const U_FRAME_BITS: u8 = 0x03;
    pub const S_RR: u8 = 0x00;
    pub const S_RNR: u8 = 0x04;
    pub const S_REJ: u8 = 0x08;
    pub const S_SREJ: u8 = 0x0C;

    pub const U_SABM: u8 = 0x2F;
    pub const U_UA: u8 = 0x63;
    pub const U_DISC: u8 = 0x43;
    pub const U_DM: u8 = 0x0F;
    pub const U_FRMR: u8 = 0x87;
}

/// Modulo-8 sequence number
pub type Seq = u8;

/// `seq + n` modulo 8
#[inline]
pub fn seq_add(seq: Seq, n: u8) -> Seq {
    seq.wrapping_add(n) & constants::SEQ_MASK
}

/// Successor of `seq` modulo 8
#[inline]
pub fn seq_next(seq: Seq) -> Seq {
    seq_add(seq, 1)
}

/// Number of steps from `from` forward to `to`, modulo 8
#[inline]
pub fn seq_distance(from: Seq, to: Seq) -> u8 {
    to.wrapping_sub(from) & constants::SEQ_MASK
}

/// Supervisory frame function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisoryKind {
    /// Receive ready: acknowledgment only
    ReceiveReady,
    /// Receive not ready: acknowledgment, but hold further I-frames
    ReceiveNotReady,
    /// Reject: go back to N(R)
    Reject,
}

/// Unnumbered frame function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnnumberedKind {
    /// Set asynchronous balanced mode (connect request)
    Sabm,
    /// Unnumbered acknowledgment
    Ua,
    /// Disconnect request
    Disc,
    /// Disconnected mode
    Dm,
    /// Frame reject
    Frmr,
}

impl UnnumberedKind {
    fn bits(self) -> u8 {
        match self {
            UnnumberedKind::Sabm => constants::U_SABM,
            UnnumberedKind::Ua => constants::U_UA,
            UnnumberedKind::Disc => constants::U_DISC,
            UnnumberedKind::Dm => constants::U_DM,
            UnnumberedKind::Frmr => constants::U_FRMR,
        }
    }
}

/// Decoded control field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Information { ns: Seq, nr: Seq },
    Supervisory { kind: SupervisoryKind, nr: Seq },
    Unnumbered(UnnumberedKind),
}

impl Control {
    /// Encode into the one-byte control field
    pub fn encode(self) -> u8 {
        match self {
            Control::Information { ns, nr } => {
                ((nr & constants::SEQ_MASK) << 5) | ((ns & constants::SEQ_MASK) << 1)
            }
            Control::Supervisory { kind, nr } => {
                let ss = match kind {
                    SupervisoryKind::ReceiveReady => constants::S_RR,
                    SupervisoryKind::ReceiveNotReady => constants::S_RNR,
                    SupervisoryKind::Reject => constants::S_REJ,
                };
                ((nr & constants::SEQ_MASK) << 5) | ss | constants::S_FRAME_BITS
            }
            // P on commands, F on responses; same bit either way
            Control::Unnumbered(kind) => kind.bits() | constants::PF_BIT,
        }
    }

    /// Decode a control byte; `None` for unsupported functions
    pub fn decode(byte: u8) -> Option<Self> {
        if byte & 0x01 == 0 {
            return Some(Control::Information {
                ns: (byte >> 1) & constants::SEQ_MASK,
                nr: (byte >> 5) & constants::SEQ_MASK,
            });
        }

        if byte & constants::U_FRAME_BITS == constants::S_FRAME_BITS {
            let nr = (byte >> 5) & constants::SEQ_MASK;
            return match byte & 0x0C {
                constants::S_RR => Some(Control::Supervisory {
                    kind: SupervisoryKind::ReceiveReady,
                    nr,
                }),
                constants::S_RNR => Some(Control::Supervisory {
                    kind: SupervisoryKind::ReceiveNotReady,
                    nr,
                }),
                constants::S_REJ => Some(Control::Supervisory {
                    kind: SupervisoryKind::Reject,
                    nr,
                }),
                // Selective reject is not spoken by this engine
                _ => None,
            };
        }

        match byte & !constants::PF_BIT {
            constants::U_SABM => Some(Control::Unnumbered(UnnumberedKind::Sabm)),
            constants::U_UA => Some(Control::Unnumbered(UnnumberedKind::Ua)),
            constants::U_DISC => Some(Control::Unnumbered(UnnumberedKind::Disc)),
            constants::U_DM => Some(Control::Unnumbered(UnnumberedKind::Dm)),
            constants::U_FRMR => Some(Control::Unnumbered(UnnumberedKind::Frmr)),
            _ => None,
        }
    }

    /// Short mnemonic for logging
    pub fn name(&self) -> &'static str {
        match self {
            Control::Information { .. } => "I",
            Control::Supervisory {
                kind: SupervisoryKind::ReceiveReady,
                ..
            } => "RR",
            Control::Supervisory {
                kind: SupervisoryKind::ReceiveNotReady,
                ..
            } => "RNR",
            Control::Supervisory {
                kind: SupervisoryKind::Reject,
                ..
            } => "REJ",
            Control::Unnumbered(UnnumberedKind::Sabm) => "SABM",
            Control::Unnumbered(UnnumberedKind::Ua) => "UA",
            Control::Unnumbered(UnnumberedKind::Disc) => "DISC",
            Control::Unnumbered(UnnumberedKind::Dm) => "DM",
            Control::Unnumbered(UnnumberedKind::Frmr) => "FRMR",
        }
    }
}

/// Connection state of the ARQ channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Statistics for one channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Payload bytes accepted by `send`
    pub bytes_sent: u64,
    /// Payload bytes delivered to the receive queue
    pub bytes_received: u64,
    /// Frames of any kind put on the wire
    pub frames_sent: u64,
    /// Frames of any kind that passed the checksum
    pub frames_received: u64,
    /// Information frames put on the wire, retransmissions included
    pub i_frames_sent: u64,
    /// Information frames delivered in sequence
    pub i_frames_delivered: u64,
    /// Information frames sent more than once
    pub retransmissions: u64,
    /// Retransmit timer expirations
    pub timeouts: u64,
    /// REJ frames sent
    pub rejects_sent: u64,
    /// REJ frames received
    pub rejects_received: u64,
    /// Information frames discarded for an unexpected N(S)
    pub out_of_sequence: u64,
    /// Frames with a bad address, unknown control or short header
    pub invalid_frames: u64,
    /// Frames dropped by checksum verification
    pub crc_errors: u64,
    /// Accumulations discarded for exceeding the maximum frame size
    pub oversize_errors: u64,
    /// In-sequence frames dropped because no receive buffer was free
    pub lost_frames: u64,
    /// Acknowledgments carrying an N(R) outside the send window
    pub invalid_acks: u64,
}
