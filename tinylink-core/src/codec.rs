//! HDLC-style byte-stuffing codec
//!
//! Wire layout: `FLAG | escaped(header + payload + FCS) | FLAG`. Inside the
//! escaped region every `FLAG` or `ESCAPE` byte becomes `ESCAPE, byte ^ 0x20`,
//! so only delimiters mark frame boundaries.

use crate::checksum::{ChecksumMode, Fcs, FcsAlgorithms};
use crate::protocol::constants::{ESCAPE, ESCAPE_MASK, FLAG};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

/// Decoder counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CodecStats {
    /// Frames that passed the checksum
    pub frames_decoded: u64,
    /// Frames encoded for transmission
    pub frames_encoded: u64,
    /// Frames dropped by checksum verification (or aborted by a stray escape)
    pub crc_errors: u64,
    /// Accumulations discarded for exceeding the maximum frame size
    pub oversize_errors: u64,
}

/// Byte-stream producer for one encoded frame.
///
/// Call [`fill`](Self::fill) repeatedly until [`remaining`](Self::remaining)
/// reports zero; partial draining supports transports that accept fewer bytes
/// than offered.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    wire: Bytes,
    pos: usize,
}

impl FrameEncoder {
    /// Copy as many pending bytes as fit into `out`, returning the count
    pub fn fill(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.wire[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Bytes still to be drained
    pub fn remaining(&self) -> usize {
        self.wire.len() - self.pos
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Total encoded length including both delimiters
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }
}

/// Streaming decoder plus one-shot encoder sharing a checksum configuration
#[derive(Debug)]
pub struct FrameCodec {
    fcs: Fcs,
    max_frame: usize,
    rx: BytesMut,
    rx_escape: bool,
    rx_discard: bool,
    stats: CodecStats,
}

impl FrameCodec {
    /// Create a codec accepting unescaped frames of up to `max_frame` bytes
    /// (header + payload, FCS excluded)
    pub fn new(checksum: ChecksumMode, max_frame: usize) -> Self {
        Self::with_algorithms(checksum, FcsAlgorithms::default(), max_frame)
    }

    pub fn with_algorithms(
        checksum: ChecksumMode,
        algorithms: FcsAlgorithms,
        max_frame: usize,
    ) -> Self {
        let fcs = Fcs::with_algorithms(checksum, algorithms);
        let limit = max_frame + fcs.width();
        Self {
            fcs,
            max_frame: limit,
            rx: BytesMut::with_capacity(limit),
            rx_escape: false,
            rx_discard: false,
            stats: CodecStats::default(),
        }
    }

    pub fn checksum(&self) -> ChecksumMode {
        self.fcs.mode()
    }

    pub fn stats(&self) -> &CodecStats {
        &self.stats
    }

    /// Encode `header` + `payload` into a drainable wire frame
    pub fn encode(&mut self, header: &[u8], payload: &[u8]) -> FrameEncoder {
        let trailer = self.fcs.trailer(&[header, payload]);
        let trailer = &trailer[..self.fcs.width()];

        // Worst case every byte is escaped
        let body_len = header.len() + payload.len() + trailer.len();
        let mut wire = BytesMut::with_capacity(body_len * 2 + 2);
        wire.put_u8(FLAG);
        for &byte in header.iter().chain(payload).chain(trailer) {
            if byte == FLAG || byte == ESCAPE {
                wire.put_u8(ESCAPE);
                wire.put_u8(byte ^ ESCAPE_MASK);
            } else {
                wire.put_u8(byte);
            }
        }
        wire.put_u8(FLAG);

        self.stats.frames_encoded += 1;
        FrameEncoder {
            wire: wire.freeze(),
            pos: 0,
        }
    }

    /// Feed received bytes, returning every frame completed by them.
    ///
    /// Returned frames have been de-escaped and checksum-verified; the FCS is
    /// stripped. Corrupted and oversized frames are dropped and counted.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();

        for &byte in data {
            match byte {
                FLAG => {
                    if let Some(frame) = self.end_of_frame() {
                        frames.push(frame);
                    }
                }
                _ if self.rx_discard => {}
                ESCAPE if !self.rx_escape => self.rx_escape = true,
                _ => {
                    let byte = if self.rx_escape {
                        self.rx_escape = false;
                        byte ^ ESCAPE_MASK
                    } else {
                        byte
                    };

                    if self.rx.len() >= self.max_frame {
                        warn!(
                            limit = self.max_frame,
                            "Oversize frame discarded"
                        );
                        self.stats.oversize_errors += 1;
                        self.rx.clear();
                        self.rx_discard = true;
                        continue;
                    }
                    self.rx.put_u8(byte);
                }
            }
        }

        frames
    }

    /// Drop any partially accumulated frame
    pub fn reset_rx(&mut self) {
        self.rx.clear();
        self.rx_escape = false;
        self.rx_discard = false;
    }

    fn end_of_frame(&mut self) -> Option<Bytes> {
        if self.rx_discard {
            self.reset_rx();
            return None;
        }

        if self.rx_escape {
            debug!(len = self.rx.len(), "Frame aborted by escape before delimiter");
            self.stats.crc_errors += 1;
            self.reset_rx();
            return None;
        }

        // Back-to-back delimiters: idle fill / resync
        if self.rx.is_empty() {
            return None;
        }

        let mut raw = self.rx.split();
        let verified = self.fcs.verify(&raw).map(<[u8]>::len);
        match verified {
            Some(body_len) if body_len > 0 => {
                raw.truncate(body_len);
                self.stats.frames_decoded += 1;
                trace!(len = body_len, "Frame decoded");
                Some(raw.freeze())
            }
            _ => {
                debug!(len = raw.len(), "Frame dropped: checksum mismatch");
                self.stats.crc_errors += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut enc: FrameEncoder) -> Vec<u8> {
        let mut out = vec![0u8; enc.remaining()];
        let n = enc.fill(&mut out);
        assert_eq!(n, out.len());
        assert!(enc.is_done());
        out
    }

    #[test]
    fn test_escapes_reserved_bytes() {
        let mut codec = FrameCodec::new(ChecksumMode::Off, 64);
        let wire = drain(codec.encode(&[0x7E], &[0x7D, 0x01]));
        assert_eq!(wire, vec![FLAG, ESCAPE, 0x5E, ESCAPE, 0x5D, 0x01, FLAG]);
    }

    #[test]
    fn test_roundtrip_with_reserved_bytes() {
        let mut tx = FrameCodec::new(ChecksumMode::Crc16, 64);
        let mut rx = FrameCodec::new(ChecksumMode::Crc16, 64);
        let payload = [0x7E, 0x7D, 0x7E, 0x00, 0xFF, 0x5E, 0x5D];

        let frames = rx.feed(&drain(tx.encode(&[0xFF, 0x00], &payload)));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..2], &[0xFF, 0x00]);
        assert_eq!(&frames[0][2..], &payload);
    }

    #[test]
    fn test_partial_fill() {
        let mut codec = FrameCodec::new(ChecksumMode::Crc32, 64);
        let mut enc = codec.encode(&[1, 2], b"partial writes");
        let total = enc.wire_len();

        let mut collected = Vec::new();
        let mut chunk = [0u8; 3];
        loop {
            let n = enc.fill(&mut chunk);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(collected.len(), total);

        let mut rx = FrameCodec::new(ChecksumMode::Crc32, 64);
        // Feed one byte at a time
        let frames: Vec<_> = collected.iter().flat_map(|b| rx.feed(&[*b])).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][2..], b"partial writes");
    }

    #[test]
    fn test_idle_delimiters_ignored() {
        let mut codec = FrameCodec::new(ChecksumMode::Crc8, 64);
        assert!(codec.feed(&[FLAG, FLAG, FLAG]).is_empty());
        assert_eq!(codec.stats().crc_errors, 0);
    }

    #[test]
    fn test_checksum_mismatch_is_dropped_and_resyncs() {
        let mut tx = FrameCodec::new(ChecksumMode::Crc16, 64);
        let mut rx = FrameCodec::new(ChecksumMode::Crc16, 64);

        let mut bad = drain(tx.encode(&[0xFF, 0x00], b"first"));
        bad[4] ^= 0x40;
        let good = drain(tx.encode(&[0xFF, 0x00], b"second"));

        let mut stream = bad;
        stream.extend_from_slice(&good);
        let frames = rx.feed(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][2..], b"second");
        assert_eq!(rx.stats().crc_errors, 1);
    }

    #[test]
    fn test_oversize_discarded() {
        let mut tx = FrameCodec::new(ChecksumMode::Crc16, 128);
        let mut rx = FrameCodec::new(ChecksumMode::Crc16, 8);

        let big = drain(tx.encode(&[0xFF, 0x00], &[0x11; 40]));
        let small = drain(tx.encode(&[0xFF, 0x00], b"ok"));

        assert!(rx.feed(&big).is_empty());
        assert_eq!(rx.stats().oversize_errors, 1);

        let frames = rx.feed(&small);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][2..], b"ok");
    }

    #[test]
    fn test_garbage_before_frame() {
        let mut tx = FrameCodec::new(ChecksumMode::Crc8, 64);
        let mut rx = FrameCodec::new(ChecksumMode::Crc8, 64);

        let mut stream = vec![0x13, 0x37, 0x42];
        stream.extend_from_slice(&drain(tx.encode(&[0xFF, 0x00], b"after noise")));
        let frames = rx.feed(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][2..], b"after noise");
        assert_eq!(rx.stats().crc_errors, 1);
    }

    #[test]
    fn test_escape_then_flag_aborts() {
        let mut rx = FrameCodec::new(ChecksumMode::Off, 64);
        assert!(rx.feed(&[FLAG, 0x01, ESCAPE, FLAG]).is_empty());
        assert_eq!(rx.stats().crc_errors, 1);

        let frames = rx.feed(&[0x01, 0x02, FLAG]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x01, 0x02]);
    }
}
