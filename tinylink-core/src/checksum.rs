//! Frame check sequence strategies
//!
//! The FCS is computed over address, control and payload before escaping,
//! and appended little-endian. The 16- and 32-bit polynomials default to the
//! HDLC ones from RFC 1662 but can be swapped through [`FcsAlgorithms`].

use crc::{Algorithm, Crc, CRC_16_IBM_SDLC, CRC_32_ISO_HDLC, CRC_8_SMBUS};
use std::fmt;

/// Checksum mode, fixed for the life of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumMode {
    /// No FCS; corruption is never detected
    Off,
    Crc8,
    #[default]
    Crc16,
    Crc32,
}

impl ChecksumMode {
    /// FCS width in bytes
    pub fn width(self) -> usize {
        match self {
            ChecksumMode::Off => 0,
            ChecksumMode::Crc8 => 1,
            ChecksumMode::Crc16 => 2,
            ChecksumMode::Crc32 => 4,
        }
    }

    /// Parse the conventional bit-width notation (0, 8, 16, 32)
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(ChecksumMode::Off),
            8 => Some(ChecksumMode::Crc8),
            16 => Some(ChecksumMode::Crc16),
            32 => Some(ChecksumMode::Crc32),
            _ => None,
        }
    }
}

/// CRC parameter sets used for each checksum width
#[derive(Clone, Copy)]
pub struct FcsAlgorithms {
    pub crc8: &'static Algorithm<u8>,
    pub crc16: &'static Algorithm<u16>,
    pub crc32: &'static Algorithm<u32>,
}

impl Default for FcsAlgorithms {
    fn default() -> Self {
        Self {
            crc8: &CRC_8_SMBUS,
            crc16: &CRC_16_IBM_SDLC,
            crc32: &CRC_32_ISO_HDLC,
        }
    }
}

impl fmt::Debug for FcsAlgorithms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcsAlgorithms")
            .field("crc8_poly", &format_args!("{:#04x}", self.crc8.poly))
            .field("crc16_poly", &format_args!("{:#06x}", self.crc16.poly))
            .field("crc32_poly", &format_args!("{:#010x}", self.crc32.poly))
            .finish()
    }
}

enum Engine {
    Off,
    Crc8(Crc<u8>),
    Crc16(Crc<u16>),
    Crc32(Crc<u32>),
}

/// Computes and verifies the frame check sequence for one checksum mode
pub struct Fcs {
    mode: ChecksumMode,
    engine: Engine,
}

impl Fcs {
    /// FCS with the default polynomials
    pub fn new(mode: ChecksumMode) -> Self {
        Self::with_algorithms(mode, FcsAlgorithms::default())
    }

    pub fn with_algorithms(mode: ChecksumMode, algorithms: FcsAlgorithms) -> Self {
        let engine = match mode {
            ChecksumMode::Off => Engine::Off,
            ChecksumMode::Crc8 => Engine::Crc8(Crc::<u8>::new(algorithms.crc8)),
            ChecksumMode::Crc16 => Engine::Crc16(Crc::<u16>::new(algorithms.crc16)),
            ChecksumMode::Crc32 => Engine::Crc32(Crc::<u32>::new(algorithms.crc32)),
        };
        Self { mode, engine }
    }

    pub fn mode(&self) -> ChecksumMode {
        self.mode
    }

    /// FCS width in bytes
    pub fn width(&self) -> usize {
        self.mode.width()
    }

    /// Compute the FCS over the concatenation of `parts`
    pub fn compute(&self, parts: &[&[u8]]) -> u32 {
        match &self.engine {
            Engine::Off => 0,
            Engine::Crc8(crc) => {
                let mut digest = crc.digest();
                parts.iter().for_each(|p| digest.update(p));
                u32::from(digest.finalize())
            }
            Engine::Crc16(crc) => {
                let mut digest = crc.digest();
                parts.iter().for_each(|p| digest.update(p));
                u32::from(digest.finalize())
            }
            Engine::Crc32(crc) => {
                let mut digest = crc.digest();
                parts.iter().for_each(|p| digest.update(p));
                digest.finalize()
            }
        }
    }

    /// Little-endian FCS bytes for `parts`; only the first `width()` bytes are meaningful
    pub fn trailer(&self, parts: &[&[u8]]) -> [u8; 4] {
        self.compute(parts).to_le_bytes()
    }

    /// Check the trailing FCS of `frame` and return the body without it.
    ///
    /// Returns `None` when the frame is shorter than the FCS or the check fails.
    pub fn verify<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        let width = self.width();
        if frame.len() < width {
            return None;
        }
        let (body, fcs) = frame.split_at(frame.len() - width);
        let expected = self.trailer(&[body]);
        (fcs == &expected[..width]).then_some(body)
    }
}

impl fmt::Debug for Fcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fcs").field("mode", &self.mode).finish()
    }
}
