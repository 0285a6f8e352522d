//! Abstract byte-stream transport for tinylink
//!
//! The [`Transport`] trait lets a session run over any blocking byte pipe
//! with timeouts: a UART, a USB CDC port, or an in-memory loopback. Reads
//! and writes may be called concurrently from the two pump threads, so both
//! take `&self`.

use bytes::{Buf, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Blocking byte transport used by [`Session`](crate::session::Session).
pub trait Transport: Send + Sync + 'static {
    /// Read available bytes into `buf`, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write a prefix of `buf`, waiting at most `timeout` for room.
    ///
    /// Short writes are allowed; `Ok(0)` means the transport stayed busy.
    fn write_timeout(&self, buf: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Release the underlying device
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LoopbackTransport — in-memory full-duplex pipe
// ---------------------------------------------------------------------------

const PIPE_CAPACITY: usize = 4096;

#[derive(Default)]
struct PipeState {
    data: BytesMut,
    closed: bool,
}

/// One direction of a loopback pair
#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    changed: Condvar,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }
}

/// In-memory byte pipe connecting two sessions in one process.
///
/// Closing either end closes both directions; later reads and writes fail
/// with `BrokenPipe` once buffered data is drained.
pub struct LoopbackTransport {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    chunk_limit: Option<usize>,
}

impl LoopbackTransport {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        (
            Self {
                rx: Arc::clone(&b_to_a),
                tx: Arc::clone(&a_to_b),
                chunk_limit: None,
            },
            Self {
                rx: a_to_b,
                tx: b_to_a,
                chunk_limit: None,
            },
        )
    }

    /// Accept at most `limit` bytes per write, forcing short writes
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = Some(limit.max(1));
        self
    }

    /// Bytes written by this end that the peer has not read yet
    pub fn in_flight(&self) -> usize {
        self.tx.lock().data.len()
    }
}

impl Transport for LoopbackTransport {
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let state = self.rx.lock();
        let (mut state, _) = self
            .rx
            .changed
            .wait_timeout_while(state, timeout, |s| s.data.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if state.data.is_empty() {
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback closed"));
            }
            return Ok(0);
        }

        let n = buf.len().min(state.data.len());
        buf[..n].copy_from_slice(&state.data[..n]);
        state.data.advance(n);
        self.rx.changed.notify_all();
        Ok(n)
    }

    fn write_timeout(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        let state = self.tx.lock();
        let (mut state, _) = self
            .tx
            .changed
            .wait_timeout_while(state, timeout, |s| {
                s.data.len() >= PIPE_CAPACITY && !s.closed
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback closed"));
        }

        let room = PIPE_CAPACITY.saturating_sub(state.data.len());
        let n = buf
            .len()
            .min(room)
            .min(self.chunk_limit.unwrap_or(usize::MAX));
        state.data.extend_from_slice(&buf[..n]);
        self.tx.changed.notify_all();
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        self.rx.close();
        self.tx.close();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FaultyTransport — fault-injecting wrapper for tests
// ---------------------------------------------------------------------------

/// Fault rates applied per write, each in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Discard the whole write while reporting success
    pub drop_rate: f64,
    /// Flip one bit of one byte
    pub corrupt_rate: f64,
    /// Write the data twice
    pub duplicate_rate: f64,
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0x5EED,
        }
    }
}

impl FaultConfig {
    pub fn drop_rate(mut self, rate: f64) -> Self {
        if (0.0..=1.0).contains(&rate) {
            self.drop_rate = rate;
        }
        self
    }

    pub fn corrupt_rate(mut self, rate: f64) -> Self {
        if (0.0..=1.0).contains(&rate) {
            self.corrupt_rate = rate;
        }
        self
    }

    pub fn duplicate_rate(mut self, rate: f64) -> Self {
        if (0.0..=1.0).contains(&rate) {
            self.duplicate_rate = rate;
        }
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Counts of injected faults
#[derive(Debug, Default)]
pub struct FaultStats {
    pub dropped: AtomicU64,
    pub corrupted: AtomicU64,
    pub duplicated: AtomicU64,
}

/// Wraps a transport and damages outgoing writes with a seeded RNG.
///
/// Reads pass through untouched; wrap both ends to damage both directions.
pub struct FaultyTransport<T> {
    inner: T,
    faults: FaultConfig,
    rng: Mutex<StdRng>,
    stats: FaultStats,
}

impl<T: Transport> FaultyTransport<T> {
    pub fn new(inner: T, faults: FaultConfig) -> Self {
        Self {
            inner,
            rng: Mutex::new(StdRng::seed_from_u64(faults.seed)),
            faults,
            stats: FaultStats::default(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn stats(&self) -> &FaultStats {
        &self.stats
    }
}

impl<T: Transport> Transport for FaultyTransport<T> {
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.inner.read_timeout(buf, timeout)
    }

    fn write_timeout(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        if rng.gen::<f64>() < self.faults.drop_rate {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(len = buf.len(), "Injected drop");
            return Ok(buf.len());
        }

        if rng.gen::<f64>() < self.faults.corrupt_rate {
            let mut damaged = buf.to_vec();
            let index = rng.gen_range(0..damaged.len());
            damaged[index] ^= 1u8 << rng.gen_range(0..8u32);
            drop(rng);
            self.stats.corrupted.fetch_add(1, Ordering::Relaxed);
            trace!(index, "Injected corruption");
            return self.inner.write_timeout(&damaged, timeout);
        }

        let duplicate = rng.gen::<f64>() < self.faults.duplicate_rate;
        drop(rng);

        let n = self.inner.write_timeout(buf, timeout)?;
        if duplicate && n > 0 {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            trace!(len = n, "Injected duplicate");
            let _ = self.inner.write_timeout(&buf[..n], timeout)?;
        }
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }
}

// ---------------------------------------------------------------------------
// SerialTransport — hardware UART via the `serialport` crate
// ---------------------------------------------------------------------------

#[cfg(feature = "serial")]
mod serial {
    use super::*;
    use serialport::SerialPort;
    use std::io::{Read, Write};

    fn lock_failed() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "serial port lock poisoned")
    }

    /// [`Transport`] over an OS serial device.
    ///
    /// The port is cloned into independent reader and writer handles so the
    /// two pump threads never contend.
    pub struct SerialTransport {
        reader: Mutex<Box<dyn SerialPort>>,
        writer: Mutex<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        /// Open `path` (e.g. `/dev/ttyUSB0` or `COM3`) at `baud_rate`, 8N1.
        pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
            let reader = serialport::new(path, baud_rate)
                .timeout(Duration::from_millis(10))
                .open()
                .map_err(io::Error::from)?;
            let writer = reader.try_clone().map_err(io::Error::from)?;
            Ok(Self::from_port(reader, writer))
        }

        /// Wrap already opened reader and writer handles of the same port
        pub fn from_port(reader: Box<dyn SerialPort>, writer: Box<dyn SerialPort>) -> Self {
            Self {
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
            }
        }
    }

    impl Transport for SerialTransport {
        fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
            let mut port = self.reader.lock().map_err(|_| lock_failed())?;
            port.set_timeout(timeout.max(Duration::from_millis(1)))
                .map_err(io::Error::from)?;
            match port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e),
            }
        }

        fn write_timeout(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
            let mut port = self.writer.lock().map_err(|_| lock_failed())?;
            port.set_timeout(timeout.max(Duration::from_millis(1)))
                .map_err(io::Error::from)?;
            match port.write(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e),
            }
        }

        fn close(&self) -> io::Result<()> {
            let mut port = self.writer.lock().map_err(|_| lock_failed())?;
            port.flush()
        }
    }
}

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_pair() {
        let (a, b) = LoopbackTransport::pair();
        assert_eq!(a.write_timeout(b"ping", Duration::ZERO).unwrap(), 4);
        assert_eq!(a.in_flight(), 4);

        let mut buf = [0u8; 16];
        let n = b.read_timeout(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], b"ping");

        // Nothing in the other direction
        assert_eq!(a.read_timeout(&mut buf, Duration::from_millis(1)).unwrap(), 0);
    }

    #[test]
    fn test_loopback_chunk_limit() {
        let (a, b) = LoopbackTransport::pair();
        let a = a.with_chunk_limit(3);
        assert_eq!(a.write_timeout(b"abcdef", Duration::ZERO).unwrap(), 3);

        let mut buf = [0u8; 16];
        let n = b.read_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], b"abc");
    }

    #[test]
    fn test_loopback_full_pipe_times_out() {
        let (a, _b) = LoopbackTransport::pair();
        let big = vec![0u8; PIPE_CAPACITY];
        assert_eq!(a.write_timeout(&big, Duration::ZERO).unwrap(), PIPE_CAPACITY);
        assert_eq!(a.write_timeout(b"x", Duration::from_millis(5)).unwrap(), 0);
    }

    #[test]
    fn test_loopback_close() {
        let (a, b) = LoopbackTransport::pair();
        a.write_timeout(b"last", Duration::ZERO).unwrap();
        a.close().unwrap();

        // Buffered data is still readable
        let mut buf = [0u8; 8];
        assert_eq!(b.read_timeout(&mut buf, Duration::ZERO).unwrap(), 4);

        let err = b.read_timeout(&mut buf, Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(b.write_timeout(b"x", Duration::ZERO).is_err());
    }

    #[test]
    fn test_faulty_drop_all() {
        let (a, b) = LoopbackTransport::pair();
        let faulty = FaultyTransport::new(a, FaultConfig::default().drop_rate(1.0));

        assert_eq!(faulty.write_timeout(b"gone", Duration::ZERO).unwrap(), 4);
        assert_eq!(faulty.stats().dropped.load(Ordering::Relaxed), 1);

        let mut buf = [0u8; 8];
        assert_eq!(b.read_timeout(&mut buf, Duration::from_millis(1)).unwrap(), 0);
    }

    #[test]
    fn test_faulty_corrupts_one_bit() {
        let (a, b) = LoopbackTransport::pair();
        let faulty = FaultyTransport::new(a, FaultConfig::default().corrupt_rate(1.0));

        let original = [0u8; 8];
        faulty.write_timeout(&original, Duration::ZERO).unwrap();

        let mut buf = [0u8; 8];
        let n = b.read_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(n, 8);
        let flipped: u32 = buf.iter().map(|byte| byte.count_ones()).sum();
        assert_eq!(flipped, 1);
    }

    #[test]
    fn test_faulty_duplicates() {
        let (a, b) = LoopbackTransport::pair();
        let faulty = FaultyTransport::new(a, FaultConfig::default().duplicate_rate(1.0));

        faulty.write_timeout(b"ab", Duration::ZERO).unwrap();
        let mut buf = [0u8; 8];
        let n = b.read_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], b"abab");
    }

    #[test]
    fn test_invalid_rate_ignored() {
        let faults = FaultConfig::default().drop_rate(1.5);
        assert_eq!(faults.drop_rate, 0.0);
    }
}
