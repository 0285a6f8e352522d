//! Fixed-size frame buffer pool
//!
//! All buffers are allocated when the pool is built and never grow. The free
//! list is a bounded lock-free queue of index-tagged buffers, so `acquire`
//! never blocks. A [`FrameBuf`] is the sole owner of its buffer; it returns to
//! the pool when released or dropped.

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{LinkCoreError, LinkCoreResult};

struct PoolInner {
    free: ArrayQueue<(usize, BytesMut)>,
    capacity: usize,
    buffer_size: usize,
    exhausted: AtomicU64,
}

/// Shared handle to a fixed arena of equally sized buffers
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Pre-allocate `capacity` buffers of `buffer_size` bytes each
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for index in 0..capacity {
            // Queue was sized for exactly this many entries
            let _ = free.push((index, BytesMut::with_capacity(buffer_size)));
        }

        Self {
            inner: Arc::new(PoolInner {
                free,
                capacity,
                buffer_size,
                exhausted: AtomicU64::new(0),
            }),
        }
    }

    /// Take a free buffer, or `None` if all are owned elsewhere
    pub fn acquire(&self) -> Option<FrameBuf> {
        match self.inner.free.pop() {
            Some((index, mut buf)) => {
                buf.clear();
                Some(FrameBuf {
                    index,
                    buf: Some(buf),
                    pool: Arc::clone(&self.inner),
                })
            }
            None => {
                self.inner.exhausted.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Number of buffers currently free
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Total number of buffers in the arena
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Capacity of each buffer in bytes
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of `acquire` calls that found no free buffer
    pub fn exhausted_count(&self) -> u64 {
        self.inner.exhausted.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

/// A pool-owned buffer with a fixed capacity
pub struct FrameBuf {
    index: usize,
    buf: Option<BytesMut>,
    pool: Arc<PoolInner>,
}

impl FrameBuf {
    /// Slot index inside the arena
    pub fn index(&self) -> usize {
        self.index
    }

    /// Fixed capacity of this buffer
    pub fn capacity(&self) -> usize {
        self.pool.buffer_size
    }

    /// Append `data`, refusing to grow past the buffer capacity
    pub fn put_slice(&mut self, data: &[u8]) -> LinkCoreResult<()> {
        let capacity = self.capacity();
        let buf = self.bytes_mut();
        if buf.len() + data.len() > capacity {
            return Err(LinkCoreError::buffer(format!(
                "{} bytes exceed frame buffer capacity {}",
                buf.len() + data.len(),
                capacity
            )));
        }
        buf.extend_from_slice(data);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.bytes_mut().clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    /// Return the buffer to its pool
    pub fn release(self) {
        drop(self);
    }

    fn bytes_mut(&mut self) -> &mut BytesMut {
        // Only `Drop` takes the buffer out
        self.buf.get_or_insert_with(BytesMut::new)
    }
}

impl Deref for FrameBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for FrameBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuf")
            .field("index", &self.index)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            let returned = self.pool.free.push((self.index, buf));
            debug_assert!(returned.is_ok(), "frame pool over-released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = FramePool::new(3, 16);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.exhausted_count(), 1);

        let mut indices = vec![a.index(), b.index(), c.index()];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_release_returns_buffer() {
        let pool = FramePool::new(1, 16);
        let mut buf = pool.acquire().unwrap();
        buf.put_slice(b"data").unwrap();
        buf.release();
        assert_eq!(pool.available(), 1);

        // Reacquired buffers come back empty
        let buf = pool.acquire().unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drop_returns_buffer() {
        let pool = FramePool::new(2, 16);
        {
            let _a = pool.acquire().unwrap();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_capacity_is_fixed() {
        let pool = FramePool::new(1, 4);
        let mut buf = pool.acquire().unwrap();
        buf.put_slice(b"abc").unwrap();
        assert!(buf.put_slice(b"de").is_err());
        assert_eq!(&buf[..], b"abc");
        buf.put_slice(b"d").unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_buffers_outlive_pool_handle() {
        let pool = FramePool::new(1, 8);
        let buf = pool.acquire().unwrap();
        let clone = pool.clone();
        drop(pool);
        drop(buf);
        assert_eq!(clone.available(), 1);
    }
}
