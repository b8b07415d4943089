//! Bounded pool of stream buffers for aligned segment reads.
//!
//! The pool caps the memory used by concurrent segment streams. When every
//! buffer is borrowed, further callers block until one is returned, so
//! exhaustion shows up as backpressure rather than failure.
//!
//! Every buffer starts on an address that is a multiple of the pool's
//! alignment, so reads into it satisfy `O_DIRECT`.

use crate::config::DatalogConfig;
use parking_lot::{Condvar, Mutex};
use seglog_chunk::DEFAULT_ALIGNMENT_SIZE;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// Number of buffers in a pool built from a [`DatalogConfig`].
pub const STREAM_BUFFER_COUNT: usize = 2;

/// Each pooled buffer is this fraction of the configured stream buffer size.
pub const STREAM_BUFFER_FRACTION: usize = 16;

/// Zeroed memory whose usable window starts on an aligned address.
///
/// The backing vector is over-allocated by `alignment - 1` bytes and never
/// grows, so the window stays put for the buffer's lifetime.
struct AlignedBuf {
    data: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    fn new(len: usize, alignment: usize) -> Self {
        let data = vec![0u8; len + alignment - 1];
        let offset = data.as_ptr().align_offset(alignment);
        Self { data, offset, len }
    }

    fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.offset..self.offset + self.len]
    }
}

struct PoolInner {
    free: Mutex<Vec<AlignedBuf>>,
    available: Condvar,
    count: usize,
    buffer_capacity: usize,
    alignment: usize,
}

impl PoolInner {
    fn put(&self, data: AlignedBuf) {
        self.free.lock().push(data);
        self.available.notify_one();
    }
}

/// Fixed-size freelist of equally sized, aligned byte buffers.
///
/// Cloning the pool is cheap and shares the same buffers.
#[derive(Clone)]
pub struct StreamBufferPool {
    inner: Arc<PoolInner>,
}

impl StreamBufferPool {
    /// Creates a pool of `count` zeroed buffers of `buffer_capacity` bytes,
    /// aligned to [`DEFAULT_ALIGNMENT_SIZE`].
    #[must_use]
    pub fn new(count: usize, buffer_capacity: usize) -> Self {
        Self::with_alignment(count, buffer_capacity, DEFAULT_ALIGNMENT_SIZE)
    }

    /// Creates a pool whose buffers start on multiples of `alignment`.
    ///
    /// `alignment` is rounded up to a power of two.
    #[must_use]
    pub fn with_alignment(count: usize, buffer_capacity: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1).next_power_of_two();
        let free = (0..count)
            .map(|_| AlignedBuf::new(buffer_capacity, alignment))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                available: Condvar::new(),
                count,
                buffer_capacity,
                alignment,
            }),
        }
    }

    /// Creates the pool sized and aligned for `config`.
    #[must_use]
    pub fn from_config(config: &DatalogConfig) -> Self {
        Self::with_alignment(
            STREAM_BUFFER_COUNT,
            config.stream_buffer_capacity(),
            config.alignment_size,
        )
    }

    /// Borrows a buffer, blocking the calling thread until one is free.
    #[must_use]
    pub fn acquire(&self) -> StreamBuffer {
        let mut free = self.inner.free.lock();
        loop {
            if let Some(data) = free.pop() {
                return self.wrap(data);
            }
            self.inner.available.wait(&mut free);
        }
    }

    /// Borrows a buffer if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<StreamBuffer> {
        let data = self.inner.free.lock().pop()?;
        Some(self.wrap(data))
    }

    /// Borrows a buffer, waiting at most `timeout` for one to be returned.
    #[must_use]
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<StreamBuffer> {
        let mut free = self.inner.free.lock();
        if free.is_empty() {
            let _ = self
                .inner
                .available
                .wait_while_for(&mut free, |free| free.is_empty(), timeout);
        }
        let data = free.pop()?;
        Some(self.wrap(data))
    }

    /// Returns a buffer to the pool. Dropping the buffer does the same.
    pub fn release(&self, buffer: StreamBuffer) {
        drop(buffer);
    }

    /// Number of buffers currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Total number of buffers owned by the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.count
    }

    /// Size in bytes of every buffer.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    /// Address alignment of every buffer.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.inner.alignment
    }

    fn wrap(&self, data: AlignedBuf) -> StreamBuffer {
        StreamBuffer {
            data: Some(data),
            pool: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for StreamBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBufferPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("buffer_capacity", &self.buffer_capacity())
            .field("alignment", &self.alignment())
            .finish()
    }
}

/// A buffer borrowed from a [`StreamBufferPool`].
///
/// Goes back to the pool exactly once, when dropped.
pub struct StreamBuffer {
    data: Option<AlignedBuf>,
    pool: Arc<PoolInner>,
}

impl Deref for StreamBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_ref().map_or(&[][..], AlignedBuf::as_slice)
    }
}

impl DerefMut for StreamBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self.data.as_mut() {
            Some(data) => data.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.put(data);
        }
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn pool_from_config() {
        let config = DatalogConfig::default().with_stream_buffer_size(16 * 4096);
        let pool = StreamBufferPool::from_config(&config);
        assert_eq!(pool.capacity(), STREAM_BUFFER_COUNT);
        assert_eq!(pool.available(), STREAM_BUFFER_COUNT);
        assert_eq!(pool.buffer_capacity(), 4096);
    }

    #[test]
    fn pool_from_config_is_aligned() {
        let config = DatalogConfig::default()
            .with_alignment_size(4096)
            .with_stream_buffer_size(16 * 8192);
        let pool = StreamBufferPool::from_config(&config);
        assert_eq!(pool.alignment(), 4096);
        let buffers: Vec<_> = (0..pool.capacity()).map(|_| pool.acquire()).collect();
        for buf in &buffers {
            assert_eq!(buf.as_ptr() as usize % 4096, 0);
            assert_eq!(buf.len(), 8192);
        }
    }

    #[test]
    fn alignment_is_rounded_to_power_of_two() {
        let pool = StreamBufferPool::with_alignment(1, 100, 48);
        assert_eq!(pool.alignment(), 64);
        assert_eq!(pool.acquire().as_ptr() as usize % 64, 0);
    }

    #[test]
    fn acquire_and_release() {
        let pool = StreamBufferPool::new(2, 1024);

        let a = pool.acquire();
        assert_eq!(a.len(), 1024);
        assert_eq!(pool.available(), 1);

        let b = pool.try_acquire().unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().is_none());

        pool.release(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn buffers_keep_their_contents_and_size() {
        let pool = StreamBufferPool::new(1, 64);
        {
            let mut buf = pool.acquire();
            buf[..4].copy_from_slice(b"abcd");
        }
        let buf = pool.acquire();
        assert_eq!(buf.len(), 64);
        assert_eq!(&buf[..4], b"abcd");
    }

    #[test]
    fn live_borrows_are_distinct() {
        let pool = StreamBufferPool::new(4, 128);
        let borrowed: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        let ptrs: HashSet<_> = borrowed.iter().map(|b| b.as_ptr() as usize).collect();
        assert_eq!(ptrs.len(), 4);
    }

    #[test]
    fn acquire_timeout_expires_when_exhausted() {
        let pool = StreamBufferPool::new(1, 16);
        let _held = pool.acquire();
        assert!(pool.acquire_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn extra_acquire_blocks_until_release() {
        let pool = StreamBufferPool::new(2, 32);
        let a = pool.acquire();
        let _b = pool.acquire();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let buf = pool.acquire();
                tx.send(()).unwrap();
                drop(buf);
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(a);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn concurrent_borrows_never_exceed_capacity() {
        let pool = StreamBufferPool::new(3, 64);
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let owners = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                let owners = Arc::clone(&owners);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let buf = pool.acquire();
                        let ptr = buf.as_ptr() as usize;
                        assert!(owners.lock().insert(ptr), "buffer handed out twice");

                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        live.fetch_sub(1, Ordering::SeqCst);

                        owners.lock().remove(&ptr);
                        drop(buf);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }
}
