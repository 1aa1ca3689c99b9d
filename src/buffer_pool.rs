use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::UDP_BYTE_SIZE;

/// A pool of reusable datagram buffers.
///
/// This implementation keeps free buffers on a lock-free [`SegQueue`]. Any thread may take a
/// buffer and any thread may give it back; a [`Buffer`] gives itself back when dropped, so a
/// buffer is released on every exit path of the code holding it, unwinding included.
///
/// Clones share the same free list.
#[derive(Clone, Default)]
pub struct BufferPool {
    free: Arc<SegQueue<Vec<u8>>>,
}

impl BufferPool {
    /// creates an empty pool; buffers are allocated on demand
    pub fn new() -> Self {
        BufferPool::default()
    }

    /// takes a buffer of [`UDP_BYTE_SIZE`] bytes from the pool, allocating one if none is free
    pub fn get(&self) -> Buffer {
        let buf = self.free.pop().unwrap_or_else(|| vec![0; UDP_BYTE_SIZE]);
        Buffer {
            pool: self.clone(),
            buf,
            count: 0,
        }
    }

    /// the number of buffers waiting to be reused
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    fn put(&self, buf: Vec<u8>) {
        self.free.push(buf);
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool").field("idle", &self.idle()).finish()
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// It derefs to the `count` bytes filled by the last receive. [`Buffer::storage`] exposes the
/// whole buffer to receive into.
pub struct Buffer {
    pool: BufferPool,
    buf: Vec<u8>,
    count: usize,
}

impl Buffer {
    /// the full underlying storage, to receive into
    pub fn storage(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// records how many bytes of the storage are filled
    pub fn set_count(&mut self, count: usize) {
        self.count = count.min(self.buf.len());
    }

    /// the number of filled bytes
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.count]
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.count]
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.put(buf);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("count", &self.count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn dropped_buffers_are_reused() {
        let pool = BufferPool::new();
        let mut b = pool.get();
        assert_eq!(b.storage().len(), UDP_BYTE_SIZE);
        b.storage()[..4].copy_from_slice(b"QUIT");
        b.set_count(4);
        assert_eq!(&*b, b"QUIT");
        drop(b);
        assert_eq!(pool.idle(), 1);

        let b = pool.get();
        assert_eq!(pool.idle(), 0);
        assert_eq!(b.count(), 0);
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn buffers_return_on_panic() {
        let pool = BufferPool::new();
        let inner = pool.clone();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(move || {
            let _b = inner.get();
            panic!("worker fault");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn count_is_clamped_to_storage() {
        let pool = BufferPool::new();
        let mut b = pool.get();
        b.set_count(UDP_BYTE_SIZE * 2);
        assert_eq!(b.count(), UDP_BYTE_SIZE);
    }
}
