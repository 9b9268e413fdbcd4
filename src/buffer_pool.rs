use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Thread-safe pool of read buffers.
///
/// Every readable event borrows a scratch buffer from here instead of
/// allocating; the buffer goes back to the pool when the guard drops. Buffers
/// are created lazily once the pool runs dry, and returns beyond the pool's
/// capacity are simply dropped.
#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
    buffer_size: usize,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let mut pool = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            pool.push_back(vec![0; buffer_size]);
        }

        Self {
            pool: Arc::new(Mutex::new(pool)),
            buffer_size,
            capacity,
        }
    }

    /// Borrows a zero-filled buffer of `buffer_size` bytes.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = {
            let mut pool = self.pool.lock().unwrap();
            pool.pop_front()
        };

        let mut buf = buf.unwrap_or_else(|| vec![0; self.buffer_size]);
        buf.clear();
        buf.resize(self.buffer_size, 0);

        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(&self.pool),
            capacity: self.capacity,
        }
    }

    /// Approximate number of buffers currently resting in the pool.
    pub fn available(&self) -> usize {
        self.pool.lock().unwrap().len()
    }
}

/// Guard that returns its buffer to the pool on drop.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
    capacity: usize,
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("PooledBuffer is empty")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("PooledBuffer is empty")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut pool = self.pool.lock().unwrap();
            if pool.len() < self.capacity {
                pool.push_back(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused() {
        let pool = BufferPool::new(1, 1024);

        let buf1 = pool.acquire();
        let ptr1 = buf1.as_ptr();
        drop(buf1);

        let buf2 = pool.acquire();
        assert_eq!(ptr1, buf2.as_ptr(), "pool should hand back the same allocation");
    }

    #[test]
    fn pool_grows_past_initial_size() {
        let pool = BufferPool::new(1, 64);

        let _a = pool.acquire();
        let _b = pool.acquire();
        let _c = pool.acquire();
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn returns_are_capped_at_capacity() {
        let pool = BufferPool::new(2, 64);

        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        drop(a);
        drop(b);
        drop(c);

        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn acquired_buffers_are_reset() {
        let pool = BufferPool::new(1, 16);

        {
            let mut buf = pool.acquire();
            buf[0] = 0xff;
        }

        let buf = pool.acquire();
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[0], 0);
    }
}
