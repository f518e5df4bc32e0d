use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

/// Fixed-size buffer recycler shared between producers and consumers.
///
/// `acquire` never fails: once more than `cap` buffers are in flight the pool
/// spills to fresh heap allocations, and `release` drops buffers it has no
/// room to retain.
pub(crate) struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_len: usize,
    cap: usize,
    in_flight: AtomicUsize,
}

impl BufferPool {
    pub(crate) fn new(buf_len: usize, cap: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(cap)),
            buf_len,
            cap,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn acquire(&self) -> Vec<u8> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::Relaxed);
        if let Some(buf) = self.free.lock().pop() {
            return buf;
        }
        if in_flight >= self.cap {
            debug!(in_flight, cap = self.cap, "pool.spill");
        }
        Vec::with_capacity(self.buf_len)
    }

    pub(crate) fn release(&self, mut buf: Vec<u8>) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.cap {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BufferPool;

    #[test]
    fn recycles_released_buffers() {
        let pool = BufferPool::new(64, 2);
        let mut a = pool.acquire();
        a.extend_from_slice(b"xyz");
        let ptr = a.as_ptr();
        pool.release(a);
        let b = pool.acquire();
        assert_eq!(b.as_ptr(), ptr);
        assert!(b.is_empty());
    }

    #[test]
    fn spills_past_capacity() {
        let pool = BufferPool::new(16, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free.lock().len(), 1);
    }
}
