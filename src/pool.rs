//! Process-wide pool of byte buffers in power-of-two size classes.
//!
//! `rent` returns a guard whose drop gives the buffer back; the slot is
//! taken at most once, so a guard can never double-return. The pool is
//! bounded per class and drops buffers on overflow, degrading to plain
//! allocation.

use std::{
    ops::{
        Deref,
        DerefMut,
    },
    sync::Mutex,
};

const MIN_CLASS_SHIFT: usize = 8; // 256 B
const MAX_CLASS_SHIFT: usize = 20; // 1 MiB
const CLASS_COUNT: usize = MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1;
const PER_CLASS_CAP: usize = 8;

static GLOBAL: BufferPool = BufferPool::new();

/// A bounded pool of reusable `Vec<u8>` buffers.
pub struct BufferPool {
    classes: [Mutex<Vec<Vec<u8>>>; CLASS_COUNT],
}

impl BufferPool {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            classes: [const { Mutex::new(Vec::new()) }; CLASS_COUNT],
        }
    }

    /// The process-wide pool.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Rents a buffer with capacity of at least `min_size` bytes. The
    /// returned buffer is empty; contents of recycled buffers are not
    /// zeroed.
    pub fn rent(&'static self, min_size: usize) -> PooledBuf {
        let class = size_class(min_size);
        let recycled = match self.classes[class].lock() {
            Ok(mut slot) => slot.pop(),
            Err(_) => None,
        };
        let buf =
            recycled.unwrap_or_else(|| Vec::with_capacity(1 << (class + MIN_CLASS_SHIFT)));
        PooledBuf {
            buf: Some(buf),
            pool: self,
        }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        let capacity = buf.capacity();
        if capacity < (1 << MIN_CLASS_SHIFT) || capacity > (1 << MAX_CLASS_SHIFT) {
            return;
        }
        // length is reset, contents are left as-is
        buf.clear();
        let class = capacity.ilog2() as usize - MIN_CLASS_SHIFT;
        if let Ok(mut slot) = self.classes[class].lock() {
            if slot.len() < PER_CLASS_CAP {
                slot.push(buf);
            }
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

fn size_class(min_size: usize) -> usize {
    let size = min_size.max(1 << MIN_CLASS_SHIFT);
    let class = (size.next_power_of_two().ilog2() as usize).saturating_sub(MIN_CLASS_SHIFT);
    class.min(CLASS_COUNT - 1)
}

/// An empty rented buffer. Dropping it returns the buffer to its pool.
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: &'static BufferPool,
}

impl PooledBuf {
    /// Detaches the buffer from the pool; it will be freed normally.
    #[must_use]
    pub fn take(mut self) -> Vec<u8> {
        self.buf.take().unwrap_or_default()
    }
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        // invariant: buf is Some until drop or take
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.as_ref().map_or(0, Vec::len))
            .finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_meets_minimum() {
        let buf = BufferPool::global().rent(1000);
        assert!(buf.capacity() >= 1000);
        assert!(buf.is_empty());
    }

    #[test]
    fn rent_reuses_returned_buffer() {
        let pool = BufferPool::global();
        let mut buf = pool.rent(512);
        buf.extend_from_slice(b"scratch");
        let cap = buf.capacity();
        drop(buf);

        let buf = pool.rent(512);
        assert!(buf.capacity() >= cap.min(512));
        assert!(buf.is_empty());
    }

    #[test]
    fn take_detaches() {
        let mut buf = BufferPool::global().rent(64);
        buf.extend_from_slice(b"kept");
        let v = buf.take();
        assert_eq!(v, b"kept");
    }

    #[test]
    fn oversized_buffers_not_pooled() {
        let pool = BufferPool::global();
        let mut buf = pool.rent(1 << MAX_CLASS_SHIFT);
        buf.reserve((1 << MAX_CLASS_SHIFT) + 1);
        // drop must not panic even though the grown buffer is discarded
        drop(buf);
    }

    #[test]
    fn size_class_boundaries() {
        assert_eq!(size_class(0), 0);
        assert_eq!(size_class(256), 0);
        assert_eq!(size_class(257), 1);
        assert_eq!(size_class(usize::MAX >> 1), CLASS_COUNT - 1);
    }
}
