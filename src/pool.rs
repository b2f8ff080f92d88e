//! Native string buffers handed across the C ABI
//!
//! Each buffer is a heap allocation holding a NUL-terminated UTF-8 string with a
//! stable address for as long as the [`NativeBuffer`] value lives. Buffers are
//! owned values, so a buffer can only be released once.

use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{PresenceError, Result};

/// Default number of buffers kept on the freelist
pub const DEFAULT_POOL_CAPACITY: usize = 50;

/// A NUL-terminated byte buffer owned by Rust and lent to native code
#[derive(Debug)]
pub struct NativeBuffer {
    bytes: Vec<u8>,
}

impl NativeBuffer {
    fn allocate(size: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| PresenceError::AllocationFailed { size })?;
        Ok(Self { bytes })
    }

    /// Replace the contents with `text` followed by a NUL terminator
    ///
    /// Interior NUL bytes end the string early, the same way C reads it.
    pub(crate) fn fill(&mut self, text: &str) -> Result<()> {
        let text = match text.find('\0') {
            Some(end) => &text[..end],
            None => text,
        };
        let needed = text.len() + 1;
        self.bytes.clear();
        self.bytes
            .try_reserve(needed)
            .map_err(|_| PresenceError::AllocationFailed { size: needed })?;
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        Ok(())
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr().cast()
    }

    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.bytes).unwrap_or_default()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}

/// Bounded freelist of [`NativeBuffer`]s
#[derive(Debug)]
pub struct NativeBufferPool {
    free: Mutex<Vec<NativeBuffer>>,
    capacity: usize,
    max_buffer_size: usize,
    allocated: AtomicUsize,
    freed: AtomicUsize,
}

impl Default for NativeBufferPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl NativeBufferPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            max_buffer_size: usize::MAX,
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
        }
    }

    /// Refuse requests for buffers larger than `max_buffer_size` bytes
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Take a pooled buffer if one is available, otherwise allocate one of `size` bytes
    pub fn acquire(&self, size: usize) -> Result<NativeBuffer> {
        if size > self.max_buffer_size {
            return Err(PresenceError::AllocationFailed { size });
        }
        if let Some(buffer) = self.lock().pop() {
            return Ok(buffer);
        }

        let buffer = NativeBuffer::allocate(size)?;
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(buffer)
    }

    /// Return a buffer to the freelist, or free it when the freelist is full
    pub fn release(&self, mut buffer: NativeBuffer) {
        let mut free = self.lock();
        if free.len() < self.capacity {
            buffer.bytes.clear();
            free.push(buffer);
        } else {
            drop(free);
            self.free_buffer(buffer);
        }
    }

    /// Free every pooled buffer; used on full shutdown
    pub fn drain_and_free_all(&self) -> usize {
        let drained: Vec<NativeBuffer> = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for buffer in drained {
            self.free_buffer(buffer);
        }
        count
    }

    /// Buffers currently sitting on the freelist
    pub fn pooled(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total buffers ever allocated by this pool
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total buffers this pool has freed
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::Relaxed)
    }

    fn free_buffer(&self, buffer: NativeBuffer) {
        drop(buffer);
        self.freed.fetch_add(1, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NativeBuffer>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_released_buffers() {
        let pool = NativeBufferPool::with_capacity(4);
        let buffer = pool.acquire(16).unwrap();
        pool.release(buffer);
        assert_eq!(pool.pooled(), 1);

        let _again = pool.acquire(16).unwrap();
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn release_beyond_capacity_frees_immediately() {
        let pool = NativeBufferPool::with_capacity(1);
        let first = pool.acquire(8).unwrap();
        let second = pool.acquire(8).unwrap();

        pool.release(first);
        pool.release(second);

        assert_eq!(pool.pooled(), 1);
        assert_eq!(pool.freed(), 1);
    }

    #[test]
    fn drain_frees_everything() {
        let pool = NativeBufferPool::with_capacity(8);
        let buffers: Vec<_> = (0..3).map(|_| pool.acquire(4).unwrap()).collect();
        for buffer in buffers {
            pool.release(buffer);
        }

        assert_eq!(pool.drain_and_free_all(), 3);
        assert_eq!(pool.pooled(), 0);
        assert_eq!(pool.freed(), 3);
    }

    #[test]
    fn fill_writes_nul_terminated_text() {
        let pool = NativeBufferPool::default();
        let mut buffer = pool.acquire(6).unwrap();
        buffer.fill("hello").unwrap();
        assert_eq!(buffer.as_c_str().to_str().unwrap(), "hello");

        buffer.fill("a\0b").unwrap();
        assert_eq!(buffer.as_c_str().to_str().unwrap(), "a");
    }

    #[test]
    fn requests_over_the_size_cap_are_refused() {
        let pool = NativeBufferPool::with_capacity(4).with_max_buffer_size(16);
        pool.release(pool.acquire(16).unwrap());

        assert!(matches!(
            pool.acquire(17),
            Err(PresenceError::AllocationFailed { size: 17 })
        ));
        // the pooled buffer stays put
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn oversized_allocation_is_an_error() {
        let pool = NativeBufferPool::default();
        let err = pool.acquire(usize::MAX).unwrap_err();
        assert!(matches!(err, PresenceError::AllocationFailed { .. }));
    }
}
