//! Object pools
//!
//! Size-classed free lists for byte buffers, plus a generic pool for codec
//! scratch objects. Every object is reset before it can be handed out again,
//! so a borrower never observes a previous borrower's bytes.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Objects that can be returned to a pool
pub trait Reset {
    /// Clear all state so the object is indistinguishable from a fresh one
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.fill(0);
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Buffer size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Up to 1 KiB
    Small,
    /// Up to 16 KiB
    Medium,
    /// Up to 256 KiB
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    /// Capacity of every buffer in this class
    pub const fn capacity(self) -> usize {
        match self {
            SizeClass::Small => 1024,
            SizeClass::Medium => 16 * 1024,
            SizeClass::Large => 256 * 1024,
        }
    }

    /// Smallest class that fits `size`, or `None` when it must not be pooled
    pub fn for_size(size: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|class| size <= class.capacity())
    }

    fn index(self) -> usize {
        match self {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
        }
    }
}

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle objects kept per free list; extra returns are dropped
    pub max_idle_per_class: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_class: 64,
        }
    }
}

/// Counters for one pool
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    unpooled: AtomicU64,
}

impl PoolStats {
    /// Borrows served from the free list
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Borrows that had to allocate
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Borrows larger than the biggest class
    pub fn unpooled(&self) -> u64 {
        self.unpooled.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Generic object pool
// ============================================================================

/// Free list of reusable objects
pub struct ObjectPool<T: Reset + Send> {
    free: Mutex<Vec<T>>,
    create: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
    stats: PoolStats,
}

impl<T: Reset + Send> ObjectPool<T> {
    pub fn new<F>(max_idle: usize, create: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            create: Box::new(create),
            max_idle,
            stats: PoolStats::default(),
        }
    }

    /// Borrow an object. Objects in the free list are already reset.
    pub fn take(&self) -> T {
        let reused = self.free.lock().pop();
        match reused {
            Some(object) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                object
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                (self.create)()
            }
        }
    }

    /// Return an object; it is reset before it becomes visible to borrowers
    pub fn put(&self, mut object: T) {
        object.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(object);
        }
    }

    /// Number of idle objects
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl<T: Reset + Send> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

// ============================================================================
// Byte buffer pool
// ============================================================================

/// Size-classed byte buffer pool. Cheap to clone; clones share free lists.
#[derive(Debug, Clone)]
pub struct BufferPool {
    classes: Arc<[ObjectPool<Vec<u8>>; 3]>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        let make = |class: SizeClass| {
            ObjectPool::new(config.max_idle_per_class, move || {
                Vec::with_capacity(class.capacity())
            })
        };
        Self {
            classes: Arc::new([
                make(SizeClass::Small),
                make(SizeClass::Medium),
                make(SizeClass::Large),
            ]),
        }
    }

    /// Borrow a zero-filled buffer of exactly `size` bytes
    pub fn get(&self, size: usize) -> PooledBuffer {
        let mut buffer = self.scratch(size);
        buffer.resize(size, 0);
        buffer
    }

    /// Borrow an empty buffer with room for at least `capacity` bytes
    pub fn scratch(&self, capacity: usize) -> PooledBuffer {
        match SizeClass::for_size(capacity) {
            Some(class) => PooledBuffer {
                buffer: self.classes[class.index()].take(),
                class: Some(class),
                pool: Some(self.clone()),
            },
            None => {
                // Too large to keep around; the caller owns a plain allocation.
                self.classes[SizeClass::Large.index()]
                    .stats
                    .unpooled
                    .fetch_add(1, Ordering::Relaxed);
                PooledBuffer {
                    buffer: Vec::with_capacity(capacity),
                    class: None,
                    pool: None,
                }
            }
        }
    }

    /// Idle buffers in one class
    pub fn idle(&self, class: SizeClass) -> usize {
        self.classes[class.index()].idle()
    }

    pub fn stats(&self, class: SizeClass) -> &PoolStats {
        self.classes[class.index()].stats()
    }

    fn give_back(&self, class: SizeClass, buffer: Vec<u8>) {
        // A buffer that grew past its class would bloat the free list.
        let capacity = buffer.capacity();
        if capacity >= class.capacity() && capacity < class.capacity() * 2 {
            self.classes[class.index()].put(buffer);
        }
    }
}

/// A borrowed buffer; returned to its pool on drop
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    class: Option<SizeClass>,
    pool: Option<BufferPool>,
}

impl PooledBuffer {
    /// Size class the buffer came from, `None` for oversized buffers
    pub fn class(&self) -> Option<SizeClass> {
        self.class
    }

    /// Detach the buffer from the pool
    pub fn into_inner(mut self) -> Vec<u8> {
        self.pool = None;
        std::mem::take(&mut self.buffer)
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let (Some(pool), Some(class)) = (self.pool.take(), self.class) {
            pool.give_back(class, std::mem::take(&mut self.buffer));
        }
    }
}

static GLOBAL_BUFFERS: Lazy<BufferPool> = Lazy::new(BufferPool::default);

/// Process-wide buffer pool used by the transports and the codec
pub fn global_buffers() -> &'static BufferPool {
    &GLOBAL_BUFFERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(SizeClass::for_size(0), Some(SizeClass::Small));
        assert_eq!(SizeClass::for_size(1024), Some(SizeClass::Small));
        assert_eq!(SizeClass::for_size(1025), Some(SizeClass::Medium));
        assert_eq!(SizeClass::for_size(16 * 1024), Some(SizeClass::Medium));
        assert_eq!(SizeClass::for_size(256 * 1024), Some(SizeClass::Large));
        assert_eq!(SizeClass::for_size(256 * 1024 + 1), None);
    }

    #[test]
    fn test_dirty_buffer_is_zeroed_on_reuse() {
        let pool = BufferPool::default();
        {
            let mut buffer = pool.get(512);
            buffer.iter_mut().for_each(|byte| *byte = 0xAB);
        }
        assert_eq!(pool.idle(SizeClass::Small), 1);

        let buffer = pool.get(800);
        assert_eq!(buffer.len(), 800);
        assert!(buffer.iter().all(|byte| *byte == 0));
        assert_eq!(pool.stats(SizeClass::Small).hits(), 1);
    }

    #[test]
    fn test_oversized_buffers_are_not_pooled() {
        let pool = BufferPool::default();
        let size = 300 * 1024;
        {
            let buffer = pool.get(size);
            assert_eq!(buffer.len(), size);
            assert_eq!(buffer.class(), None);
        }
        for class in SizeClass::ALL {
            assert_eq!(pool.idle(class), 0);
        }
        assert_eq!(pool.stats(SizeClass::Large).unpooled(), 1);
    }

    #[test]
    fn test_grown_buffer_is_dropped() {
        let pool = BufferPool::default();
        {
            let mut buffer = pool.scratch(10);
            buffer.extend(std::iter::repeat_n(1u8, 4096));
        }
        assert_eq!(pool.idle(SizeClass::Small), 0);
    }

    #[test]
    fn test_object_pool_respects_max_idle() {
        let pool = ObjectPool::new(2, String::new);
        for _ in 0..5 {
            pool.put("left over".to_string());
        }
        assert_eq!(pool.idle(), 2);
        assert!(pool.take().is_empty());
    }

    #[test]
    fn test_concurrent_borrow_and_return() {
        let pool = BufferPool::default();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut borrowed = 0;
                    for _ in 0..200 {
                        let mut buffer = pool.get(256);
                        assert!(buffer.iter().all(|byte| *byte == 0));
                        buffer.fill(worker as u8 + 1);
                        borrowed += 1;
                    }
                    borrowed
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 200);
        }
        assert!(pool.idle(SizeClass::Small) <= PoolConfig::default().max_idle_per_class);
    }
}
