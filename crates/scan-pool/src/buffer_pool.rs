//! Per-size-class free lists and the buffer handles they hand out.
//!
//! ## Memory Flow
//!
//! ```text
//! 1. alloc(len) picks the smallest class i with 2^i >= len
//! 2. pop the head of class i's free list under that class's lock
//!    (or allocate 2^i fresh samples when the list is empty)
//! 3. PooledBuffer is filled by the source (as_mut_slice / set_len)
//! 4. freeze() turns it into a SharedBuffer, cloned to every reader
//! 5. when the last handle drops, the buffer is pushed back onto the
//!    head of its origin class's free list
//! ```
//!
//! Lock discipline on return is lock, push, unlock. The critical section is
//! O(1) and never performs I/O.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use scan_core::Sample;
use tracing::{error, info, trace};

use crate::size_class::{capacity_of, SizeClasses};
use crate::{PoolConfig, Result};

/// One size class: a LIFO free list and its counters.
struct ClassList {
    class: u32,
    capacity: usize,
    free: Mutex<Vec<Box<[Sample]>>>,
    /// Buffers of this class currently alive (cached or lent out).
    allocated: AtomicUsize,
    acquires: AtomicU64,
    returns: AtomicU64,
    /// Returns freed because the retention cap was reached.
    dropped: AtomicU64,
}

impl ClassList {
    fn new(class: u32) -> Self {
        Self {
            class,
            capacity: capacity_of(class),
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            acquires: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn fresh(&self) -> Box<[Sample]> {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        trace!(class = self.class, capacity = self.capacity, "Fresh pool allocation");
        vec![Sample::default(); self.capacity].into_boxed_slice()
    }
}

struct PoolInner {
    classes: SizeClasses,
    lists: Box<[ClassList]>,
    retain_per_class: Option<usize>,
}

impl PoolInner {
    fn list(&self, class: u32) -> Option<&ClassList> {
        self.classes.index_of(class).map(|idx| &self.lists[idx])
    }

    /// Push a buffer back onto its origin class.
    fn give_back(&self, class: u32, data: Box<[Sample]>) {
        let Some(list) = self.list(class) else {
            corrupt_buffer(class, data.len(), self.classes);
        };
        if data.len() != list.capacity {
            corrupt_buffer(class, data.len(), self.classes);
        }

        list.returns.fetch_add(1, Ordering::Relaxed);

        let mut free = list.free.lock();
        if let Some(limit) = self.retain_per_class {
            if free.len() >= limit {
                drop(free);
                list.dropped.fetch_add(1, Ordering::Relaxed);
                list.allocated.fetch_sub(1, Ordering::Relaxed);
                trace!(class, limit, "Retention limit reached, freeing returned buffer");
                return;
            }
        }
        free.push(data);
    }
}

/// A freed buffer whose class does not belong to its pool means memory
/// corruption; pushing it anywhere would poison an unrelated free list.
#[cold]
fn corrupt_buffer(class: u32, len: usize, classes: SizeClasses) -> ! {
    error!(
        class,
        len,
        min_class = classes.min(),
        max_class = classes.max(),
        "Corrupt buffer returned to pool; aborting"
    );
    std::process::abort()
}

/// Snapshot of one size class's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassStats {
    /// Size class (buffers hold `2^class` samples).
    pub class: u32,
    /// Capacity of each buffer in samples.
    pub capacity: usize,
    /// Idle buffers on the free list.
    pub cached: usize,
    /// Buffers alive (cached plus lent out).
    pub allocated: usize,
    /// Successful allocations served from this class.
    pub acquires: u64,
    /// Buffers returned to this class.
    pub returns: u64,
    /// Returns freed because of the retention cap.
    pub dropped: u64,
}

/// Size-classed pool of sample buffers.
///
/// Cloning is cheap and every clone shares the same free lists. Thread-safe:
/// each class is guarded by its own lock.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with one empty free list per configured size class.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let classes = config.classes()?;
        let lists = (classes.min()..classes.max())
            .map(ClassList::new)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(
            min_class = classes.min(),
            max_class = classes.max(),
            max_len = classes.max_len(),
            retain_per_class = ?config.retain_per_class,
            "BufferPool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                classes,
                lists,
                retain_per_class: config.retain_per_class,
            }),
        })
    }

    /// Allocate a buffer whose logical length is `len` samples.
    ///
    /// The buffer's capacity is the smallest size class that fits `len`.
    /// Fails with [`crate::PoolError::AllocationTooLarge`] when no class fits;
    /// nothing is allocated in that case.
    pub fn alloc(&self, len: usize) -> Result<PooledBuffer> {
        let class = self.inner.classes.class_for(len)?;
        let Some(list) = self.inner.list(class) else {
            // class_for only yields classes inside the range
            unreachable!("class {class} outside pool range");
        };

        let cached = list.free.lock().pop();
        let data = match cached {
            Some(data) => data,
            None => list.fresh(),
        };
        list.acquires.fetch_add(1, Ordering::Relaxed);

        Ok(PooledBuffer {
            data: Some(data),
            len,
            class,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Warm the free list serving `len` with `count` buffers.
    pub fn preallocate(&self, len: usize, count: usize) -> Result<()> {
        let class = self.inner.classes.class_for(len)?;
        if let Some(list) = self.inner.list(class) {
            let fresh: Vec<_> = (0..count).map(|_| list.fresh()).collect();
            list.free.lock().extend(fresh);
            info!(class, count, capacity = list.capacity, "Preallocated pool buffers");
        }
        Ok(())
    }

    /// The size classes this pool serves.
    #[must_use]
    pub fn classes(&self) -> SizeClasses {
        self.inner.classes
    }

    /// Largest length, in samples, [`BufferPool::alloc`] accepts.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.inner.classes.max_len()
    }

    /// Counters for one size class.
    #[must_use]
    pub fn class_stats(&self, class: u32) -> Option<ClassStats> {
        self.inner.list(class).map(|list| ClassStats {
            class: list.class,
            capacity: list.capacity,
            cached: list.free.lock().len(),
            allocated: list.allocated.load(Ordering::Relaxed),
            acquires: list.acquires.load(Ordering::Relaxed),
            returns: list.returns.load(Ordering::Relaxed),
            dropped: list.dropped.load(Ordering::Relaxed),
        })
    }

    /// Counters for every size class, smallest first.
    #[must_use]
    pub fn stats(&self) -> Vec<ClassStats> {
        (self.inner.classes.min()..self.inner.classes.max())
            .filter_map(|class| self.class_stats(class))
            .collect()
    }

    /// Total allocations served since creation.
    #[must_use]
    pub fn total_acquires(&self) -> u64 {
        self.inner
            .lists
            .iter()
            .map(|l| l.acquires.load(Ordering::Relaxed))
            .sum()
    }

    /// Total buffers returned since creation.
    #[must_use]
    pub fn total_returns(&self) -> u64 {
        self.inner
            .lists
            .iter()
            .map(|l| l.returns.load(Ordering::Relaxed))
            .sum()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("classes", &self.inner.classes)
            .field("retain_per_class", &self.inner.retain_per_class)
            .field("acquires", &self.total_acquires())
            .field("returns", &self.total_returns())
            .finish()
    }
}

/// A buffer lent out by a [`BufferPool`], returned automatically on drop.
///
/// Derefs to the first `len()` samples. The full capacity is reachable with
/// [`PooledBuffer::as_mut_capacity`] so a source can fill it before the
/// logical length is known.
pub struct PooledBuffer {
    /// Always `Some` until drop.
    data: Option<Box<[Sample]>>,
    len: usize,
    class: u32,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Logical length in samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in samples (`2^size_class`).
    #[must_use]
    pub fn capacity(&self) -> usize {
        capacity_of(self.class)
    }

    /// Size class this buffer was allocated from.
    #[must_use]
    pub fn size_class(&self) -> u32 {
        self.class
    }

    /// The valid samples.
    #[must_use]
    pub fn as_slice(&self) -> &[Sample] {
        match &self.data {
            Some(data) => &data[..self.len],
            None => &[],
        }
    }

    /// Mutable access to the valid samples.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        let len = self.len;
        match &mut self.data {
            Some(data) => &mut data[..len],
            None => &mut [],
        }
    }

    /// Mutable access to the whole capacity, for filling before `set_len`.
    #[must_use]
    pub fn as_mut_capacity(&mut self) -> &mut [Sample] {
        match &mut self.data {
            Some(data) => data,
            None => &mut [],
        }
    }

    /// Set the logical length.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the buffer capacity.
    pub fn set_len(&mut self, len: usize) {
        let cap = self.capacity();
        assert!(
            len <= cap,
            "set_len({}) exceeds buffer capacity ({})",
            len,
            cap
        );
        self.len = len;
    }

    /// Shorten the logical length; no-op if `len` is not shorter.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Return the buffer to its pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Freeze into a shared, read-only buffer (no copy).
    #[must_use]
    pub fn freeze(self) -> SharedBuffer {
        SharedBuffer {
            inner: Arc::new(self),
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [Sample];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[Sample]> for PooledBuffer {
    fn as_ref(&self) -> &[Sample] {
        self.as_slice()
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("class", &self.class)
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.give_back(self.class, data);
        }
    }
}

/// A frozen pooled buffer shared between readers.
///
/// Clones share the same allocation; the buffer returns to its pool when the
/// last clone drops.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<PooledBuffer>,
}

impl SharedBuffer {
    /// Logical length in samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the logical length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Size class the buffer came from.
    #[must_use]
    pub fn size_class(&self) -> u32 {
        self.inner.size_class()
    }

    /// The valid samples.
    #[must_use]
    pub fn as_slice(&self) -> &[Sample] {
        self.inner.as_slice()
    }

    /// Recover exclusive ownership if this is the only handle.
    pub fn try_unfreeze(self) -> std::result::Result<PooledBuffer, Self> {
        Arc::try_unwrap(self.inner).map_err(|inner| Self { inner })
    }
}

impl Deref for SharedBuffer {
    type Target = [Sample];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[Sample]> for SharedBuffer {
    fn as_ref(&self) -> &[Sample] {
        self.as_slice()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
