//! Copy-on-wrap backend: an ordinary heap buffer.

use std::cell::UnsafeCell;

use scan_core::Sample;

use crate::storage::{Backend, RingStorage};

pub(crate) struct HeapRegion {
    cells: Box<[UnsafeCell<Sample>]>,
}

impl HeapRegion {
    pub(crate) fn new(capacity: usize) -> Self {
        let cells = (0..capacity)
            .map(|_| UnsafeCell::new(Sample::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { cells }
    }
}

// SAFETY: access to the cells is coordinated by RingBuffer (`&mut self` for
// writes) or by the pin protocol in `shared`.
unsafe impl Sync for HeapRegion {}

// SAFETY: the boxed slice never moves and holds `capacity()` samples.
unsafe impl RingStorage for HeapRegion {
    fn backend(&self) -> Backend {
        Backend::CopyOnWrap
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn span(&self) -> usize {
        self.cells.len()
    }

    fn base(&self) -> *mut Sample {
        // UnsafeCell<T> has the same layout as T.
        self.cells.as_ptr() as *mut Sample
    }
}
