//! Storage backends behind [`crate::RingBuffer`].

use std::fmt;

use scan_core::Sample;

use crate::{RingError, Result};

/// Memory layout providing the ring's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Shared memory mapped twice back to back; every window is contiguous.
    Mirrored,
    /// Plain buffer; windows crossing the end are split.
    CopyOnWrap,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Mirrored => f.write_str("mirrored"),
            Backend::CopyOnWrap => f.write_str("copy-on-wrap"),
        }
    }
}

/// Raw sample storage for a ring of `capacity()` samples.
///
/// # Safety
///
/// Implementors guarantee that:
/// - `base()` is valid for reads and writes of `span()` samples for the
///   lifetime of the storage, and never changes;
/// - `span()` is either `capacity()` or `2 * capacity()`, and in the latter
///   case sample `base + capacity + i` aliases sample `base + i`.
pub unsafe trait RingStorage: Send + Sync {
    /// Which layout this is.
    fn backend(&self) -> Backend;

    /// Ring capacity in samples.
    fn capacity(&self) -> usize;

    /// Number of samples addressable linearly from `base()`.
    fn span(&self) -> usize;

    /// First sample of the ring.
    fn base(&self) -> *mut Sample;
}

/// A bounds-checked window of a ring, expressed as one or two raw runs.
pub(crate) enum Region {
    Contiguous {
        ptr: *mut Sample,
        len: usize,
    },
    Split {
        first: *mut Sample,
        first_len: usize,
        second: *mut Sample,
        second_len: usize,
    },
}

impl Region {
    pub(crate) fn new(storage: &dyn RingStorage, offset: usize, len: usize) -> Result<Self> {
        let capacity = storage.capacity();
        if len > capacity {
            return Err(RingError::WindowTooLarge { len, capacity });
        }
        if offset >= capacity {
            return Err(RingError::OffsetOutOfRange { offset, capacity });
        }

        let base = storage.base();
        // SAFETY: offset < capacity <= span, so every pointer below stays in the span.
        unsafe {
            if offset + len <= storage.span() {
                Ok(Region::Contiguous {
                    ptr: base.add(offset),
                    len,
                })
            } else {
                let first_len = capacity - offset;
                Ok(Region::Split {
                    first: base.add(offset),
                    first_len,
                    second: base,
                    second_len: len - first_len,
                })
            }
        }
    }

    pub(crate) fn contiguous(&self) -> Option<*mut Sample> {
        match self {
            Region::Contiguous { ptr, .. } => Some(*ptr),
            Region::Split { .. } => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Region::Contiguous { len, .. } => *len,
            Region::Split {
                first_len,
                second_len,
                ..
            } => first_len + second_len,
        }
    }

    /// # Safety
    ///
    /// No writer may touch the region while `f` runs.
    pub(crate) unsafe fn read_with<R>(&self, f: impl FnOnce(&[Sample]) -> R) -> R {
        match *self {
            Region::Contiguous { ptr, len } => f(std::slice::from_raw_parts(ptr, len)),
            Region::Split {
                first,
                first_len,
                second,
                second_len,
            } => {
                let mut scratch = Vec::with_capacity(first_len + second_len);
                scratch.extend_from_slice(std::slice::from_raw_parts(first, first_len));
                scratch.extend_from_slice(std::slice::from_raw_parts(second, second_len));
                f(&scratch)
            }
        }
    }

    /// # Safety
    ///
    /// No reader or other writer may touch the region during the copy, and
    /// `src.len()` must equal the region length.
    pub(crate) unsafe fn copy_in(&self, src: &[Sample]) {
        debug_assert_eq!(src.len(), self.len());
        match *self {
            Region::Contiguous { ptr, len } => {
                std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, len);
            }
            Region::Split {
                first,
                first_len,
                second,
                second_len,
            } => {
                std::ptr::copy_nonoverlapping(src.as_ptr(), first, first_len);
                std::ptr::copy_nonoverlapping(src.as_ptr().add(first_len), second, second_len);
            }
        }
    }
}
