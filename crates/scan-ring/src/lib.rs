#![allow(unsafe_code)]
//! Circular sample buffer with a contiguous, wraparound-free view.
//!
//! # Mirrored Mapping
//!
//! On Linux the ring is backed by an anonymous shared-memory file of `N`
//! samples mapped twice, back to back:
//!
//! ```text
//!  base                  base + N                base + 2N
//!   ┌──────────────────────┬──────────────────────┐
//!   │  pages 0 .. N        │  pages 0 .. N (alias)│
//!   └──────────────────────┴──────────────────────┘
//!          └─── window [N - k/2, N + k/2) is one slice ───┘
//! ```
//!
//! Any window `[offset, offset + len)` with `offset < N` and `len <= N` is a
//! plain slice starting at `base + offset`, so neither the writer nor the
//! readers do modulo arithmetic or split copies on the sample path.
//!
//! # Copy-on-Wrap Fallback
//!
//! Platforms without the double-mapping primitive get an ordinary heap buffer
//! of `N` samples. Windows that cross the end are copied into a scratch
//! buffer in two parts. The capacity contract is the same for both backends.
//!
//! # Capacity
//!
//! `N * size_of::<Sample>()` must be a whole number of pages. Other
//! capacities are rejected at construction, never rounded; use
//! [`RingBuffer::capacity_for`] to pick a supported one.
//!
//! # Concurrency
//!
//! [`RingBuffer`] itself is a single-owner primitive (`&mut self` to write).
//! [`split`] turns it into one [`RingWriter`] and any number of cloned
//! [`RingReader`]s that read published windows while the writer keeps going.

mod heap;
#[cfg(target_os = "linux")]
mod mirrored;
pub mod shared;
pub mod storage;

pub use shared::{split, RingReader, RingSpan, RingWriter};
pub use storage::{Backend, RingStorage};

use std::fmt;

use scan_core::{Sample, SAMPLE_SIZE};
use thiserror::Error;
use tracing::info;

/// Result alias for ring buffer operations.
pub type Result<T> = std::result::Result<T, RingError>;

/// Ring buffer errors. All are recoverable; construction failures release
/// every mapping and descriptor acquired up to that point.
#[derive(Error, Debug)]
pub enum RingError {
    /// `capacity * element_size` is not a multiple of the page size.
    #[error(
        "Unsupported ring capacity {capacity}: {capacity} x {element_size} bytes is not a multiple of the {page_size}-byte page size"
    )]
    UnsupportedCapacity {
        /// Requested capacity in samples.
        capacity: usize,
        /// Size of one sample in bytes.
        element_size: usize,
        /// Platform page size in bytes.
        page_size: usize,
    },

    /// A virtual-memory call failed while building the mirrored mapping.
    #[error("Ring mapping failed during {stage}: {source}")]
    Mapping {
        /// Construction step that failed.
        stage: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// The platform has no double-mapping primitive.
    #[error("Mirrored ring buffers are not supported on this platform")]
    MirroringUnavailable,

    /// A window longer than the ring was requested.
    #[error("Window of {len} samples exceeds ring capacity ({capacity} samples)")]
    WindowTooLarge {
        /// Requested window length.
        len: usize,
        /// Ring capacity.
        capacity: usize,
    },

    /// A window offset outside `[0, capacity)` was requested.
    #[error("Offset {offset} outside ring of {capacity} samples")]
    OffsetOutOfRange {
        /// Requested offset.
        offset: usize,
        /// Ring capacity.
        capacity: usize,
    },
}

/// Platform page size in bytes.
#[must_use]
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

/// Fixed-capacity circular buffer of samples.
pub struct RingBuffer {
    storage: Box<dyn RingStorage>,
}

impl RingBuffer {
    /// Whether `capacity` samples fill a whole number of pages.
    #[must_use]
    pub fn is_capacity_supported(capacity: usize) -> bool {
        capacity > 0
            && capacity
                .checked_mul(SAMPLE_SIZE)
                .is_some_and(|bytes| bytes % page_size() == 0)
    }

    /// Smallest supported capacity holding at least `min_samples`.
    #[must_use]
    pub fn capacity_for(min_samples: usize) -> usize {
        let page_samples = (page_size() / SAMPLE_SIZE).max(1);
        min_samples.max(1).div_ceil(page_samples) * page_samples
    }

    /// Create a ring of `capacity` samples, mirrored where the platform allows.
    pub fn new(capacity: usize) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Self::mirrored(capacity)
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::copy_on_wrap(capacity)
        }
    }

    /// Create a ring backed by the double mapping.
    pub fn mirrored(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        #[cfg(target_os = "linux")]
        {
            let region = mirrored::MirroredRegion::map(capacity)?;
            info!(capacity, bytes = capacity * SAMPLE_SIZE, "Mirrored ring buffer mapped");
            Ok(Self::from_storage(Box::new(region)))
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(RingError::MirroringUnavailable)
        }
    }

    /// Create a ring backed by a plain heap buffer with split copies at the wrap.
    pub fn copy_on_wrap(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        info!(capacity, "Copy-on-wrap ring buffer allocated");
        Ok(Self::from_storage(Box::new(heap::HeapRegion::new(capacity))))
    }

    /// Wrap an externally provided storage backend.
    #[must_use]
    pub fn from_storage(storage: Box<dyn RingStorage>) -> Self {
        Self { storage }
    }

    /// Capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Which backend holds the samples.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.storage.backend()
    }

    /// Contiguous view of `[offset, offset + len)`.
    ///
    /// Always `Some` on the mirrored backend; `None` on the copy-on-wrap
    /// backend when the window crosses the end.
    pub fn window(&self, offset: usize, len: usize) -> Result<Option<&[Sample]>> {
        let region = self.region(offset, len)?;
        // SAFETY: `&self` excludes writers; region lies inside the mapped span.
        Ok(region
            .contiguous()
            .map(|ptr| unsafe { std::slice::from_raw_parts(ptr, len) }))
    }

    /// Mutable contiguous view of `[offset, offset + len)`, see [`RingBuffer::window`].
    pub fn window_mut(&mut self, offset: usize, len: usize) -> Result<Option<&mut [Sample]>> {
        let region = self.region(offset, len)?;
        // SAFETY: `&mut self` gives exclusive access to the whole ring.
        Ok(region
            .contiguous()
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr, len) }))
    }

    /// Run `f` over the window, copying only if the backend cannot present it contiguously.
    pub fn read<R>(&self, offset: usize, len: usize, f: impl FnOnce(&[Sample]) -> R) -> Result<R> {
        let region = self.region(offset, len)?;
        // SAFETY: `&self` excludes writers for the duration of the call.
        Ok(unsafe { region.read_with(f) })
    }

    /// Copy `src` into the ring starting at `offset`, wrapping past the end.
    pub fn write(&mut self, offset: usize, src: &[Sample]) -> Result<()> {
        let region = self.region(offset, src.len())?;
        // SAFETY: `&mut self` gives exclusive access to the whole ring.
        unsafe { region.copy_in(src) };
        Ok(())
    }

    pub(crate) fn region(&self, offset: usize, len: usize) -> Result<storage::Region> {
        storage::Region::new(self.storage.as_ref(), offset, len)
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("backend", &self.backend())
            .field("base", &format!("{:p}", self.storage.base()))
            .finish()
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if RingBuffer::is_capacity_supported(capacity) {
        Ok(())
    } else {
        Err(RingError::UnsupportedCapacity {
            capacity,
            element_size: SAMPLE_SIZE,
            page_size: page_size(),
        })
    }
}
