//! Read-only sample windows handed to inspection tasks.

use std::fmt;

use scan_core::Sample;
use scan_pool::SharedBuffer;
use scan_ring::{RingReader, RingSpan};

/// One read's worth of samples at an absolute stream position.
///
/// Clones are cheap. A pooled window keeps its buffer alive until the last
/// clone drops; a ring window borrows the ring and may be overwritten by the
/// writer once it falls a full ring behind.
#[derive(Clone)]
pub struct SampleWindow {
    position: u64,
    len: usize,
    backing: Backing,
}

#[derive(Clone)]
enum Backing {
    Pooled(SharedBuffer),
    Ring(RingReader),
}

impl SampleWindow {
    /// Window over a frozen pooled buffer.
    #[must_use]
    pub fn pooled(position: u64, buffer: SharedBuffer) -> Self {
        Self {
            position,
            len: buffer.len(),
            backing: Backing::Pooled(buffer),
        }
    }

    /// Window over a published ring span.
    #[must_use]
    pub fn ring(span: RingSpan, reader: RingReader) -> Self {
        Self {
            position: span.position,
            len: span.len,
            backing: Backing::Ring(reader),
        }
    }

    /// Absolute stream offset of the first sample.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position one past the last sample.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.position + self.len as u64
    }

    /// Run `f` over the samples.
    ///
    /// `None` if the backing ring has already overwritten the window.
    pub fn with_samples<R>(&self, f: impl FnOnce(&[Sample]) -> R) -> Option<R> {
        match &self.backing {
            Backing::Pooled(buffer) => Some(f(buffer.as_slice())),
            Backing::Ring(reader) => reader.read(self.position, self.len, f),
        }
    }

    /// Whether the samples can still be read.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match &self.backing {
            Backing::Pooled(_) => true,
            Backing::Ring(reader) => reader.is_available(self.position, self.len),
        }
    }

    /// Copy the samples out.
    #[must_use]
    pub fn to_vec(&self) -> Option<Vec<Sample>> {
        self.with_samples(<[Sample]>::to_vec)
    }
}

impl fmt::Debug for SampleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match self.backing {
            Backing::Pooled(_) => "pooled",
            Backing::Ring(_) => "ring",
        };
        f.debug_struct("SampleWindow")
            .field("position", &self.position)
            .field("len", &self.len)
            .field("backing", &backing)
            .finish()
    }
}
