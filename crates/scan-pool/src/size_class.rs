//! Power-of-two size-class arithmetic.

use crate::{PoolError, Result};

/// Smallest size class used by default (64 samples).
pub const DEFAULT_MIN_CLASS: u32 = 6;

/// Exclusive upper bound on size classes used by default (largest buffer holds 2^23 samples).
pub const DEFAULT_MAX_CLASS: u32 = 24;

/// Hard ceiling for the exclusive upper class bound.
pub const CLASS_LIMIT: u32 = 40;

/// The contiguous range `[min, max)` of size classes a pool serves.
///
/// Class `i` holds buffers of exactly `2^i` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    min: u32,
    max: u32,
}

impl SizeClasses {
    /// Build a class range, rejecting empty ranges and ranges above [`CLASS_LIMIT`].
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min >= max || max > CLASS_LIMIT {
            return Err(PoolError::InvalidClasses { min, max });
        }
        Ok(Self { min, max })
    }

    /// Smallest class served.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Exclusive upper class bound.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of classes in the range.
    #[must_use]
    pub fn count(&self) -> usize {
        (self.max - self.min) as usize
    }

    /// Largest request, in samples, any class can hold.
    #[must_use]
    pub fn max_len(&self) -> usize {
        capacity_of(self.max - 1)
    }

    /// Whether `class` belongs to this range.
    #[must_use]
    pub fn contains(&self, class: u32) -> bool {
        (self.min..self.max).contains(&class)
    }

    /// Slot of `class` in a per-class table, if it belongs to this range.
    #[must_use]
    pub fn index_of(&self, class: u32) -> Option<usize> {
        self.contains(class).then(|| (class - self.min) as usize)
    }

    /// Smallest class whose capacity is at least `len`, clamped up to the minimum class.
    ///
    /// Requests above [`SizeClasses::max_len`] are rejected, never truncated.
    pub fn class_for(&self, len: usize) -> Result<u32> {
        let max = self.max_len();
        if len > max {
            return Err(PoolError::AllocationTooLarge {
                requested: len,
                max,
            });
        }
        let class = len.max(1).next_power_of_two().trailing_zeros();
        Ok(class.max(self.min))
    }
}

impl Default for SizeClasses {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_CLASS,
            max: DEFAULT_MAX_CLASS,
        }
    }
}

/// Capacity in samples of a buffer in `class`.
#[must_use]
pub const fn capacity_of(class: u32) -> usize {
    1usize << class
}
