//! Size-classed buffer pool for sample windows.
//!
//! A real-time sample stream produces and consumes buffers of a handful of
//! fixed sizes over and over. Routing every window through the general
//! allocator costs time on the hottest path of the pipeline, so this crate
//! keeps one free list per power-of-two size class and recycles buffers
//! through it.
//!
//! - [`BufferPool`]: shared pool handle, one LIFO free list per size class
//! - [`PooledBuffer`]: exclusively owned buffer, returns to its origin pool on drop
//! - [`SharedBuffer`]: frozen, cheaply clonable view; returns when the last clone drops
//!
//! # Ownership
//!
//! A buffer carries its size class and an `Arc` to the pool it came from, so
//! returning a buffer to a foreign pool cannot be expressed. The size class is
//! fixed at allocation; only the logical length can change.
//!
//! # Example
//!
//! ```
//! use scan_pool::{BufferPool, PoolConfig};
//!
//! let pool = BufferPool::new(&PoolConfig::default()).unwrap();
//!
//! let mut window = pool.alloc(1000).unwrap();
//! assert_eq!(window.len(), 1000);
//! assert_eq!(window.capacity(), 1024);
//! window[0].re = 1.0;
//!
//! // Hand the window to readers without copying.
//! let shared = window.freeze();
//! let reader = shared.clone();
//! assert_eq!(reader[0].re, 1.0);
//!
//! drop(shared);
//! drop(reader); // buffer goes back to the 1024-sample free list
//! ```

pub mod buffer_pool;
pub mod size_class;

pub use buffer_pool::{BufferPool, ClassStats, PooledBuffer, SharedBuffer};
pub use size_class::{SizeClasses, CLASS_LIMIT, DEFAULT_MAX_CLASS, DEFAULT_MIN_CLASS};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Recoverable pool errors.
///
/// Returning a corrupted buffer is not represented here: it aborts the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The request exceeds what the largest size class can hold.
    #[error("Allocation of {requested} samples exceeds the largest size class ({max} samples)")]
    AllocationTooLarge {
        /// Requested length in samples.
        requested: usize,
        /// Largest servable length in samples.
        max: usize,
    },

    /// The configured class range is empty or too large.
    #[error("Invalid size class range [{min}, {max}): need min < max <= {limit}", limit = CLASS_LIMIT)]
    InvalidClasses {
        /// Configured minimum class.
        min: u32,
        /// Configured exclusive maximum class.
        max: u32,
    },
}

/// Pool configuration (`[pool]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Smallest size class; smaller requests are rounded up to it.
    pub min_class: u32,
    /// Exclusive upper size class bound.
    pub max_class: u32,
    /// Optional cap on idle buffers cached per class. Extra returns are freed.
    pub retain_per_class: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_class: DEFAULT_MIN_CLASS,
            max_class: DEFAULT_MAX_CLASS,
            retain_per_class: None,
        }
    }
}

impl PoolConfig {
    /// Validated size-class range for this configuration.
    pub fn classes(&self) -> Result<SizeClasses> {
        SizeClasses::new(self.min_class, self.max_class)
    }
}
