//! Core types shared by every sdrscan crate.
//!
//! - [`Sample`]: the complex baseband sample carried through the pipeline
//! - [`SampleFormat`]: raw interleaved IQ encodings accepted from files and pipes
//! - [`WorkerPool`]: the task queue that runs inspection callbacks off the read path

pub mod format;
pub mod worker;

pub use format::{FormatError, SampleFormat};
pub use worker::{WorkerError, WorkerPool};

/// A single complex baseband sample (I + jQ) in single precision.
pub type Sample = num_complex::Complex32;

/// Size in bytes of one [`Sample`].
pub const SAMPLE_SIZE: usize = std::mem::size_of::<Sample>();
