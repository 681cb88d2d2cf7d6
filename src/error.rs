//! Application error type.
//!
//! `ScanError` collects the error enums of every sdrscan crate so that the
//! analyzer, configuration loader and binary can use `?` across crate
//! boundaries.
//!
//! Errors fall into three groups:
//!
//! 1. **Configuration** (`Config`, `Configuration`, `UnknownSource`): found at
//!    startup; fix the configuration and restart.
//! 2. **Resource setup** (`Pool`, `Ring`, `Worker`, `Source`): a stream could
//!    not be set up; the caller fails that stream cleanly, nothing leaks.
//! 3. **Runtime** (`Consumer`, `UnknownConsumer`): an attached consumer failed
//!    or is gone; the analyzer decides whether to detach it.
//!
//! A corrupted pooled buffer is deliberately absent: the pool aborts.

use thiserror::Error;

use crate::consumer::ConsumerError;

/// Convenience alias for results using the application error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Primary error type for sdrscan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Configuration could not be read or parsed.
    ///
    /// Wraps `figment::Error`, which names the offending key and provider.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Buffer pool construction or allocation failed.
    #[error("Buffer pool error: {0}")]
    Pool(#[from] scan_pool::PoolError),

    /// Ring buffer construction or windowing failed.
    #[error("Ring buffer error: {0}")]
    Ring(#[from] scan_ring::RingError),

    /// Source registration failed.
    #[error("Source registry error: {0}")]
    Registry(#[from] scan_source::RegistryError),

    /// A source driver failed to open or read.
    #[error("Source error: {0}")]
    Source(#[from] scan_source::SourceError),

    /// No driver is registered under this name.
    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    /// The worker pool rejected work or could not start.
    #[error("Worker pool error: {0}")]
    Worker(#[from] scan_core::WorkerError),

    /// A consumer rejected a task.
    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    /// No consumer with this id is attached.
    #[error("Unknown consumer {0}")]
    UnknownConsumer(u64),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ScanError {
    fn from(err: figment::Error) -> Self {
        ScanError::Config(Box::new(err))
    }
}
