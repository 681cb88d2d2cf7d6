//! # sdrscan
//!
//! Streaming core of a software-defined-radio scanner: sources produce
//! complex baseband samples, consumers read them in fixed-size windows and
//! fan each window out to inspection tasks running on a worker pool.
//!
//! ## Crate structure
//!
//! - **`scan_core`**: sample type, on-disk sample formats, worker pool.
//! - **`scan_pool`**: size-class buffer pool handing out [`scan_pool::PooledBuffer`]s.
//! - **`scan_ring`**: mirrored ring buffer whose windows never wrap.
//! - **`scan_source`**: source drivers and the [`SourceRegistry`].
//!
//! This crate ties them together:
//!
//! - **`config`**: layered configuration (defaults, TOML, `SDRSCAN_*` env).
//! - **`context`**: the process-wide pool and registry.
//! - **`port`**: pooled or ring-backed window readers.
//! - **`consumer`**: the read loop, idle throttling and task fan-out.
//! - **`analyzer`**: owns consumers and the worker pool.
//! - **`inspect`**: built-in inspection tasks.
//! - **`telemetry`**: tracing subscriber setup.

pub mod analyzer;
pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod inspect;
pub mod port;
pub mod telemetry;
pub mod window;

pub use analyzer::Analyzer;
pub use config::ScanConfig;
pub use consumer::{
    Consumer, ConsumerError, ConsumerEvent, ConsumerId, ConsumerState, ConsumerStats,
    InspectionTask, TaskContext, TaskError, TaskId, TaskStatus,
};
pub use context::ScanContext;
pub use error::{ScanError, ScanResult};
pub use window::SampleWindow;

pub use scan_core::{Sample, SampleFormat};
pub use scan_source::{SourceCapabilities, SourceParams, SourceRegistry};
