//! Source type registry and sample source drivers.
//!
//! Every kind of upstream sample source (capture file, radio hardware,
//! standard input, synthetic tone) is described by a [`SourceDriver`] and
//! registered once, at startup, in a [`SourceRegistry`]. Registration assigns
//! a compact, stable index; the driver's name is the human-readable handle
//! used by configuration files and the command line.
//!
//! ```
//! use scan_source::SourceRegistry;
//!
//! let registry = SourceRegistry::with_builtin_sources().unwrap();
//! let tonegen = registry.lookup_by_name("tonegen").unwrap();
//! assert_eq!(tonegen.index(), 3);
//! assert_eq!(registry.lookup_by_index(0).unwrap().name(), "file");
//! ```
//!
//! The registry is filled before it is shared and is read-only afterwards,
//! so lookups take no locks.

pub mod capability;
pub mod driver;
pub mod drivers;
pub mod params;
pub mod registry;

pub use capability::SourceCapabilities;
pub use driver::{SampleSource, SourceDriver};
pub use params::SourceParams;
pub use registry::{SourceDescriptor, SourceRegistry};

use thiserror::Error;

/// Result alias for source driver operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Registration failures. The registry is left unchanged when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The next sequential index is already occupied.
    #[error("Source index {0} is already registered")]
    DuplicateIndex(usize),

    /// A driver with this name is already registered.
    #[error("Source '{0}' is already registered")]
    DuplicateName(String),
}

/// Errors raised by source drivers and open sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be opened.
    #[error("Failed to open source: {0}")]
    Open(String),

    /// Reading samples failed.
    #[error("Source read failed: {0}")]
    Read(String),

    /// Parameters are missing or invalid for this driver.
    #[error("Invalid source parameters: {0}")]
    Config(String),

    /// The driver exists but no backend for it is available.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
