//! Layered configuration using Figment.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults (`ScanConfig::default()`)
//! 2. a TOML file (missing files are skipped)
//! 3. environment variables prefixed with `SDRSCAN_`, nested keys separated
//!    by `__` (e.g. `SDRSCAN_CONSUMER__IDLE_CYCLES=60`)
//!
//! # Example
//! ```no_run
//! use sdrscan::config::ScanConfig;
//!
//! let config = ScanConfig::load_from("config/sdrscan.toml")?;
//! println!("source: {}", config.source.kind);
//! # Ok::<(), sdrscan::ScanError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use scan_pool::{PoolConfig, CLASS_LIMIT};
use scan_ring::RingBuffer;
use scan_source::SourceParams;
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Logging settings
    pub log: LogConfig,
    /// Buffer pool size classes
    pub pool: PoolConfig,
    /// Worker pool running inspection tasks
    pub workers: WorkerConfig,
    /// Consumer read loop and idle policy
    pub consumer: ConsumerConfig,
    /// Source opened by `sdrscan run`
    pub source: SourceConfig,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// `[workers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Thread name prefix.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            name: "scan-worker".to_string(),
        }
    }
}

/// How a consumer obtains its sample windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// One pooled buffer per window.
    #[default]
    Pooled,
    /// Windows are regions of a shared ring buffer.
    Ring,
}

/// `[consumer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Read cycles to keep going after the last task detaches.
    pub idle_cycles: u32,
    /// Samples per read.
    pub window_len: usize,
    /// Window backing.
    pub port: PortKind,
    /// Ring capacity in windows (`port = "ring"`).
    pub ring_windows: usize,
    /// Upper bound on waiting for in-flight tasks when detaching.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            idle_cycles: 30,
            window_len: 4096,
            port: PortKind::Pooled,
            ring_windows: 16,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

impl ConsumerConfig {
    /// Ring capacity in samples for the ring port.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        RingBuffer::capacity_for(self.window_len.saturating_mul(self.ring_windows))
    }
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Registered driver name.
    pub kind: String,
    /// Parameters passed to the driver.
    pub params: SourceParams,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "tonegen".to_string(),
            params: SourceParams {
                throttle: true,
                ..SourceParams::default()
            },
        }
    }
}

impl ScanConfig {
    /// Defaults, then `path` if it exists, then `SDRSCAN_*` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        Self::from_figment(
            Self::base()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("SDRSCAN_").split("__")),
        )
    }

    /// Defaults overridden by an inline TOML document.
    pub fn from_toml_str(toml: &str) -> ScanResult<Self> {
        Self::from_figment(Self::base().merge(Toml::string(toml)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(ScanConfig::default()))
    }

    fn from_figment(figment: Figment) -> ScanResult<Self> {
        let config: ScanConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> ScanResult<()> {
        let level = self.log.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(ScanError::Configuration(format!(
                "Invalid log.level '{}'. Must be one of: {}",
                self.log.level,
                VALID_LEVELS.join(", ")
            )));
        }

        if self.pool.max_class > CLASS_LIMIT {
            return Err(ScanError::Configuration(format!(
                "pool.max_class {} exceeds {CLASS_LIMIT}",
                self.pool.max_class
            )));
        }
        let classes = self
            .pool
            .classes()
            .map_err(|e| ScanError::Configuration(e.to_string()))?;

        if self.workers.threads == 0 {
            return Err(ScanError::Configuration(
                "workers.threads must be at least 1".into(),
            ));
        }

        let consumer = &self.consumer;
        if consumer.idle_cycles == 0 {
            return Err(ScanError::Configuration(
                "consumer.idle_cycles must be at least 1".into(),
            ));
        }
        if consumer.window_len == 0 {
            return Err(ScanError::Configuration(
                "consumer.window_len must be at least 1".into(),
            ));
        }
        if consumer.window_len > classes.max_len() {
            return Err(ScanError::Configuration(format!(
                "consumer.window_len {} exceeds the largest pool size class ({} samples)",
                consumer.window_len,
                classes.max_len()
            )));
        }
        if consumer.port == PortKind::Ring && consumer.ring_windows < 2 {
            return Err(ScanError::Configuration(
                "consumer.ring_windows must be at least 2".into(),
            ));
        }

        if self.source.kind.is_empty() {
            return Err(ScanError::Configuration("source.kind is empty".into()));
        }

        Ok(())
    }
}
