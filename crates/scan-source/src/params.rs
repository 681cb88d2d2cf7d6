//! Parameters handed to a driver when a source is opened.

use std::path::PathBuf;

use scan_core::SampleFormat;
use serde::{Deserialize, Serialize};

/// Default sample rate in samples per second.
pub const DEFAULT_SAMPLE_RATE: f64 = 2_048_000.0;

/// Open-time parameters shared by all drivers. Each driver reads the fields
/// it understands and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceParams {
    /// Capture file to read (`file` driver).
    pub path: Option<PathBuf>,
    /// Encoding of raw IQ input (`file`, `stdin`).
    pub format: SampleFormat,
    /// Nominal sample rate in Hz.
    pub sample_rate: f64,
    /// Center frequency in Hz, reported by the source.
    pub frequency: f64,
    /// Tone offset from center in Hz (`tonegen`).
    pub tone_frequency: f64,
    /// Tone amplitude, full scale is 1.0 (`tonegen`).
    pub amplitude: f32,
    /// Standard deviation of the complex noise (`tonegen`).
    pub noise_level: f32,
    /// RNG seed; `None` seeds from the OS (`tonegen`).
    pub seed: Option<u64>,
    /// Rewind at end of file instead of ending the stream (`file`).
    pub looped: bool,
    /// Pace reads to `sample_rate` on sources that support it.
    pub throttle: bool,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            path: None,
            format: SampleFormat::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            frequency: 0.0,
            tone_frequency: 100_000.0,
            amplitude: 0.5,
            noise_level: 0.01,
            seed: None,
            looped: false,
            throttle: false,
        }
    }
}
