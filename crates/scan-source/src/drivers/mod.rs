//! Built-in source drivers.
//!
//! | Name | Reads | Capabilities |
//! |------|-------|--------------|
//! | `file` | raw IQ capture file | seekable, finite, throttle |
//! | `radio` | radio hardware (no backend compiled in) | real-time, tunable |
//! | `stdin` | raw IQ on standard input | finite |
//! | `tonegen` | synthetic tone plus Gaussian noise | infinite, throttle |

mod file;
mod pacer;
mod radio;
mod raw;
mod stdin;
mod tonegen;

pub use file::FileDriver;
pub use radio::RadioDriver;
pub use stdin::StdinDriver;
pub use tonegen::ToneGenDriver;

use crate::{Result, SourceError};

fn check_sample_rate(sample_rate: f64) -> Result<f64> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(SourceError::Config(format!(
            "sample_rate must be positive, got {sample_rate}"
        )))
    }
}
