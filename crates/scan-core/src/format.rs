//! Raw interleaved IQ sample encodings.
//!
//! Hardware captures and pipes deliver samples as interleaved I/Q pairs in one
//! of a few fixed encodings. Integer encodings are scaled to `[-1.0, 1.0)`.

use std::fmt;
use std::str::FromStr;

use bytes::Buf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Sample;

/// Error returned when parsing an unknown format name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown sample format '{0}'. Must be one of: ci8, ci16, cf32")]
pub struct FormatError(pub String);

/// Encoding of one interleaved IQ sample on the wire or on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 8-bit I and Q.
    Ci8,
    /// Signed 16-bit little-endian I and Q.
    Ci16,
    /// 32-bit little-endian float I and Q.
    #[default]
    Cf32,
}

impl SampleFormat {
    /// Number of bytes one encoded sample occupies.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    /// Lowercase name used in configuration files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::Ci8 => "ci8",
            SampleFormat::Ci16 => "ci16",
            SampleFormat::Cf32 => "cf32",
        }
    }

    /// Decode as many whole samples as fit in both `src` and `dst`.
    ///
    /// Returns the number of samples written to `dst`. Trailing bytes that do
    /// not form a whole sample are left in `src`.
    pub fn decode_into<B: Buf>(self, src: &mut B, dst: &mut [Sample]) -> usize {
        let count = (src.remaining() / self.bytes_per_sample()).min(dst.len());
        for slot in &mut dst[..count] {
            *slot = match self {
                SampleFormat::Ci8 => {
                    let i = f32::from(src.get_i8()) / 128.0;
                    let q = f32::from(src.get_i8()) / 128.0;
                    Sample::new(i, q)
                }
                SampleFormat::Ci16 => {
                    let i = f32::from(src.get_i16_le()) / 32768.0;
                    let q = f32::from(src.get_i16_le()) / 32768.0;
                    Sample::new(i, q)
                }
                SampleFormat::Cf32 => Sample::new(src.get_f32_le(), src.get_f32_le()),
            };
        }
        count
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ci8" | "s8" => Ok(SampleFormat::Ci8),
            "ci16" | "s16" => Ok(SampleFormat::Ci16),
            "cf32" | "f32" => Ok(SampleFormat::Cf32),
            _ => Err(FormatError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ci8_scaling() {
        let raw: &[u8] = &[0x80, 0x40, 0x00, 0x7f];
        let mut src = raw;
        let mut dst = [Sample::default(); 4];

        let n = SampleFormat::Ci8.decode_into(&mut src, &mut dst);
        assert_eq!(n, 2);
        assert_eq!(dst[0], Sample::new(-1.0, 0.5));
        assert_eq!(dst[1].re, 0.0);
        assert!((dst[1].im - 127.0 / 128.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_ci16_little_endian() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&16384i16.to_le_bytes());
        raw.extend_from_slice(&(-32768i16).to_le_bytes());
        let mut src = raw.as_slice();
        let mut dst = [Sample::default(); 1];

        assert_eq!(SampleFormat::Ci16.decode_into(&mut src, &mut dst), 1);
        assert_eq!(dst[0], Sample::new(0.5, -1.0));
    }

    #[test]
    fn test_decode_leaves_partial_sample() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1.5f32.to_le_bytes());
        raw.extend_from_slice(&(-0.25f32).to_le_bytes());
        raw.extend_from_slice(&[1, 2, 3]);
        let mut src = raw.as_slice();
        let mut dst = [Sample::default(); 8];

        assert_eq!(SampleFormat::Cf32.decode_into(&mut src, &mut dst), 1);
        assert_eq!(dst[0], Sample::new(1.5, -0.25));
        assert_eq!(src.remaining(), 3);
    }

    #[test]
    fn test_decode_bounded_by_destination() {
        let raw = [0u8; 64];
        let mut src = &raw[..];
        let mut dst = [Sample::new(9.0, 9.0); 3];

        assert_eq!(SampleFormat::Ci8.decode_into(&mut src, &mut dst), 3);
        assert_eq!(src.remaining(), 58);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("CI16".parse::<SampleFormat>(), Ok(SampleFormat::Ci16));
        assert_eq!("f32".parse::<SampleFormat>(), Ok(SampleFormat::Cf32));
        assert!("cu8".parse::<SampleFormat>().is_err());
        assert_eq!(SampleFormat::Ci8.to_string(), "ci8");
    }
}
