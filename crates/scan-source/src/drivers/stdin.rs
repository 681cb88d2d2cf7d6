//! Raw IQ on standard input.

use std::io::{self, Stdin};

use scan_core::Sample;
use tracing::info;

use super::raw::RawReader;
use crate::{Result, SampleSource, SourceCapabilities, SourceDriver, SourceParams};

/// Reads interleaved IQ piped into the process, e.g. from `rtl_sdr -`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinDriver;

impl SourceDriver for StdinDriver {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn description(&self) -> &'static str {
        "Raw interleaved IQ on standard input"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FINITE
    }

    fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>> {
        let sample_rate = super::check_sample_rate(params.sample_rate)?;
        info!(format = %params.format, "Reading samples from standard input");
        Ok(Box::new(StdinSource {
            reader: Some(RawReader::new(io::stdin(), params.format)),
            sample_rate,
            frequency: params.frequency,
        }))
    }
}

struct StdinSource {
    reader: Option<RawReader<Stdin>>,
    sample_rate: f64,
    frequency: f64,
}

impl SampleSource for StdinSource {
    fn read(&mut self, dst: &mut [Sample]) -> Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => Ok(reader.read(dst)?),
            None => Ok(0),
        }
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
