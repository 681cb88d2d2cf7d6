//! Radio hardware facade.

use tracing::warn;

use crate::{Result, SampleSource, SourceCapabilities, SourceDriver, SourceError, SourceParams};

/// Registered so that the `radio` name and index are stable, but no hardware
/// backend is compiled into this build, so opening always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadioDriver;

impl SourceDriver for RadioDriver {
    fn name(&self) -> &'static str {
        "radio"
    }

    fn description(&self) -> &'static str {
        "Radio hardware (no backend in this build)"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::REAL_TIME | SourceCapabilities::TUNABLE
    }

    fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>> {
        warn!(frequency = params.frequency, "Radio source requested without a hardware backend");
        Err(SourceError::Unavailable(
            "no radio hardware backend is compiled into this build".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_unavailable() {
        let result = RadioDriver.open(&SourceParams::default());
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
