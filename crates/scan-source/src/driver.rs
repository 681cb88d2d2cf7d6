//! Driver and open-source traits.

use scan_core::Sample;

use crate::{Result, SourceCapabilities, SourceParams};

/// A kind of sample source. One instance per kind lives in the registry.
///
/// Drivers are shared across threads and must not keep per-stream state;
/// everything stream-specific lives in the [`SampleSource`] returned by
/// [`SourceDriver::open`].
pub trait SourceDriver: Send + Sync + 'static {
    /// Unique name, e.g. `"file"`.
    fn name(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    /// What sources opened by this driver can do.
    fn capabilities(&self) -> SourceCapabilities;

    /// Open a new stream.
    fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>>;
}

/// An open stream of complex samples.
pub trait SampleSource: Send {
    /// Fill the front of `dst` and return how many samples were written.
    ///
    /// `Ok(0)` with a non-empty `dst` means end of stream.
    fn read(&mut self, dst: &mut [Sample]) -> Result<usize>;

    /// Nominal sample rate in Hz.
    fn sample_rate(&self) -> f64;

    /// Center frequency in Hz.
    fn frequency(&self) -> f64;

    /// Release the stream. Reads after `close` report end of stream.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
