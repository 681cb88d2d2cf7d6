//! Raw IQ capture file source.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use scan_core::Sample;
use tracing::{debug, info};

use super::pacer::Pacer;
use super::raw::RawReader;
use crate::{Result, SampleSource, SourceCapabilities, SourceDriver, SourceError, SourceParams};

/// Reads `ci8`, `ci16` or `cf32` interleaved IQ from `params.path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDriver;

impl SourceDriver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn description(&self) -> &'static str {
        "Raw interleaved IQ capture file"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEEKABLE | SourceCapabilities::FINITE | SourceCapabilities::THROTTLE
    }

    fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>> {
        let path = params
            .path
            .as_ref()
            .ok_or_else(|| SourceError::Config("file source requires 'path'".into()))?;
        let sample_rate = super::check_sample_rate(params.sample_rate)?;

        let file = File::open(path)
            .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            format = %params.format,
            looped = params.looped,
            "Capture file opened"
        );

        Ok(Box::new(FileSource {
            reader: Some(RawReader::new(file, params.format)),
            sample_rate,
            frequency: params.frequency,
            looped: params.looped,
            pacer: params.throttle.then(|| Pacer::new(sample_rate)),
        }))
    }
}

struct FileSource {
    reader: Option<RawReader<File>>,
    sample_rate: f64,
    frequency: f64,
    looped: bool,
    pacer: Option<Pacer>,
}

impl FileSource {
    fn rewind(reader: &mut RawReader<File>) -> Result<()> {
        reader.get_mut().seek(SeekFrom::Start(0))?;
        reader.reset();
        debug!("Capture file rewound");
        Ok(())
    }
}

impl SampleSource for FileSource {
    fn read(&mut self, dst: &mut [Sample]) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };

        let mut n = reader.read(dst)?;
        if n == 0 && self.looped && !dst.is_empty() {
            Self::rewind(reader)?;
            // An empty file still ends the stream.
            n = reader.read(dst)?;
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.pace(n);
        }
        Ok(n)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ci16_file(pairs: &[(i16, i16)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for &(i, q) in pairs {
            file.write_all(&i.to_le_bytes()).unwrap();
            file.write_all(&q.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn params(file: &NamedTempFile, looped: bool) -> SourceParams {
        SourceParams {
            path: Some(file.path().to_path_buf()),
            format: scan_core::SampleFormat::Ci16,
            looped,
            ..SourceParams::default()
        }
    }

    #[test]
    fn test_reads_until_eof() {
        let file = ci16_file(&[(16384, -16384), (0, 32767), (-32768, 0)]);
        let mut source = FileDriver.open(&params(&file, false)).unwrap();

        let mut dst = [Sample::default(); 2];
        assert_eq!(source.read(&mut dst).unwrap(), 2);
        assert_eq!(dst[0], Sample::new(0.5, -0.5));
        assert_eq!(source.read(&mut dst).unwrap(), 1);
        assert_eq!(dst[0], Sample::new(-1.0, 0.0));
        assert_eq!(source.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_looped_rewinds() {
        let file = ci16_file(&[(16384, 0)]);
        let mut source = FileDriver.open(&params(&file, true)).unwrap();

        let mut dst = [Sample::default(); 1];
        for _ in 0..5 {
            assert_eq!(source.read(&mut dst).unwrap(), 1);
            assert_eq!(dst[0], Sample::new(0.5, 0.0));
        }
    }

    #[test]
    fn test_looped_empty_file_ends() {
        let file = ci16_file(&[]);
        let mut source = FileDriver.open(&params(&file, true)).unwrap();
        let mut dst = [Sample::default(); 4];
        assert_eq!(source.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_missing_path_is_config_error() {
        let result = FileDriver.open(&SourceParams::default());
        assert!(matches!(result, Err(SourceError::Config(_))));
    }

    #[test]
    fn test_nonexistent_file_is_open_error() {
        let params = SourceParams {
            path: Some("/nonexistent/capture.iq".into()),
            ..SourceParams::default()
        };
        assert!(matches!(FileDriver.open(&params), Err(SourceError::Open(_))));
    }

    #[test]
    fn test_closed_source_reads_nothing() {
        let file = ci16_file(&[(1, 1), (2, 2)]);
        let mut source = FileDriver.open(&params(&file, true)).unwrap();
        source.close().unwrap();
        let mut dst = [Sample::default(); 2];
        assert_eq!(source.read(&mut dst).unwrap(), 0);
    }
}
