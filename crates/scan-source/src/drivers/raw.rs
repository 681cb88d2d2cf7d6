//! Raw interleaved IQ decoding over any byte stream.

use std::io::{self, Read};

use bytes::BytesMut;
use scan_core::{Sample, SampleFormat};
use tracing::debug;

/// Reads encoded samples from `inner` and decodes them into windows.
#[derive(Debug)]
pub(crate) struct RawReader<R> {
    inner: R,
    format: SampleFormat,
    pending: BytesMut,
    chunk: Vec<u8>,
}

impl<R: Read> RawReader<R> {
    pub(crate) fn new(inner: R, format: SampleFormat) -> Self {
        Self {
            inner,
            format,
            pending: BytesMut::new(),
            chunk: Vec::new(),
        }
    }

    /// Fill `dst` as far as the stream allows. Returns 0 only at end of stream.
    pub(crate) fn read(&mut self, dst: &mut [Sample]) -> io::Result<usize> {
        let want = dst.len() * self.format.bytes_per_sample();
        while self.pending.len() < want {
            self.chunk.resize(want - self.pending.len(), 0);
            let n = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                break;
            }
            self.pending.extend_from_slice(&self.chunk[..n]);
        }

        let decoded = self.format.decode_into(&mut self.pending, dst);
        if decoded == 0 && !self.pending.is_empty() && !dst.is_empty() {
            debug!(
                trailing = self.pending.len(),
                format = %self.format,
                "Dropping partial sample at end of stream"
            );
            self.pending.clear();
        }
        Ok(decoded)
    }

    /// Drop buffered bytes, e.g. after seeking the inner stream.
    pub(crate) fn reset(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Delivers at most `step` bytes per read.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_short_reads_are_reassembled() {
        let bytes: Vec<u8> = [0i8, 64, -128, 127, 32, -32]
            .iter()
            .map(|&b| b as u8)
            .collect();
        let mut reader = RawReader::new(
            Trickle {
                data: Cursor::new(bytes),
                step: 1,
            },
            SampleFormat::Ci8,
        );

        let mut dst = [Sample::default(); 4];
        assert_eq!(reader.read(&mut dst).unwrap(), 3);
        assert_eq!(dst[0], Sample::new(0.0, 0.5));
        assert_eq!(dst[1], Sample::new(-1.0, 127.0 / 128.0));
        assert_eq!(reader.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_trailing_partial_sample_ends_stream() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = RawReader::new(Cursor::new(bytes), SampleFormat::Cf32);

        let mut dst = [Sample::default(); 2];
        assert_eq!(reader.read(&mut dst).unwrap(), 1);
        assert_eq!(dst[0], Sample::new(1.0, 2.0));
        assert_eq!(reader.read(&mut dst).unwrap(), 0);
    }
}
