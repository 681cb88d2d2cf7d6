//! Read ports: where a consumer's sample windows come from.
//!
//! A port owns an open [`SampleSource`] and turns each read into a
//! [`SampleWindow`]. [`PooledPort`] reads into a fresh pooled buffer per
//! window; [`RingPort`] reads straight into a mirrored ring so windows never
//! need wraparound handling.

use scan_core::Sample;
use scan_pool::BufferPool;
use scan_ring::{split, RingBuffer, RingWriter};
use scan_source::SampleSource;
use tracing::{debug, info};

use crate::config::{ConsumerConfig, PortKind};
use crate::error::{ScanError, ScanResult};
use crate::window::SampleWindow;

/// Produces sample windows for a consumer's read loop.
pub trait ReadPort: Send {
    /// Read the next window. `Ok(None)` means end of stream.
    fn read_window(&mut self) -> ScanResult<Option<SampleWindow>>;

    /// Samples requested per read.
    fn window_len(&self) -> usize;

    /// Nominal sample rate of the source in Hz.
    fn sample_rate(&self) -> f64;

    /// Center frequency of the source in Hz.
    fn frequency(&self) -> f64;

    /// Close the underlying source.
    fn close(&mut self) -> ScanResult<()>;
}

/// Build the port selected by `config.port` around an open source.
pub fn open_port(
    source: Box<dyn SampleSource>,
    pool: &BufferPool,
    config: &ConsumerConfig,
) -> ScanResult<Box<dyn ReadPort>> {
    match config.port {
        PortKind::Pooled => Ok(Box::new(PooledPort::new(source, pool.clone(), config.window_len)?)),
        PortKind::Ring => Ok(Box::new(RingPort::new(
            source,
            config.window_len,
            config.ring_capacity(),
        )?)),
    }
}

/// One pooled buffer per window.
pub struct PooledPort {
    source: Box<dyn SampleSource>,
    pool: BufferPool,
    window_len: usize,
    position: u64,
}

impl PooledPort {
    /// Fails if `window_len` exceeds the pool's largest size class.
    pub fn new(source: Box<dyn SampleSource>, pool: BufferPool, window_len: usize) -> ScanResult<Self> {
        if window_len == 0 || window_len > pool.max_len() {
            return Err(ScanError::Pool(scan_pool::PoolError::AllocationTooLarge {
                requested: window_len,
                max: pool.max_len(),
            }));
        }
        // Two windows in flight is the common steady state.
        pool.preallocate(window_len, 2)?;
        debug!(window_len, "Pooled read port ready");
        Ok(Self {
            source,
            pool,
            window_len,
            position: 0,
        })
    }
}

impl ReadPort for PooledPort {
    fn read_window(&mut self) -> ScanResult<Option<SampleWindow>> {
        let mut buffer = self.pool.alloc(self.window_len)?;
        let n = self.source.read(buffer.as_mut_slice())?;
        if n == 0 {
            return Ok(None);
        }
        buffer.truncate(n);

        let window = SampleWindow::pooled(self.position, buffer.freeze());
        self.position += n as u64;
        Ok(Some(window))
    }

    fn window_len(&self) -> usize {
        self.window_len
    }

    fn sample_rate(&self) -> f64 {
        self.source.sample_rate()
    }

    fn frequency(&self) -> f64 {
        self.source.frequency()
    }

    fn close(&mut self) -> ScanResult<()> {
        Ok(self.source.close()?)
    }
}

/// Windows are consecutive regions of one shared ring.
pub struct RingPort {
    source: Box<dyn SampleSource>,
    writer: RingWriter,
    window_len: usize,
}

impl RingPort {
    /// `capacity` must be page-aligned and hold at least two windows.
    pub fn new(source: Box<dyn SampleSource>, window_len: usize, capacity: usize) -> ScanResult<Self> {
        if window_len == 0 || window_len.saturating_mul(2) > capacity {
            return Err(ScanError::Ring(scan_ring::RingError::WindowTooLarge {
                len: window_len.saturating_mul(2),
                capacity,
            }));
        }
        let ring = RingBuffer::new(capacity)?;
        info!(window_len, capacity, backend = %ring.backend(), "Ring read port ready");
        let (writer, _) = split(ring);
        Ok(Self {
            source,
            writer,
            window_len,
        })
    }
}

impl ReadPort for RingPort {
    fn read_window(&mut self) -> ScanResult<Option<SampleWindow>> {
        let source = &mut self.source;
        let span = self
            .writer
            .fill(self.window_len, |dst: &mut [Sample]| -> ScanResult<usize> {
                Ok(source.read(dst)?)
            })?;
        if span.len == 0 {
            return Ok(None);
        }
        Ok(Some(SampleWindow::ring(span, self.writer.reader())))
    }

    fn window_len(&self) -> usize {
        self.window_len
    }

    fn sample_rate(&self) -> f64 {
        self.source.sample_rate()
    }

    fn frequency(&self) -> f64 {
        self.source.frequency()
    }

    fn close(&mut self) -> ScanResult<()> {
        Ok(self.source.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_pool::PoolConfig;
    use scan_source::Result as SourceResult;

    /// Counts up from zero, `total` samples in all.
    struct Counter {
        next: u64,
        total: u64,
    }

    impl SampleSource for Counter {
        fn read(&mut self, dst: &mut [Sample]) -> SourceResult<usize> {
            let n = (self.total - self.next).min(dst.len() as u64) as usize;
            for slot in &mut dst[..n] {
                *slot = Sample::new(self.next as f32, 0.0);
                self.next += 1;
            }
            Ok(n)
        }

        fn sample_rate(&self) -> f64 {
            1_000.0
        }

        fn frequency(&self) -> f64 {
            0.0
        }
    }

    fn counter(total: u64) -> Box<dyn SampleSource> {
        Box::new(Counter { next: 0, total })
    }

    fn assert_counts(window: &SampleWindow) {
        let samples = window.to_vec().unwrap();
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.re as u64, window.position() + i as u64);
        }
    }

    #[test]
    fn test_pooled_port_positions_and_short_tail() {
        let pool = BufferPool::new(&PoolConfig::default()).unwrap();
        let mut port = PooledPort::new(counter(250), pool, 100).unwrap();

        let mut lens = Vec::new();
        while let Some(window) = port.read_window().unwrap() {
            assert_counts(&window);
            lens.push((window.position(), window.len()));
        }
        assert_eq!(lens, vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[test]
    fn test_pooled_port_rejects_oversized_window() {
        let pool = BufferPool::new(&PoolConfig::default()).unwrap();
        let too_big = pool.max_len() + 1;
        assert!(PooledPort::new(counter(1), pool, too_big).is_err());
    }

    #[test]
    fn test_ring_port_windows_cross_the_wrap() {
        let capacity = RingBuffer::capacity_for(1);
        let window_len = capacity / 3 + 1;
        let mut port = RingPort::new(counter(10 * capacity as u64), window_len, capacity).unwrap();

        let mut expected = 0;
        for _ in 0..12 {
            let window = port.read_window().unwrap().unwrap();
            assert_eq!(window.position(), expected);
            assert_counts(&window);
            expected += window.len() as u64;
        }
    }

    #[test]
    fn test_ring_port_end_of_stream() {
        let capacity = RingBuffer::capacity_for(1);
        let mut port = RingPort::new(counter(10), 8, capacity).unwrap();
        assert_eq!(port.read_window().unwrap().unwrap().len(), 8);
        assert_eq!(port.read_window().unwrap().unwrap().len(), 2);
        assert!(port.read_window().unwrap().is_none());
    }

    #[test]
    fn test_ring_port_needs_two_windows() {
        let capacity = RingBuffer::capacity_for(1);
        assert!(RingPort::new(counter(1), capacity, capacity).is_err());
    }
}
