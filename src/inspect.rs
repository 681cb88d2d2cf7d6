//! Built-in inspection tasks.

use crossbeam::channel::Sender;
use scan_core::Sample;
use tracing::{debug, info};

use crate::consumer::{InspectionTask, TaskContext, TaskError, TaskStatus};

/// Floor reported for an all-zero block, in dBFS.
pub const SILENCE_DBFS: f32 = -200.0;

/// Power summary over a block of windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReport {
    /// Stream position just past the last window in the block.
    pub position: u64,
    /// Windows in the block.
    pub windows: u64,
    /// Samples in the block.
    pub samples: u64,
    /// Mean power relative to full scale.
    pub mean_dbfs: f32,
    /// Largest single-sample power relative to full scale.
    pub peak_dbfs: f32,
    /// Windows the ring overwrote before they could be read.
    pub missed: u64,
}

/// Convert linear power (|x|^2 with full scale 1.0) to dBFS.
#[must_use]
pub fn power_dbfs(power: f32) -> f32 {
    if power > 0.0 {
        (10.0 * power.log10()).max(SILENCE_DBFS)
    } else {
        SILENCE_DBFS
    }
}

/// Mean and peak of `|x|^2`.
#[must_use]
pub fn block_power(samples: &[Sample]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let (sum, peak) = samples.iter().fold((0.0f64, 0.0f32), |(sum, peak), s| {
        let p = s.norm_sqr();
        (sum + f64::from(p), peak.max(p))
    });
    ((sum / samples.len() as f64) as f32, peak)
}

/// Logs mean power every `report_every` windows and optionally forwards the
/// report. Runs until `limit` reports have been produced, if set.
#[derive(Debug)]
pub struct PowerMeter {
    report_every: u64,
    limit: Option<u64>,
    sink: Option<Sender<PowerReport>>,
    sum: f64,
    peak: f32,
    samples: u64,
    windows: u64,
    missed: u64,
    reports: u64,
}

impl PowerMeter {
    /// Meter reporting every `report_every` windows (at least 1).
    #[must_use]
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
            limit: None,
            sink: None,
            sum: 0.0,
            peak: 0.0,
            samples: 0,
            windows: 0,
            missed: 0,
            reports: 0,
        }
    }

    /// Also send each report on `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Sender<PowerReport>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Detach after `reports` reports.
    #[must_use]
    pub fn with_limit(mut self, reports: u64) -> Self {
        self.limit = Some(reports);
        self
    }

    /// Box the meter as a consumer task.
    #[must_use]
    pub fn into_task(mut self) -> InspectionTask {
        Box::new(move |ctx: &TaskContext| self.inspect(ctx))
    }

    fn inspect(&mut self, ctx: &TaskContext) -> Result<TaskStatus, TaskError> {
        let window = ctx.window();
        match window.with_samples(block_power) {
            Some((mean, peak)) => {
                self.sum += f64::from(mean) * window.len() as f64;
                self.peak = self.peak.max(peak);
                self.samples += window.len() as u64;
            }
            None => {
                debug!(position = window.position(), "Window overwritten before inspection");
                self.missed += 1;
            }
        }
        self.windows += 1;

        if self.windows < self.report_every {
            return Ok(TaskStatus::Continue);
        }

        let mean = if self.samples > 0 {
            (self.sum / self.samples as f64) as f32
        } else {
            0.0
        };
        let report = PowerReport {
            position: window.end(),
            windows: self.windows,
            samples: self.samples,
            mean_dbfs: power_dbfs(mean),
            peak_dbfs: power_dbfs(self.peak),
            missed: self.missed,
        };
        info!(
            consumer = %ctx.consumer(),
            position = report.position,
            mean_dbfs = format_args!("{:.1}", report.mean_dbfs),
            peak_dbfs = format_args!("{:.1}", report.peak_dbfs),
            missed = report.missed,
            "Power"
        );
        if let Some(sink) = &self.sink {
            sink.send(report)
                .map_err(|_| TaskError::new("power report receiver closed"))?;
        }

        self.reports += 1;
        self.sum = 0.0;
        self.peak = 0.0;
        self.samples = 0;
        self.windows = 0;
        self.missed = 0;

        match self.limit {
            Some(limit) if self.reports >= limit => Ok(TaskStatus::Done),
            _ => Ok(TaskStatus::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{ConsumerId, TaskId};
    use crate::window::SampleWindow;
    use crossbeam::channel::unbounded;
    use scan_pool::{BufferPool, PoolConfig};

    fn context(pool: &BufferPool, position: u64, value: Sample, len: usize) -> TaskContext {
        let mut buffer = pool.alloc(len).unwrap();
        buffer.as_mut_slice().fill(value);
        TaskContext {
            consumer: ConsumerId(0),
            task: TaskId(0),
            window: SampleWindow::pooled(position, buffer.freeze()),
            sample_rate: 1e6,
            frequency: 0.0,
        }
    }

    #[test]
    fn test_power_dbfs() {
        assert!((power_dbfs(1.0) - 0.0).abs() < 1e-6);
        assert!((power_dbfs(0.01) + 20.0).abs() < 1e-4);
        assert_eq!(power_dbfs(0.0), SILENCE_DBFS);
    }

    #[test]
    fn test_block_power() {
        let samples = [Sample::new(1.0, 0.0), Sample::new(0.0, 0.0)];
        assert_eq!(block_power(&samples), (0.5, 1.0));
        assert_eq!(block_power(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_reports_every_n_windows_and_stops_at_limit() {
        let pool = BufferPool::new(&PoolConfig::default()).unwrap();
        let (tx, rx) = unbounded();
        let mut task = PowerMeter::new(2).with_sink(tx).with_limit(2).into_task();

        let half = Sample::new(0.1, 0.0);
        let statuses: Vec<_> = (0..4)
            .map(|i| task(&context(&pool, i * 64, half, 64)).unwrap())
            .collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Continue,
                TaskStatus::Continue,
                TaskStatus::Continue,
                TaskStatus::Done
            ]
        );

        let reports: Vec<_> = rx.try_iter().collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].windows, 2);
        assert_eq!(reports[0].samples, 128);
        assert_eq!(reports[1].position, 256);
        assert!((reports[0].mean_dbfs + 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_closed_sink_fails_task() {
        let pool = BufferPool::new(&PoolConfig::default()).unwrap();
        let (tx, rx) = unbounded();
        drop(rx);
        let mut task = PowerMeter::new(1).with_sink(tx).into_task();
        assert!(task(&context(&pool, 0, Sample::new(1.0, 0.0), 8)).is_err());
    }
}
