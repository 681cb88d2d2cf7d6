//! Paces reads to a nominal sample rate.

use std::thread;
use std::time::{Duration, Instant};

/// Sleeps so that `emitted / sample_rate` never runs ahead of wall time.
#[derive(Debug)]
pub(crate) struct Pacer {
    sample_rate: f64,
    started: Option<Instant>,
    emitted: u64,
}

impl Pacer {
    pub(crate) fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            started: None,
            emitted: 0,
        }
    }

    pub(crate) fn pace(&mut self, samples: usize) {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.emitted += samples as u64;
        let due = Duration::from_secs_f64(self.emitted as f64 / self.sample_rate);
        if let Some(ahead) = due.checked_sub(started.elapsed()) {
            thread::sleep(ahead);
        }
    }
}
