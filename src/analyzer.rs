//! Owner of the worker pool and every attached consumer.
//!
//! ```no_run
//! use sdrscan::{Analyzer, ScanConfig, ScanContext};
//! use sdrscan::inspect::PowerMeter;
//!
//! let config = ScanConfig::default();
//! let ctx = ScanContext::init(&config)?;
//! let analyzer = Analyzer::new(ctx, &config)?;
//!
//! let source = analyzer.open_source("tonegen", &config.source.params)?;
//! let id = analyzer.attach_consumer(source)?;
//! analyzer.push_task(id, PowerMeter::new(64).into_task())?;
//! # Ok::<(), sdrscan::ScanError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use scan_core::WorkerPool;
use scan_source::{SampleSource, SourceParams};
use tracing::{debug, info, warn};

use crate::config::{ConsumerConfig, ScanConfig};
use crate::consumer::{Consumer, ConsumerEvent, ConsumerId, InspectionTask, TaskId};
use crate::context::ScanContext;
use crate::error::{ScanError, ScanResult};
use crate::port::open_port;

/// Attaches consumers to sources and routes their events.
pub struct Analyzer {
    ctx: Arc<ScanContext>,
    workers: Arc<WorkerPool>,
    consumer_config: ConsumerConfig,
    consumers: Mutex<BTreeMap<ConsumerId, Arc<Consumer>>>,
    failed: Mutex<BTreeSet<ConsumerId>>,
    next_id: AtomicU64,
    events_tx: Sender<ConsumerEvent>,
    events_rx: Receiver<ConsumerEvent>,
}

impl Analyzer {
    /// Start the worker pool described by `config.workers`.
    pub fn new(ctx: Arc<ScanContext>, config: &ScanConfig) -> ScanResult<Self> {
        let workers = WorkerPool::new(config.workers.name.clone(), config.workers.threads)?;
        let (events_tx, events_rx) = unbounded();
        Ok(Self {
            ctx,
            workers: Arc::new(workers),
            consumer_config: config.consumer.clone(),
            consumers: Mutex::new(BTreeMap::new()),
            failed: Mutex::new(BTreeSet::new()),
            next_id: AtomicU64::new(0),
            events_tx,
            events_rx,
        })
    }

    /// Shared pool and registry.
    #[must_use]
    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    /// Open a source through the driver registered as `kind`.
    pub fn open_source(&self, kind: &str, params: &SourceParams) -> ScanResult<Box<dyn SampleSource>> {
        let descriptor = self.ctx.source(kind)?;
        let source = descriptor.open(params)?;
        debug!(source = kind, index = descriptor.index(), "Source opened");
        Ok(source)
    }

    /// Build the configured read port around `source` and start a consumer.
    pub fn attach_consumer(&self, source: Box<dyn SampleSource>) -> ScanResult<ConsumerId> {
        let port = open_port(source, self.ctx.pool(), &self.consumer_config)?;
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let consumer = Consumer::spawn(
            id,
            id.to_string(),
            port,
            Arc::clone(&self.workers),
            &self.consumer_config,
            self.events_tx.clone(),
        )?;
        self.consumers.lock().insert(id, consumer);
        Ok(id)
    }

    /// Attach a task to a consumer.
    pub fn push_task(&self, id: ConsumerId, task: InspectionTask) -> ScanResult<TaskId> {
        let consumer = self.consumer(id).ok_or(ScanError::UnknownConsumer(id.0))?;
        Ok(consumer.push_task(task)?)
    }

    /// Handle to an attached consumer.
    #[must_use]
    pub fn consumer(&self, id: ConsumerId) -> Option<Arc<Consumer>> {
        self.consumers.lock().get(&id).cloned()
    }

    /// Ids of every attached consumer, ascending.
    #[must_use]
    pub fn consumer_ids(&self) -> Vec<ConsumerId> {
        self.consumers.lock().keys().copied().collect()
    }

    /// Detach and forget a consumer.
    pub fn detach_consumer(&self, id: ConsumerId) -> ScanResult<()> {
        let consumer = self
            .consumers
            .lock()
            .remove(&id)
            .ok_or(ScanError::UnknownConsumer(id.0))?;
        consumer.detach();
        self.failed.lock().remove(&id);
        Ok(())
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&self) -> Vec<ConsumerEvent> {
        let events: Vec<_> = self.events_rx.try_iter().collect();
        for event in &events {
            self.record(event);
        }
        events
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Option<ConsumerEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.record(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Consumers reported failed by events seen so far, ascending.
    #[must_use]
    pub fn failed_consumers(&self) -> Vec<ConsumerId> {
        self.failed.lock().iter().copied().collect()
    }

    fn record(&self, event: &ConsumerEvent) {
        match event {
            ConsumerEvent::TaskFailed {
                consumer,
                task,
                message,
            } => {
                warn!(consumer = %consumer, task = %task, error = %message, "Consumer failed");
                self.failed.lock().insert(*consumer);
            }
            ConsumerEvent::SourceFailed { consumer, message } => {
                warn!(consumer = %consumer, error = %message, "Consumer source failed");
                self.failed.lock().insert(*consumer);
            }
            ConsumerEvent::EndOfStream { consumer } => {
                info!(consumer = %consumer, "End of stream");
            }
            ConsumerEvent::Stopped { consumer } => {
                debug!(consumer = %consumer, "Consumer idle");
            }
        }
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for consumer in consumers.values() {
            consumer.detach();
        }
        drop(consumers);
        self.workers.shutdown();
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("workers", &self.workers)
            .field("consumers", &self.consumer_ids())
            .field("failed", &self.failed_consumers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{TaskContext, TaskError, TaskStatus};
    use tracing_test::traced_test;

    fn analyzer() -> Analyzer {
        let config = ScanConfig::from_toml_str(
            "[consumer]\nwindow_len = 256\nidle_cycles = 3\n[workers]\nthreads = 1",
        )
        .unwrap();
        Analyzer::new(ScanContext::init(&config).unwrap(), &config).unwrap()
    }

    fn tone() -> SourceParams {
        SourceParams {
            sample_rate: 1e6,
            seed: Some(1),
            ..SourceParams::default()
        }
    }

    #[test]
    fn test_unknown_source_and_consumer() {
        let analyzer = analyzer();
        assert!(matches!(
            analyzer.open_source("hackrf", &tone()),
            Err(ScanError::UnknownSource(_))
        ));
        assert!(matches!(
            analyzer.detach_consumer(ConsumerId(9)),
            Err(ScanError::UnknownConsumer(9))
        ));
        let task: InspectionTask = Box::new(|_: &TaskContext| Ok(TaskStatus::Done));
        assert!(matches!(
            analyzer.push_task(ConsumerId(9), task),
            Err(ScanError::UnknownConsumer(9))
        ));
    }

    #[test]
    #[traced_test]
    fn test_attach_is_logged() {
        let analyzer = analyzer();
        let id = analyzer
            .attach_consumer(analyzer.open_source("tonegen", &tone()).unwrap())
            .unwrap();
        assert!(logs_contain("Consumer attached"));

        analyzer.detach_consumer(id).unwrap();
        assert!(logs_contain("Consumer detached"));
    }

    #[test]
    fn test_consumer_ids_are_sequential() {
        let analyzer = analyzer();
        let a = analyzer.attach_consumer(analyzer.open_source("tonegen", &tone()).unwrap()).unwrap();
        let b = analyzer.attach_consumer(analyzer.open_source("tonegen", &tone()).unwrap()).unwrap();
        assert_eq!((a, b), (ConsumerId(0), ConsumerId(1)));
        assert_eq!(analyzer.consumer(b).unwrap().name(), "consumer-1");

        analyzer.detach_consumer(a).unwrap();
        assert_eq!(analyzer.consumer_ids(), vec![b]);
        assert!(analyzer.consumer(a).is_none());
    }

    #[test]
    fn test_task_failure_is_recorded() {
        let analyzer = analyzer();
        let id = analyzer
            .attach_consumer(analyzer.open_source("tonegen", &tone()).unwrap())
            .unwrap();
        analyzer
            .push_task(id, Box::new(|_: &TaskContext| Err(TaskError::new("bad window"))))
            .unwrap();

        let event = analyzer.next_event(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, ConsumerEvent::TaskFailed { consumer, .. } if consumer == id));
        assert_eq!(analyzer.failed_consumers(), vec![id]);
        assert!(analyzer.consumer(id).unwrap().is_failed());

        analyzer.detach_consumer(id).unwrap();
        assert!(analyzer.failed_consumers().is_empty());
    }
}
