//! Consumer: one read loop per source, fanning windows out to tasks.
//!
//! A consumer owns a [`ReadPort`] and a dedicated read thread. Each cycle it
//! reads one [`SampleWindow`], publishes it as the current window and hands
//! it to every attached [`InspectionTask`] on the shared [`WorkerPool`].
//!
//! ## Idle throttling
//!
//! Reading starts when the first task is pushed. When the last task detaches
//! the consumer keeps reading for `idle_cycles` more cycles and then stops
//! until a task arrives again (see [`schedule`]).
//!
//! ## Locking
//!
//! The task count lives in an [`IdleSchedule`] behind a re-entrant mutex.
//! Task completion on a worker thread updates the schedule and then calls
//! [`Consumer::remove_task`], which takes the same lock again; the read loop
//! does the same when the worker pool rejects a job mid-dispatch.
//!
//! ## Backpressure
//!
//! A task still busy with an earlier window skips the current one; the skip
//! is counted in [`ConsumerStats::windows_skipped`].

pub mod schedule;
pub mod task;

pub use schedule::{ConsumerState, Cycle, IdleSchedule};
pub use task::{InspectionTask, TaskContext, TaskError, TaskId, TaskStatus};

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use scan_core::{WorkerError, WorkerPool};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::ConsumerConfig;
use crate::port::ReadPort;
use crate::window::SampleWindow;

/// Identifies a consumer within its analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Reasons a consumer rejects work.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// A task or the source failed; the consumer does not resume.
    #[error("Consumer {0} has failed")]
    Failed(ConsumerId),

    /// The consumer was detached.
    #[error("Consumer {0} is detached")]
    Detached(ConsumerId),

    /// The source reached end of stream.
    #[error("Consumer {0} reached end of stream")]
    EndOfStream(ConsumerId),

    /// The worker pool rejected a job.
    #[error("Worker pool rejected task: {0}")]
    Worker(#[from] WorkerError),

    /// The read thread could not be started.
    #[error("Failed to spawn read thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Notifications sent to the owning analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// A task returned an error or panicked. The consumer is now failed.
    TaskFailed {
        /// Consumer that ran the task
        consumer: ConsumerId,
        /// The failing task
        task: TaskId,
        /// Error text
        message: String,
    },
    /// Reading from the source failed. The consumer is now failed.
    SourceFailed {
        /// Consumer whose source failed
        consumer: ConsumerId,
        /// Error text
        message: String,
    },
    /// The source has no more samples.
    EndOfStream {
        /// Consumer whose source ended
        consumer: ConsumerId,
    },
    /// The idle countdown ran out and reading stopped.
    Stopped {
        /// Consumer that stopped
        consumer: ConsumerId,
    },
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Windows read from the port.
    pub windows_read: u64,
    /// Samples read from the port.
    pub samples_read: u64,
    /// Windows read while no task was attached.
    pub idle_reads: u64,
    /// Jobs handed to the worker pool.
    pub tasks_dispatched: u64,
    /// Task/window pairs skipped because the task was still busy.
    pub windows_skipped: u64,
}

#[derive(Default)]
struct Counters {
    windows_read: AtomicU64,
    samples_read: AtomicU64,
    idle_reads: AtomicU64,
    tasks_dispatched: AtomicU64,
    windows_skipped: AtomicU64,
}

struct TaskSlot {
    id: TaskId,
    busy: AtomicBool,
    task: Mutex<InspectionTask>,
}

struct Shared {
    id: ConsumerId,
    name: String,
    schedule: ReentrantMutex<RefCell<IdleSchedule>>,
    tasks: Mutex<Vec<Arc<TaskSlot>>>,
    next_task: AtomicU64,
    current: Mutex<Option<SampleWindow>>,
    /// Bumped on every wake-up reason; the read loop waits for a change.
    wake: Mutex<u64>,
    wake_cv: Condvar,
    stopping: AtomicBool,
    ended: AtomicBool,
    in_flight: Mutex<usize>,
    drained: Condvar,
    workers: Arc<WorkerPool>,
    events: Sender<ConsumerEvent>,
    counters: Counters,
    sample_rate: f64,
    frequency: f64,
}

/// A read loop plus the tasks attached to it.
pub struct Consumer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl Consumer {
    /// Start the read loop for `port` on a thread named `name`.
    ///
    /// The loop idles until the first task is pushed.
    pub fn spawn(
        id: ConsumerId,
        name: impl Into<String>,
        port: Box<dyn ReadPort>,
        workers: Arc<WorkerPool>,
        config: &ConsumerConfig,
        events: Sender<ConsumerEvent>,
    ) -> Result<Arc<Self>, ConsumerError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            id,
            name: name.clone(),
            schedule: ReentrantMutex::new(RefCell::new(IdleSchedule::new(config.idle_cycles))),
            tasks: Mutex::new(Vec::new()),
            next_task: AtomicU64::new(0),
            current: Mutex::new(None),
            wake: Mutex::new(0),
            wake_cv: Condvar::new(),
            stopping: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
            workers,
            events,
            counters: Counters::default(),
            sample_rate: port.sample_rate(),
            frequency: port.frequency(),
        });

        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || loop_shared.read_loop(port))?;

        info!(
            consumer = %id,
            name,
            window_len = config.window_len,
            idle_cycles = config.idle_cycles,
            "Consumer attached"
        );

        Ok(Arc::new(Self {
            shared,
            thread: Mutex::new(Some(handle)),
            drain_timeout: config.drain_timeout,
        }))
    }

    /// Attach a task. It receives every window read from now on that it is
    /// not still busy for.
    pub fn push_task(&self, task: InspectionTask) -> Result<TaskId, ConsumerError> {
        self.shared.push_task(task)
    }

    /// Detach a task. Returns false if it was not attached.
    pub fn remove_task(&self, task: TaskId) -> bool {
        self.shared.remove_task(task)
    }

    /// Window published by the most recent read, if any.
    #[must_use]
    pub fn current_window(&self) -> Option<SampleWindow> {
        self.shared.current.lock().clone()
    }

    /// Length of the current window, 0 if none.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.shared.current.lock().as_ref().map_or(0, SampleWindow::len)
    }

    /// Stream position of the current window, 0 if none.
    #[must_use]
    pub fn buffer_position(&self) -> u64 {
        self.shared
            .current
            .lock()
            .as_ref()
            .map_or(0, SampleWindow::position)
    }

    /// Consumer id.
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.shared.id
    }

    /// Read thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current scheduling state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        let guard = self.shared.schedule.lock();
        let state = guard.borrow().state();
        state
    }

    /// Whether a task or the source has failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state() == ConsumerState::Failed
    }

    /// Attached task count.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        let guard = self.shared.schedule.lock();
        let outstanding = guard.borrow().outstanding();
        outstanding
    }

    /// Jobs dispatched to the worker pool and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ConsumerStats {
        let c = &self.shared.counters;
        ConsumerStats {
            windows_read: c.windows_read.load(Ordering::Relaxed),
            samples_read: c.samples_read.load(Ordering::Relaxed),
            idle_reads: c.idle_reads.load(Ordering::Relaxed),
            tasks_dispatched: c.tasks_dispatched.load(Ordering::Relaxed),
            windows_skipped: c.windows_skipped.load(Ordering::Relaxed),
        }
    }

    /// Whether `detach` has been called.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.shared.stopping.load(Ordering::SeqCst)
    }

    /// Stop reading, join the read thread, wait up to `drain_timeout` for
    /// dispatched jobs and release the current window. Idempotent.
    pub fn detach(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.wake_up();

        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                warn!(consumer = %self.shared.id, "Detach called from the read thread; not joining");
            } else if let Err(e) = handle.join() {
                error!(consumer = %self.shared.id, "Read thread panicked: {:?}", e);
            }
        }

        let deadline = Instant::now() + self.drain_timeout;
        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            if self.shared.drained.wait_until(&mut in_flight, deadline).timed_out() {
                warn!(
                    consumer = %self.shared.id,
                    in_flight = *in_flight,
                    "Detached with tasks still running"
                );
                break;
            }
        }
        drop(in_flight);

        *self.shared.current.lock() = None;

        let stats = self.stats();
        info!(
            consumer = %self.shared.id,
            windows = stats.windows_read,
            samples = stats.samples_read,
            dispatched = stats.tasks_dispatched,
            skipped = stats.windows_skipped,
            "Consumer detached"
        );
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Shared {
    fn push_task(&self, task: InspectionTask) -> Result<TaskId, ConsumerError> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(ConsumerError::Detached(self.id));
        }
        if self.ended.load(Ordering::SeqCst) {
            return Err(ConsumerError::EndOfStream(self.id));
        }

        let id = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let guard = self.schedule.lock();
        let started = {
            let mut schedule = guard.borrow_mut();
            if schedule.is_failed() {
                return Err(ConsumerError::Failed(self.id));
            }
            self.tasks.lock().push(Arc::new(TaskSlot {
                id,
                busy: AtomicBool::new(false),
                task: Mutex::new(task),
            }));
            schedule.push_task()
        };
        drop(guard);

        debug!(consumer = %self.id, task = %id, "Task pushed");
        if started {
            debug!(consumer = %self.id, "Consumer active");
            self.wake_up();
        }
        Ok(id)
    }

    fn remove_task(&self, id: TaskId) -> bool {
        let guard = self.schedule.lock();
        let removed = {
            let mut tasks = self.tasks.lock();
            let before = tasks.len();
            tasks.retain(|slot| slot.id != id);
            tasks.len() != before
        };
        if removed {
            let mut schedule = guard.borrow_mut();
            schedule.remove_task();
            if schedule.outstanding() == 0 {
                debug!(consumer = %self.id, idle_cycles = schedule.idle_left(), "Consumer idle");
            }
        }
        removed
    }

    /// Record a failure and detach the task that caused it.
    fn fail_task(&self, id: TaskId, message: String) {
        let guard = self.schedule.lock();
        guard.borrow_mut().fail();
        // Re-enters the schedule lock held above.
        self.remove_task(id);
        drop(guard);

        error!(consumer = %self.id, task = %id, error = %message, "Inspection task failed");
        self.send(ConsumerEvent::TaskFailed {
            consumer: self.id,
            task: id,
            message,
        });
    }

    fn wake_up(&self) {
        *self.wake.lock() += 1;
        self.wake_cv.notify_all();
    }

    fn send(&self, event: ConsumerEvent) {
        if self.events.send(event).is_err() {
            trace!(consumer = %self.id, "Event receiver gone");
        }
    }

    fn read_loop(self: Arc<Self>, mut port: Box<dyn ReadPort>) {
        debug!(consumer = %self.id, "Read loop started");

        while !self.stopping.load(Ordering::SeqCst) {
            let seen = *self.wake.lock();
            let cycle = {
                let guard = self.schedule.lock();
                let cycle = guard.borrow_mut().begin_cycle();
                cycle
            };

            let idle = match cycle {
                Cycle::Read { idle } => idle,
                Cycle::Expired => {
                    debug!(consumer = %self.id, "Idle countdown expired, reads stopped");
                    self.send(ConsumerEvent::Stopped { consumer: self.id });
                    continue;
                }
                Cycle::Wait => {
                    let mut wake = self.wake.lock();
                    while *wake == seen && !self.stopping.load(Ordering::SeqCst) {
                        self.wake_cv.wait(&mut wake);
                    }
                    continue;
                }
            };

            match port.read_window() {
                Ok(Some(window)) => {
                    let c = &self.counters;
                    c.windows_read.fetch_add(1, Ordering::Relaxed);
                    c.samples_read.fetch_add(window.len() as u64, Ordering::Relaxed);
                    if idle {
                        c.idle_reads.fetch_add(1, Ordering::Relaxed);
                    }
                    trace!(
                        consumer = %self.id,
                        position = window.position(),
                        len = window.len(),
                        idle,
                        "Window read"
                    );
                    *self.current.lock() = Some(window.clone());
                    self.dispatch(&window);
                }
                Ok(None) => {
                    info!(consumer = %self.id, "End of stream");
                    self.ended.store(true, Ordering::SeqCst);
                    self.send(ConsumerEvent::EndOfStream { consumer: self.id });
                    break;
                }
                Err(e) => {
                    error!(consumer = %self.id, error = %e, "Source read failed");
                    {
                        let guard = self.schedule.lock();
                        guard.borrow_mut().fail();
                    }
                    self.send(ConsumerEvent::SourceFailed {
                        consumer: self.id,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        if let Err(e) = port.close() {
            warn!(consumer = %self.id, error = %e, "Closing source failed");
        }
        debug!(consumer = %self.id, "Read loop exiting");
    }

    /// Hand `window` to every attached task that is not still busy.
    fn dispatch(self: &Arc<Self>, window: &SampleWindow) {
        // Held across the whole fan-out; rejected jobs re-enter it through
        // remove_task.
        let guard = self.schedule.lock();
        let tasks = self.tasks.lock().clone();

        for slot in tasks {
            if slot.busy.swap(true, Ordering::AcqRel) {
                self.counters.windows_skipped.fetch_add(1, Ordering::Relaxed);
                trace!(consumer = %self.id, task = %slot.id, "Task busy, window skipped");
                continue;
            }

            *self.in_flight.lock() += 1;
            let shared = Arc::clone(self);
            let ctx = TaskContext {
                consumer: self.id,
                task: slot.id,
                window: window.clone(),
                sample_rate: self.sample_rate,
                frequency: self.frequency,
            };
            let job_slot = Arc::clone(&slot);

            match self.workers.push(move || shared.run_task(&job_slot, &ctx)) {
                Ok(()) => {
                    self.counters.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(consumer = %self.id, task = %slot.id, error = %e, "Worker pool rejected task");
                    self.finish_job();
                    self.remove_task(slot.id);
                }
            }
        }
        drop(guard);
    }

    fn run_task(&self, slot: &TaskSlot, ctx: &TaskContext) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut task = slot.task.lock();
            (*task)(ctx)
        }));

        match outcome {
            Ok(Ok(TaskStatus::Continue)) => {
                slot.busy.store(false, Ordering::Release);
            }
            Ok(Ok(TaskStatus::Done)) => {
                debug!(consumer = %self.id, task = %slot.id, "Task done");
                self.remove_task(slot.id);
            }
            Ok(Err(e)) => self.fail_task(slot.id, e.to_string()),
            Err(_) => self.fail_task(slot.id, "task panicked".to_string()),
        }
        self.finish_job();
    }

    fn finish_job(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ReadPort;
    use crate::window::SampleWindow;
    use crate::ScanResult;
    use crossbeam::channel::{unbounded, Receiver};
    use scan_core::Sample;
    use scan_pool::{BufferPool, PoolConfig};

    /// Endless port producing `len`-sample windows of a constant value.
    struct ConstPort {
        pool: BufferPool,
        len: usize,
        position: u64,
        remaining: Option<u64>,
        fail_after: Option<u64>,
    }

    impl ConstPort {
        fn new(len: usize) -> Self {
            Self {
                pool: BufferPool::new(&PoolConfig::default()).unwrap(),
                len,
                position: 0,
                remaining: None,
                fail_after: None,
            }
        }
    }

    impl ReadPort for ConstPort {
        fn read_window(&mut self) -> ScanResult<Option<SampleWindow>> {
            if let Some(0) = self.fail_after {
                return Err(crate::ScanError::Io(std::io::Error::other("device unplugged")));
            }
            if let Some(n) = self.fail_after.as_mut() {
                *n -= 1;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
            }
            let mut buffer = self.pool.alloc(self.len)?;
            buffer.as_mut_slice().fill(Sample::new(1.0, 0.0));
            let window = SampleWindow::pooled(self.position, buffer.freeze());
            self.position += self.len as u64;
            thread::sleep(Duration::from_micros(200));
            Ok(Some(window))
        }

        fn window_len(&self) -> usize {
            self.len
        }

        fn sample_rate(&self) -> f64 {
            1e6
        }

        fn frequency(&self) -> f64 {
            100e6
        }

        fn close(&mut self) -> ScanResult<()> {
            Ok(())
        }
    }

    fn spawn(port: ConstPort, idle_cycles: u32) -> (Arc<Consumer>, Receiver<ConsumerEvent>, Arc<WorkerPool>) {
        let workers = Arc::new(WorkerPool::new("test-worker", 2).unwrap());
        let (tx, rx) = unbounded();
        let config = ConsumerConfig {
            idle_cycles,
            window_len: port.len,
            ..ConsumerConfig::default()
        };
        let consumer = Consumer::spawn(
            ConsumerId(1),
            "test-consumer",
            Box::new(port),
            Arc::clone(&workers),
            &config,
            tx,
        )
        .unwrap();
        (consumer, rx, workers)
    }

    fn wait_for(rx: &Receiver<ConsumerEvent>, want: impl Fn(&ConsumerEvent) -> bool) -> ConsumerEvent {
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("event within timeout");
            if want(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_no_reads_without_tasks() {
        let (consumer, _rx, _workers) = spawn(ConstPort::new(64), 30);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(consumer.stats().windows_read, 0);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert!(consumer.current_window().is_none());
    }

    #[test]
    fn test_idle_countdown_reads_exactly_idle_cycles() {
        let (consumer, rx, _workers) = spawn(ConstPort::new(64), 30);

        consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Done)))
            .unwrap();
        wait_for(&rx, |e| matches!(e, ConsumerEvent::Stopped { .. }));

        let stats = consumer.stats();
        assert_eq!(stats.idle_reads, 30);
        assert_eq!(consumer.state(), ConsumerState::Stopped);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(consumer.stats().windows_read, stats.windows_read);
    }

    #[test]
    fn test_task_sees_windows_in_order() {
        let (consumer, _rx, _workers) = spawn(ConstPort::new(128), 30);
        let (seen_tx, seen_rx) = unbounded();

        let mut count = 0;
        consumer
            .push_task(Box::new(move |ctx: &TaskContext| {
                let sum = ctx.window().with_samples(|s| s.iter().map(|x| x.re).sum::<f32>());
                seen_tx.send((ctx.window().position(), sum)).ok();
                count += 1;
                Ok(if count == 5 { TaskStatus::Done } else { TaskStatus::Continue })
            }))
            .unwrap();

        let seen: Vec<_> = (0..5)
            .map(|_| seen_rx.recv_timeout(Duration::from_secs(10)).unwrap())
            .collect();
        for pair in seen.windows(2) {
            assert!(pair[1].0 > pair[0].0);
        }
        assert!(seen.iter().all(|&(pos, sum)| pos % 128 == 0 && sum == Some(128.0)));
        assert_eq!(consumer.buffer_len(), 128);
    }

    #[test]
    fn test_task_error_fails_consumer() {
        let (consumer, rx, _workers) = spawn(ConstPort::new(64), 30);
        let id = consumer
            .push_task(Box::new(|_ctx: &TaskContext| Err(TaskError::new("bad window"))))
            .unwrap();

        let event = wait_for(&rx, |e| matches!(e, ConsumerEvent::TaskFailed { .. }));
        assert_eq!(
            event,
            ConsumerEvent::TaskFailed {
                consumer: ConsumerId(1),
                task: id,
                message: "bad window".into(),
            }
        );
        assert!(consumer.is_failed());
        assert_eq!(consumer.outstanding(), 0);
        assert!(matches!(
            consumer.push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue))),
            Err(ConsumerError::Failed(_))
        ));
    }

    #[test]
    fn test_panicking_task_fails_consumer() {
        let (consumer, rx, workers) = spawn(ConstPort::new(64), 30);
        consumer
            .push_task(Box::new(
                |_ctx: &TaskContext| -> Result<TaskStatus, TaskError> { panic!("boom") },
            ))
            .unwrap();
        wait_for(&rx, |e| matches!(e, ConsumerEvent::TaskFailed { .. }));
        assert!(consumer.is_failed());
        assert!(workers.is_running());
    }

    #[test]
    fn test_source_failure_reported() {
        let mut port = ConstPort::new(64);
        port.fail_after = Some(3);
        let (consumer, rx, _workers) = spawn(port, 30);
        consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue)))
            .unwrap();

        let event = wait_for(&rx, |e| matches!(e, ConsumerEvent::SourceFailed { .. }));
        match event {
            ConsumerEvent::SourceFailed { message, .. } => assert!(message.contains("unplugged")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(consumer.is_failed());
    }

    #[test]
    fn test_end_of_stream() {
        let mut port = ConstPort::new(64);
        port.remaining = Some(4);
        let (consumer, rx, _workers) = spawn(port, 30);
        consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue)))
            .unwrap();

        wait_for(&rx, |e| matches!(e, ConsumerEvent::EndOfStream { .. }));
        assert_eq!(consumer.stats().windows_read, 4);
        assert!(matches!(
            consumer.push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue))),
            Err(ConsumerError::EndOfStream(_))
        ));
    }

    #[test]
    fn test_busy_task_skips_windows() {
        let (consumer, _rx, _workers) = spawn(ConstPort::new(64), 30);
        let (started_tx, started_rx) = unbounded();
        consumer
            .push_task(Box::new(move |_ctx: &TaskContext| {
                started_tx.send(()).ok();
                thread::sleep(Duration::from_millis(30));
                Ok(TaskStatus::Continue)
            }))
            .unwrap();

        started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        thread::sleep(Duration::from_millis(60));
        let stats = consumer.stats();
        assert!(stats.windows_skipped > 0);
        assert!(stats.tasks_dispatched < stats.windows_read);
    }

    #[test]
    fn test_remove_task_detaches() {
        let (consumer, rx, _workers) = spawn(ConstPort::new(64), 3);
        let id = consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue)))
            .unwrap();
        assert_eq!(consumer.outstanding(), 1);
        assert!(consumer.remove_task(id));
        assert!(!consumer.remove_task(id));
        assert_eq!(consumer.outstanding(), 0);
        wait_for(&rx, |e| matches!(e, ConsumerEvent::Stopped { .. }));
    }

    #[test]
    fn test_rejected_job_detaches_task() {
        let (consumer, rx, workers) = spawn(ConstPort::new(64), 2);
        workers.shutdown();
        consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue)))
            .unwrap();

        wait_for(&rx, |e| matches!(e, ConsumerEvent::Stopped { .. }));
        assert_eq!(consumer.outstanding(), 0);
        assert_eq!(consumer.in_flight(), 0);
        assert_eq!(consumer.stats().tasks_dispatched, 0);
    }

    #[test]
    fn test_detach_is_idempotent_and_rejects_tasks() {
        let (consumer, _rx, _workers) = spawn(ConstPort::new(64), 30);
        consumer
            .push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue)))
            .unwrap();
        thread::sleep(Duration::from_millis(10));

        consumer.detach();
        consumer.detach();
        assert!(consumer.is_detached());
        assert!(consumer.current_window().is_none());
        assert_eq!(consumer.in_flight(), 0);
        assert!(matches!(
            consumer.push_task(Box::new(|_ctx: &TaskContext| Ok(TaskStatus::Continue))),
            Err(ConsumerError::Detached(_))
        ));
    }
}
