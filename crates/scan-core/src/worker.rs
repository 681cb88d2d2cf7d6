//! Worker pool executing inspection jobs on dedicated OS threads.
//!
//! The pool is an opaque task queue: a job pushed successfully runs exactly
//! once on one of the pool threads, and a push that cannot be honoured fails
//! synchronously with [`WorkerError::ShutDown`].
//!
//! ```text
//!   push(job) ──► crossbeam channel ──► worker-0 ─┐
//!                                  └──► worker-1 ─┼─► job()
//!                                  └──► worker-N ─┘
//! ```
//!
//! Shutdown closes intake, lets the queued jobs drain and joins every thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

/// A unit of work accepted by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors reported by the worker pool.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The pool no longer accepts jobs.
    #[error("Worker pool '{0}' is shut down")]
    ShutDown(String),

    /// A worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A pool needs at least one thread.
    #[error("Worker pool '{0}' needs at least one thread")]
    NoThreads(String),
}

/// Fixed-size pool of named worker threads.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    threads: usize,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name}-{index}`.
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self, WorkerError> {
        let name = name.into();
        if threads == 0 {
            return Err(WorkerError::NoThreads(name));
        }

        let (tx, rx) = unbounded::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let pending = Arc::clone(&pending);
            let completed = Arc::clone(&completed);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(rx, pending, completed));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Dropping the sender ends the threads already running.
                    drop(tx);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::Spawn(e));
                }
            }
        }

        info!(pool = %name, threads, "Worker pool started");

        Ok(Self {
            name,
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            pending,
            completed,
            threads,
        })
    }

    /// Queue a job. Fails synchronously if the pool has been shut down.
    pub fn push<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(WorkerError::ShutDown(self.name.clone()));
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(Box::new(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(WorkerError::ShutDown(self.name.clone()));
        }
        Ok(())
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Jobs finished since the pool started (panicked jobs included).
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Pool name, also the thread name prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`WorkerPool::push`] still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stop intake, drain queued jobs and join every worker thread.
    ///
    /// Idempotent. When called from one of the pool's own threads that thread
    /// is not joined.
    pub fn shutdown(&self) {
        let Some(tx) = self.sender.lock().take() else {
            return;
        };
        drop(tx);

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if let Err(e) = handle.join() {
                error!(pool = %self.name, "Worker thread panicked: {:?}", e);
            }
        }

        info!(
            pool = %self.name,
            completed = self.completed(),
            "Worker pool stopped"
        );
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Job>, pending: Arc<AtomicUsize>, completed: Arc<AtomicU64>) {
    for job in rx.iter() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("Worker job panicked; worker thread continues");
        }
        pending.fetch_sub(1, Ordering::AcqRel);
        completed.fetch_add(1, Ordering::AcqRel);
    }
    debug!("Worker thread exiting");
}
