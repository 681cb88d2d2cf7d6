//! Inspection tasks run by a consumer on the worker pool.

use std::fmt;

use thiserror::Error;

use super::ConsumerId;
use crate::window::SampleWindow;

/// Identifies an attached task within its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a task wants after processing a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Stay attached and receive the next window.
    Continue,
    /// Detach from the consumer.
    Done,
}

/// Failure reported by a task. Marks its consumer failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    /// Error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A unit of per-window work. Called once per window it is given, never
/// concurrently with itself.
pub type InspectionTask = Box<dyn FnMut(&TaskContext) -> Result<TaskStatus, TaskError> + Send>;

/// Everything a task sees for one window.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub(crate) consumer: ConsumerId,
    pub(crate) task: TaskId,
    pub(crate) window: SampleWindow,
    pub(crate) sample_rate: f64,
    pub(crate) frequency: f64,
}

impl TaskContext {
    /// Consumer that read the window.
    #[must_use]
    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// This task's id.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The window to inspect.
    #[must_use]
    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Source sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Source center frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}
