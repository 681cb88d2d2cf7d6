//! Idle self-throttling state machine.
//!
//! ```text
//!            push (0 -> 1)                  remove (-> 0)
//!  Stopped ----------------> Active ------------------------> Idle
//!     ^                        ^                               |
//!     |                        +------- push (any time) -------+
//!     |                                                        |
//!     +------------- idle_cycles read cycles with no task -----+
//!
//!  any state --- task or source failure ---> Failed (no more reads)
//! ```
//!
//! The countdown is consumed at the start of each read cycle, so exactly
//! `idle_cycles` reads begin after the last task detaches.

/// Observable consumer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// At least one task attached; reading.
    Active,
    /// No tasks; reading through the idle countdown.
    Idle,
    /// Countdown expired or never started; not reading.
    Stopped,
    /// A task or the source failed; not reading.
    Failed,
}

/// Decision taken at the start of a read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Read a window. `idle` is set when no task is attached.
    Read {
        /// Read consumed one idle cycle.
        idle: bool,
    },
    /// The countdown just ran out; reading stops now.
    Expired,
    /// Not reading; wait for a task.
    Wait,
}

/// Task count, idle countdown and the read/failed flags.
#[derive(Debug, Clone)]
pub struct IdleSchedule {
    outstanding: usize,
    idle_left: u32,
    max_idle: u32,
    reading: bool,
    failed: bool,
}

impl IdleSchedule {
    /// Stopped schedule with a countdown of `max_idle` cycles.
    #[must_use]
    pub fn new(max_idle: u32) -> Self {
        Self {
            outstanding: 0,
            idle_left: 0,
            max_idle,
            reading: false,
            failed: false,
        }
    }

    /// A task was attached. Returns true if reading (re)starts.
    pub fn push_task(&mut self) -> bool {
        self.outstanding += 1;
        self.idle_left = self.max_idle;
        if self.failed || self.reading {
            return false;
        }
        self.reading = true;
        true
    }

    /// A task detached.
    pub fn remove_task(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            self.idle_left = self.max_idle;
        }
    }

    /// Start a read cycle.
    pub fn begin_cycle(&mut self) -> Cycle {
        if self.failed || !self.reading {
            return Cycle::Wait;
        }
        if self.outstanding > 0 {
            return Cycle::Read { idle: false };
        }
        if self.idle_left == 0 {
            self.reading = false;
            return Cycle::Expired;
        }
        self.idle_left -= 1;
        Cycle::Read { idle: true }
    }

    /// Stop reading for good.
    pub fn fail(&mut self) {
        self.failed = true;
        self.reading = false;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        if self.failed {
            ConsumerState::Failed
        } else if !self.reading {
            ConsumerState::Stopped
        } else if self.outstanding > 0 {
            ConsumerState::Active
        } else {
            ConsumerState::Idle
        }
    }

    /// Attached task count.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Remaining idle cycles.
    #[must_use]
    pub fn idle_left(&self) -> u32 {
        self.idle_left
    }

    /// Whether read cycles run.
    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// Whether a failure was recorded.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }
}
