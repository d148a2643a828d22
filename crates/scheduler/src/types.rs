use std::fmt;

use serde::{Deserialize, Serialize};

/// Task priority class. Lower numeric value = higher drain priority.
///
/// Only the first three classes are ever buffered; the barrier classes are
/// control tasks that pause and resume the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Priority {
    /// Drains first; runs inline whenever the scheduler is running.
    Immediate = 0,
    /// Work a user is waiting on.
    UserFacing = 1,
    /// Tolerates delay; drains last.
    Background = 2,
    /// Pauses the scheduler. Redundant begins collapse into the pending one.
    BarrierBegin = 3,
    /// Resumes the scheduler and drains the backlog.
    BarrierReset = 4,
}

impl Priority {
    /// Classes that can sit in the backlog, in drain order.
    pub const BUFFERED: [Priority; 3] = [Priority::Immediate, Priority::UserFacing, Priority::Background];

    pub fn is_barrier(self) -> bool {
        matches!(self, Priority::BarrierBegin | Priority::BarrierReset)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::UserFacing => "user_facing",
            Priority::Background => "background",
            Priority::BarrierBegin => "barrier_begin",
            Priority::BarrierReset => "barrier_reset",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the scheduler is in its pause/resume cycle.
///
/// `Uninitialized -> Running <-> Paused`; `reset()` returns to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Before `initialize` (or after `reset`). Everything buffers.
    Uninitialized,
    /// Tasks run inline.
    Running,
    /// A barrier is outstanding. Everything buffers.
    Paused,
}

impl Lifecycle {
    pub fn is_paused(self) -> bool {
        self != Lifecycle::Running
    }
}
