//! Priority task scheduler with pause/resume barriers.
//!
//! Producers submit short units of work tagged with a [`Priority`]. While the
//! scheduler is running, work executes inline on the caller; while paused
//! (before [`Scheduler::initialize`] and between `BarrierBegin` and
//! `BarrierReset`) it is buffered and later drained `Immediate` first, then
//! `UserFacing`, then `Background`, FIFO within each class.
//!
//! A starvation watchdog force-drains the backlog if the release never comes,
//! and per-task deadlines can swap a buffered body for a fallback.

mod backlog;
pub mod metrics;
pub mod runner;
pub mod task;
pub mod types;

pub use metrics::{InternalError, MetricsSink, SchedulerMetrics, TracingSink};
pub use runner::Scheduler;
pub use task::{RunKind, TaskBody, TaskError};
pub use types::{Lifecycle, Priority};

pub use taskgate_core::{
    Clock, ManualClock, ManualTimer, SchedulerConfig, SystemClock, TimerHandle, TimerService,
    TokioTimer,
};
