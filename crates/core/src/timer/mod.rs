//! Delayed and periodic callbacks.
//!
//! [`TimerService`] is the only source of asynchronous wake-ups the scheduler
//! uses: the starvation watchdog is a periodic timer and each per-task
//! deadline is a one-shot timer.
//!
//! - `manual`: deterministic timer driven by a [`crate::ManualClock`]
//! - `runtime`: production timer backed by a tokio runtime

mod manual;
mod runtime;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use self::manual::ManualTimer;
pub use self::runtime::TokioTimer;

/// One-shot callback.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked on every tick of a periodic timer.
pub type PeriodicCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Identifies an armed timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Schedules callbacks on an executor chosen by the implementation.
pub trait TimerService: Send + Sync {
    /// Run `callback` once after `delay`.
    fn post_delayed(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Run `callback` every `interval`, first tick one interval from now.
    fn post_periodic(&self, interval: Duration, callback: PeriodicCallback) -> TimerHandle;

    /// Cancel an armed timer. Unknown or already-fired handles are ignored,
    /// and a periodic callback may cancel its own handle.
    fn cancel(&self, handle: TimerHandle);

    /// Number of timers currently armed.
    fn pending(&self) -> usize;
}
