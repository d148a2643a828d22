use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use serde_json::json;
use taskgate_core::{Clock, SchedulerConfig, SystemClock, TimerHandle, TimerService, TokioTimer};
use tracing::info;

use crate::backlog::Backlog;
use crate::metrics::{MetricsSink, SchedulerMetrics, TracingSink};
use crate::task::Job;
use crate::types::{Lifecycle, Priority};

/// Mutable scheduler state. Guarded by one mutex; bodies never run while it is held.
pub(super) struct State {
    pub lifecycle: Lifecycle,
    /// `initialize` has run since construction or the last `reset`.
    pub initialized: bool,
    /// A `BarrierBegin` is outstanding; further begins collapse into it.
    pub barrier_pending: bool,
    /// When the current pause started. Starvation is measured from here.
    pub paused_since: Instant,
    pub backlog: Backlog,
    /// Control and timeout bodies waiting for the executing caller. Run
    /// ahead of the backlog and regardless of pause state.
    pub ready: VecDeque<Job>,
    /// Some caller is currently running bodies.
    pub executing: bool,
    pub watchdog: Option<TimerHandle>,
    pub next_task_id: u64,
}

pub(super) struct Inner {
    pub config: SchedulerConfig,
    pub clock: Arc<dyn Clock>,
    pub timer: Arc<dyn TimerService>,
    pub sink: Arc<dyn MetricsSink>,
    pub state: Mutex<State>,
    pub metrics: Arc<RwLock<SchedulerMetrics>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.watchdog.take() {
            self.timer.cancel(handle);
        }
        for task in state.backlog.iter() {
            if let Some(deadline) = &task.deadline {
                self.timer.cancel(deadline.timer);
            }
        }
    }
}

/// The task scheduler. Runs short units of work inline while running and
/// buffers them while paused, draining in priority order when released.
///
/// Cheap to clone; all clones share one scheduler. Timers hold only weak
/// references, and dropping the last clone cancels them.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler in the `Uninitialized` state.
    pub fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn TimerService>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let now = clock.now();
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                timer,
                sink,
                state: Mutex::new(State {
                    lifecycle: Lifecycle::Uninitialized,
                    initialized: false,
                    barrier_pending: false,
                    paused_since: now,
                    backlog: Backlog::default(),
                    ready: VecDeque::new(),
                    executing: false,
                    watchdog: None,
                    next_task_id: 0,
                }),
                metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            }),
        }
    }

    /// Scheduler on the current tokio runtime with the system clock and a
    /// tracing sink.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn on_current_runtime(config: SchedulerConfig) -> Self {
        info!(
            "Scheduler on tokio runtime (starvation timeout {}ms, check every {}ms)",
            config.starvation_timeout_ms, config.starvation_check_interval_ms
        );
        Self::new(
            config,
            Arc::new(SystemClock),
            Arc::new(TokioTimer::current()),
            Arc::new(TracingSink),
        )
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn record(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        if let Ok(mut m) = self.inner.metrics.write() {
            f(&mut m);
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// True before `initialize` and while a barrier is outstanding.
    pub fn is_paused(&self) -> bool {
        self.lock().lifecycle.is_paused()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    pub fn has_backlog(&self) -> bool {
        !self.lock().backlog.is_empty()
    }

    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn backlog_len_for(&self, priority: Priority) -> usize {
        self.lock().backlog.len_for(priority)
    }

    /// Whether the starvation watchdog is armed.
    pub fn has_pending_starvation_check(&self) -> bool {
        self.lock().watchdog.is_some()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner
            .metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// State and metrics as JSON, for diagnostics.
    pub fn dump(&self) -> serde_json::Value {
        let (lifecycle, barrier_pending, backlog, watchdog, paused_for) = {
            let state = self.lock();
            let backlog: serde_json::Map<String, serde_json::Value> = Priority::BUFFERED
                .iter()
                .map(|p| (p.as_str().to_string(), json!(state.backlog.len_for(*p))))
                .collect();
            let paused_for = state
                .lifecycle
                .is_paused()
                .then(|| self.inner.clock.now().saturating_duration_since(state.paused_since));
            (
                state.lifecycle,
                state.barrier_pending,
                backlog,
                state.watchdog.is_some(),
                paused_for,
            )
        };
        json!({
            "lifecycle": lifecycle,
            "paused": lifecycle.is_paused(),
            "barrier_pending": barrier_pending,
            "paused_for_ms": paused_for.map(|d| d.as_millis() as u64),
            "backlog": backlog,
            "starvation_check_pending": watchdog,
            "config": self.inner.config,
            "metrics": self.metrics(),
        })
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Scheduler")
            .field("lifecycle", &state.lifecycle)
            .field("barrier_pending", &state.barrier_pending)
            .field("backlog", &state.backlog.len())
            .field("executing", &state.executing)
            .field("watchdog", &state.watchdog)
            .finish_non_exhaustive()
    }
}
