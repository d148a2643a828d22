use std::sync::{Arc, Weak};
use std::time::Duration;

use taskgate_core::TimerHandle;
use tracing::{debug, error, warn};

use crate::metrics::InternalError;
use crate::task::{Job, RunKind};
use crate::types::Lifecycle;

use super::core::{Inner, State};
use super::Scheduler;

fn upgrade(weak: &Weak<Inner>) -> Option<Scheduler> {
    weak.upgrade().map(|inner| Scheduler { inner })
}

impl Scheduler {
    // ── Starvation watchdog ─────────────────────────────────────────

    /// Arm the watchdog if paused with a backlog and none is armed yet.
    pub(super) fn arm_watchdog_if_needed(&self, state: &mut State) {
        if state.watchdog.is_some() || !state.lifecycle.is_paused() || state.backlog.is_empty() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.starvation_check_interval();
        let handle = self.inner.timer.post_periodic(
            interval,
            Arc::new(move || {
                if let Some(scheduler) = upgrade(&weak) {
                    scheduler.check_starvation();
                }
            }),
        );
        debug!(%handle, ?interval, "starvation watchdog armed");
        state.watchdog = Some(handle);
    }

    pub(super) fn cancel_watchdog(&self, state: &mut State) {
        if let Some(handle) = state.watchdog.take() {
            debug!(%handle, "starvation watchdog cancelled");
            self.inner.timer.cancel(handle);
        }
    }

    /// One watchdog tick. Force-drains once the pause has outlived the
    /// starvation timeout.
    fn check_starvation(&self) {
        let now = self.inner.clock.now();
        let timeout = self.inner.config.starvation_timeout();

        let mut state = self.lock();
        if !state.lifecycle.is_paused() || state.backlog.is_empty() {
            // Released or emptied since arming; nothing to rescue.
            self.cancel_watchdog(&mut state);
            return;
        }

        let paused_for = now.saturating_duration_since(state.paused_since);
        if paused_for < timeout {
            debug!(?paused_for, ?timeout, backlog = state.backlog.len(), "starvation check: still waiting");
            return;
        }

        self.cancel_watchdog(&mut state);
        let was = state.lifecycle;
        state.lifecycle = Lifecycle::Running;
        state.barrier_pending = false;
        let backlog = state.backlog.len();
        let take_over = !state.executing;
        if take_over {
            state.executing = true;
        }
        drop(state);

        error!(
            ?was,
            ?paused_for,
            backlog,
            "Task queue starvation: paused past {:?}, force-draining",
            timeout
        );
        self.record(|m| m.starvation_events += 1);
        self.report(|sink| sink.record_internal_error(InternalError::TaskQueueStarvation));

        if take_over {
            self.run_pending();
        }
    }

    // ── Per-task deadlines ──────────────────────────────────────────

    pub(super) fn arm_deadline(&self, task_id: u64, timeout: Duration) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        self.inner.timer.post_delayed(
            timeout,
            Box::new(move || {
                if let Some(scheduler) = upgrade(&weak) {
                    scheduler.expire_task(task_id);
                }
            }),
        )
    }

    /// Deadline fired: pull the task out of the backlog and run its fallback
    /// instead. A task already drained or discarded is left alone.
    fn expire_task(&self, task_id: u64) {
        let mut state = self.lock();
        let Some(task) = state.backlog.remove(task_id) else {
            return;
        };
        let Some(deadline) = task.deadline else {
            return;
        };
        if state.backlog.is_empty() {
            self.cancel_watchdog(&mut state);
        }

        warn!(label = %task.label, priority = %task.priority, "task timed out in backlog; running fallback");
        let job = Job::new(task.label, deadline.on_timeout, task.enqueued_at, RunKind::Timeout);
        self.run_or_queue(state, job);
    }
}
