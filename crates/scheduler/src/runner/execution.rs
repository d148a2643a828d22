use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::MutexGuard;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::metrics::{InternalError, MetricsSink};
use crate::task::{Job, RunKind, TaskError};
use crate::types::Lifecycle;

use super::core::State;
use super::Scheduler;

impl Scheduler {
    /// Run `job` now if nobody else is executing; otherwise hand it to the
    /// executing caller, which runs it ahead of the backlog.
    pub(super) fn run_or_queue(&self, mut state: MutexGuard<'_, State>, job: Job) {
        if state.executing {
            debug!(label = %job.label, "executor busy; queued ahead of backlog");
            state.ready.push_back(job);
            return;
        }
        state.executing = true;
        drop(state);

        self.run_job(job);
        self.run_pending();
    }

    /// Keep running queued control bodies, then backlog heads while the
    /// scheduler is running, until there is nothing left. Callers must have
    /// set `executing`; it is cleared here under the same lock that observes
    /// the empty queues, so no submission is ever stranded.
    pub(super) fn run_pending(&self) {
        loop {
            let job = {
                let mut state = self.lock();
                match self.next_job(&mut state) {
                    Some(job) => job,
                    None => {
                        state.executing = false;
                        return;
                    }
                }
            };
            self.run_job(job);
        }
    }

    fn next_job(&self, state: &mut State) -> Option<Job> {
        if let Some(job) = state.ready.pop_front() {
            return Some(job);
        }
        if state.lifecycle != Lifecycle::Running {
            return None;
        }
        let task = state.backlog.pop_next()?;
        if let Some(deadline) = task.deadline {
            self.inner.timer.cancel(deadline.timer);
        }
        debug!(label = %task.label, priority = %task.priority, "draining task");
        Some(Job::new(task.label, task.body, task.enqueued_at, RunKind::Drained))
    }

    /// Run one body, catching panics, and report it.
    pub(super) fn run_job(&self, job: Job) {
        let Job {
            label,
            body,
            enqueued_at,
            kind,
        } = job;

        let started = self.inner.clock.now();
        let delay = match kind {
            RunKind::Inline => Duration::ZERO,
            _ => started.saturating_duration_since(enqueued_at),
        };

        let result = catch_unwind(AssertUnwindSafe(body));
        let duration = self.inner.clock.now().saturating_duration_since(started);

        if let Err(payload) = result {
            let err = TaskError::panicked(&label, payload);
            error!(label = %label, ?kind, "{}; continuing", err);
            self.record(|m| m.task_panics += 1);
            self.report(|sink| sink.record_internal_error(InternalError::TaskPanicked));
        } else {
            debug!(label = %label, ?kind, ?delay, ?duration, "task completed");
        }

        self.record(|m| m.record_execution(&label, kind, delay, duration));
        self.report(|sink| sink.record_task_finished(&label, delay, duration));
    }

    /// Call into the metrics sink, ignoring anything that goes wrong there.
    pub(super) fn report(&self, f: impl FnOnce(&dyn MetricsSink)) {
        let sink = self.inner.sink.as_ref();
        if catch_unwind(AssertUnwindSafe(|| f(sink))).is_err() {
            warn!("Metrics sink panicked; record dropped");
        }
    }
}
