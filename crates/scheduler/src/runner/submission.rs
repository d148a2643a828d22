use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::task::{Deadline, Job, RunKind, Task, TaskBody};
use crate::types::{Lifecycle, Priority};

use super::Scheduler;

const INITIALIZE_LABEL: &str = "initialize";

impl Scheduler {
    /// Submit a unit of work.
    ///
    /// While running, `Immediate`/`UserFacing`/`Background` bodies run before
    /// this returns; while paused they are buffered. `BarrierBegin` pauses
    /// (collapsing into an outstanding barrier), `BarrierReset` resumes and
    /// drains the backlog.
    pub fn submit<F>(&self, label: impl Into<String>, priority: Priority, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(label.into(), priority, Box::new(body), None);
    }

    /// Like [`Scheduler::submit`], but if the task is buffered and still
    /// waiting after `timeout`, it is removed and `on_timeout` runs instead.
    /// Exactly one of the two bodies runs, unless `reset()` discards the task.
    pub fn submit_with_deadline<F, T>(
        &self,
        label: impl Into<String>,
        priority: Priority,
        body: F,
        on_timeout: T,
        timeout: Duration,
    ) where
        F: FnOnce() + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        let on_timeout: TaskBody = Box::new(on_timeout);
        self.dispatch(label.into(), priority, Box::new(body), Some((on_timeout, timeout)));
    }

    /// Release the scheduler for the first time: runs `body`, then drains
    /// everything buffered so far. Must be called once per lifetime (or once
    /// after each `reset()`).
    pub fn initialize<F>(&self, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = self.inner.clock.now();
        let mut state = self.lock();

        let already_initialized = state.initialized;
        if already_initialized {
            drop(state);
            error!("Scheduler initialized twice without reset; treating as BarrierReset");
            debug_assert!(!already_initialized, "Scheduler::initialize called more than once");
            self.end_barrier(INITIALIZE_LABEL.to_string(), Box::new(body), now);
            return;
        }

        state.initialized = true;
        state.barrier_pending = false;
        state.lifecycle = Lifecycle::Running;
        self.cancel_watchdog(&mut state);
        info!("Scheduler initialized; draining {} buffered task(s)", state.backlog.len());

        let job = Job::new(INITIALIZE_LABEL.to_string(), Box::new(body), now, RunKind::Control);
        self.run_or_queue(state, job);
    }

    /// Drop the whole backlog unexecuted and return to `Uninitialized`,
    /// ready for another `initialize`. Cancels the watchdog and the deadlines
    /// of discarded tasks.
    pub fn reset(&self) {
        let now = self.inner.clock.now();
        let discarded = {
            let mut state = self.lock();
            let discarded = state.backlog.drain_all();
            for task in &discarded {
                if let Some(deadline) = &task.deadline {
                    self.inner.timer.cancel(deadline.timer);
                }
            }
            self.cancel_watchdog(&mut state);
            state.lifecycle = Lifecycle::Uninitialized;
            state.initialized = false;
            state.barrier_pending = false;
            state.paused_since = now;
            discarded
        };

        let count = discarded.len() as u64;
        self.record(|m| m.tasks_discarded += count);
        info!("Scheduler reset; discarded {} buffered task(s)", count);
        drop(discarded);
    }

    fn dispatch(
        &self,
        label: String,
        priority: Priority,
        body: TaskBody,
        deadline: Option<(TaskBody, Duration)>,
    ) {
        let now = self.inner.clock.now();
        self.record(|m| m.record_submission(priority));

        if !priority.is_barrier() {
            self.submit_task(label, priority, body, deadline, now);
            return;
        }
        if deadline.is_some() {
            debug!(label = %label, %priority, "deadline ignored for barrier task");
        }
        if priority == Priority::BarrierBegin {
            self.begin_barrier(label, body, now);
        } else {
            self.end_barrier(label, body, now);
        }
    }

    fn begin_barrier(&self, label: String, body: TaskBody, now: Instant) {
        let mut state = self.lock();
        if state.barrier_pending {
            drop(state);
            debug!(label = %label, "BarrierBegin collapsed into outstanding barrier");
            self.record(|m| m.barriers_collapsed += 1);
            return;
        }

        state.barrier_pending = true;
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Paused;
            state.paused_since = now;
        }
        // Tasks buffered behind a busy executor are now stuck until release.
        self.arm_watchdog_if_needed(&mut state);
        info!(label = %label, "Scheduler paused by barrier");

        self.run_or_queue(state, Job::new(label, body, now, RunKind::Control));
    }

    pub(super) fn end_barrier(&self, label: String, body: TaskBody, now: Instant) {
        let mut state = self.lock();
        state.barrier_pending = false;
        match state.lifecycle {
            Lifecycle::Paused => {
                state.lifecycle = Lifecycle::Running;
                self.cancel_watchdog(&mut state);
                info!(label = %label, "Barrier released; draining {} buffered task(s)", state.backlog.len());
            }
            Lifecycle::Uninitialized => {
                debug!(label = %label, "BarrierReset before initialize; staying paused");
            }
            Lifecycle::Running => {}
        }

        self.run_or_queue(state, Job::new(label, body, now, RunKind::Control));
    }

    fn submit_task(
        &self,
        label: String,
        priority: Priority,
        body: TaskBody,
        deadline: Option<(TaskBody, Duration)>,
        now: Instant,
    ) {
        let mut state = self.lock();

        if state.lifecycle == Lifecycle::Running && !state.executing {
            state.executing = true;
            drop(state);
            self.run_job(Job::new(label, body, now, RunKind::Inline));
            self.run_pending();
            return;
        }

        let paused = state.lifecycle.is_paused();
        let id = state.next_task_id;
        state.next_task_id += 1;

        let deadline = match deadline {
            Some((on_timeout, timeout)) if paused => Some(Deadline {
                timer: self.arm_deadline(id, timeout),
                on_timeout,
            }),
            Some(_) => {
                debug!(label = %label, "executor busy but running; deadline not armed");
                None
            }
            None => None,
        };

        debug!(label = %label, %priority, paused, "task buffered");
        let task = Task {
            id,
            label,
            priority,
            body,
            enqueued_at: now,
            deadline,
        };
        if let Err(task) = state.backlog.push(task) {
            // dispatch() routes barriers elsewhere
            warn!(label = %task.label, "barrier task reached the backlog; dropped");
            return;
        }

        if paused {
            self.arm_watchdog_if_needed(&mut state);
        }
    }
}
