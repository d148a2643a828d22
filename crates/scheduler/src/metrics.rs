use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::task::RunKind;
use crate::types::Priority;

/// Internal error events reported to the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InternalError {
    /// The scheduler stayed paused with a backlog past the starvation timeout.
    TaskQueueStarvation,
    /// A task body panicked; the drain carried on.
    TaskPanicked,
}

impl InternalError {
    pub fn as_str(&self) -> &'static str {
        match self {
            InternalError::TaskQueueStarvation => "TASK_QUEUE_STARVATION",
            InternalError::TaskPanicked => "TASK_PANICKED",
        }
    }
}

/// External logging collaborator. Fire-and-forget: the scheduler never
/// depends on what a sink does, and a panicking sink is ignored.
pub trait MetricsSink: Send + Sync {
    /// A task body finished. `delay` is time spent buffered (zero when inline).
    fn record_task_finished(&self, label: &str, delay: Duration, duration: Duration);

    fn record_internal_error(&self, kind: InternalError);
}

/// Sink that writes every record to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record_task_finished(&self, label: &str, delay: Duration, duration: Duration) {
        debug!(label, ?delay, ?duration, "task finished");
    }

    fn record_internal_error(&self, kind: InternalError) {
        error!(kind = kind.as_str(), "internal scheduler error");
    }
}

/// Scheduler operational metrics, exposed through `Scheduler::metrics()`
/// and the diagnostics dump.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Total bodies executed by label.
    pub tasks_executed: HashMap<String, u64>,
    /// Average body duration by label.
    pub avg_task_duration: HashMap<String, Duration>,
    /// Last execution time by label.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Submissions per priority class, including collapsed barriers.
    pub tasks_submitted: HashMap<Priority, u64>,
    pub inline_runs: u64,
    /// Bodies run out of the backlog.
    pub delayed_runs: u64,
    pub control_runs: u64,
    pub timeouts_fired: u64,
    pub barriers_collapsed: u64,
    /// Buffered tasks dropped unexecuted by `reset()`.
    pub tasks_discarded: u64,
    pub starvation_events: u64,
    pub task_panics: u64,
    /// Longest time any drained task spent in the backlog.
    pub max_delay: Duration,
}

impl SchedulerMetrics {
    pub fn record_submission(&mut self, priority: Priority) {
        *self.tasks_submitted.entry(priority).or_default() += 1;
    }

    /// Record a body execution.
    pub fn record_execution(&mut self, label: &str, kind: RunKind, delay: Duration, duration: Duration) {
        match kind {
            RunKind::Inline => self.inline_runs += 1,
            RunKind::Drained => self.delayed_runs += 1,
            RunKind::Control => self.control_runs += 1,
            RunKind::Timeout => self.timeouts_fired += 1,
        }
        self.max_delay = self.max_delay.max(delay);

        *self.tasks_executed.entry(label.to_string()).or_default() += 1;
        self.last_run.insert(label.to_string(), Utc::now());

        // Update rolling average duration
        let count = self.tasks_executed[label];
        let prev_avg = self
            .avg_task_duration
            .get(label)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(label.to_string(), new_avg);
    }

    /// Total bodies executed across all labels.
    pub fn total_executed(&self) -> u64 {
        self.tasks_executed.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("sync", RunKind::Inline, Duration::ZERO, Duration::from_millis(100));

        assert_eq!(m.tasks_executed["sync"], 1);
        assert_eq!(m.inline_runs, 1);
        assert!(m.last_run.contains_key("sync"));
        assert_eq!(m.avg_task_duration["sync"], Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("task", RunKind::Drained, Duration::from_secs(2), Duration::from_millis(100));
        m.record_execution("task", RunKind::Drained, Duration::from_secs(1), Duration::from_millis(200));

        assert_eq!(m.tasks_executed["task"], 2);
        assert_eq!(m.delayed_runs, 2);
        assert_eq!(m.max_delay, Duration::from_secs(2));
        let avg = m.avg_task_duration["task"].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn run_kinds_counted_separately() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("a", RunKind::Control, Duration::ZERO, Duration::ZERO);
        m.record_execution("b", RunKind::Timeout, Duration::ZERO, Duration::ZERO);
        assert_eq!(m.control_runs, 1);
        assert_eq!(m.timeouts_fired, 1);
        assert_eq!(m.total_executed(), 2);
    }

    #[test]
    fn submissions_by_priority() {
        let mut m = SchedulerMetrics::default();
        m.record_submission(Priority::Background);
        m.record_submission(Priority::Background);
        m.record_submission(Priority::BarrierBegin);
        assert_eq!(m.tasks_submitted[&Priority::Background], 2);
        assert_eq!(m.tasks_submitted[&Priority::BarrierBegin], 1);
    }

    #[test]
    fn internal_error_names() {
        assert_eq!(InternalError::TaskQueueStarvation.as_str(), "TASK_QUEUE_STARVATION");
        assert_eq!(InternalError::TaskPanicked.as_str(), "TASK_PANICKED");
    }
}
