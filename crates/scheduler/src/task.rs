use std::any::Any;
use std::time::Instant;

use serde::Serialize;
use taskgate_core::TimerHandle;

use super::types::Priority;

/// The zero-argument action a task runs.
pub type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// Error type for task execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {label} panicked: {message}")]
    Panicked { label: String, message: String },
}

impl TaskError {
    pub(crate) fn panicked(label: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked {
            label: label.to_string(),
            message,
        }
    }
}

/// How a body came to run. Drives the per-run metrics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunKind {
    /// Ran on the submitting caller while the scheduler was running.
    Inline,
    /// Taken from the backlog by a drain.
    Drained,
    /// Barrier or initialize body.
    Control,
    /// Fallback body of a task whose deadline expired in the backlog.
    Timeout,
}

/// Fallback armed for a buffered task.
pub(crate) struct Deadline {
    pub timer: TimerHandle,
    pub on_timeout: TaskBody,
}

/// A buffered unit of work.
pub(crate) struct Task {
    pub id: u64,
    pub label: String,
    pub priority: Priority,
    pub body: TaskBody,
    pub enqueued_at: Instant,
    pub deadline: Option<Deadline>,
}

/// A body that is about to run, with what the metrics need to know about it.
pub(crate) struct Job {
    pub label: String,
    pub body: TaskBody,
    pub enqueued_at: Instant,
    pub kind: RunKind,
}

impl Job {
    pub fn new(label: String, body: TaskBody, enqueued_at: Instant, kind: RunKind) -> Self {
        Self {
            label,
            body,
            enqueued_at,
            kind,
        }
    }
}
