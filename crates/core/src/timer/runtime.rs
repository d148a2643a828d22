use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::{PeriodicCallback, TimerCallback, TimerHandle, TimerService};

type TaskMap = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

fn lock(tasks: &TaskMap) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timer backed by a tokio runtime. Each armed timer is a spawned task;
/// cancelling aborts it.
///
/// Pair with [`crate::SystemClock`]: tokio time and `Instant::now()` share
/// the same monotonic source.
pub struct TokioTimer {
    handle: Handle,
    next_id: AtomicU64,
    tasks: TaskMap,
}

impl TokioTimer {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bind to the runtime of the calling context.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl TimerService for TokioTimer {
    fn post_delayed(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = lock(&self.tasks);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&tasks).remove(&id);
            callback();
        });
        guard.insert(id, join);
        TimerHandle(id)
    }

    fn post_periodic(&self, interval: Duration, callback: PeriodicCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut guard = lock(&self.tasks);
        let join = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        guard.insert(id, join);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(join) = lock(&self.tasks).remove(&handle.0) {
            debug!(%handle, "cancelling tokio timer");
            join.abort();
        }
    }

    fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, join) in lock(&self.tasks).drain() {
            join.abort();
        }
    }
}
