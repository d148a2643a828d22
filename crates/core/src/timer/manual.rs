use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::{Clock, ManualClock};

use super::{PeriodicCallback, TimerCallback, TimerHandle, TimerService};

/// Shortest period a periodic timer may have, so `advance` always terminates.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Where due times that `Instant` cannot represent are parked (about 30 years out).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn due_after(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay).unwrap_or_else(|| from + FAR_FUTURE)
}

enum Entry {
    Once(TimerCallback),
    Periodic {
        interval: Duration,
        callback: PeriodicCallback,
    },
}

#[derive(Default)]
struct TimerState {
    next_id: u64,
    next_seq: u64,
    /// Min-heap of (due, arm sequence, id). Cancelled ids stay here until popped.
    heap: BinaryHeap<Reverse<(Instant, u64, u64)>>,
    entries: HashMap<u64, Entry>,
}

impl TimerState {
    fn push(&mut self, due: Instant, id: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((due, seq, id)));
    }
}

/// Deterministic timer that fires only from [`ManualTimer::advance`].
///
/// Timers fire in due-time order (ties in arm order) and the clock is moved
/// to each timer's due time before its callback runs, so callbacks observe
/// the time they were scheduled for. Callbacks run without the timer lock
/// held and may arm or cancel timers, including timers due within the same
/// `advance` window.
pub struct ManualTimer {
    clock: Arc<ManualClock>,
    state: Mutex<TimerState>,
}

impl ManualTimer {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TimerState::default()),
        }
    }

    /// The clock this timer drives.
    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// Move time forward by `by`, firing everything that becomes due.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = due_after(self.clock.now(), by);
        let mut fired = 0;

        while let Some((due, fire)) = self.pop_due(target) {
            let now = self.clock.now();
            if due > now {
                self.clock.advance(due - now);
            }
            match fire {
                Fire::Once(callback) => callback(),
                Fire::Periodic(callback) => callback(),
            }
            fired += 1;
        }

        let now = self.clock.now();
        if target > now {
            self.clock.advance(target - now);
        }
        fired
    }

    fn pop_due(&self, target: Instant) -> Option<(Instant, Fire)> {
        let mut state = self.lock();
        loop {
            let Reverse((due, _, id)) = *state.heap.peek()?;
            if due > target {
                return None;
            }
            state.heap.pop();

            match state.entries.remove(&id) {
                None => continue,
                Some(Entry::Once(callback)) => {
                    trace!(timer = id, "manual timer fired");
                    return Some((due, Fire::Once(callback)));
                }
                Some(Entry::Periodic { interval, callback }) => {
                    let tick = Arc::clone(&callback);
                    state.entries.insert(id, Entry::Periodic { interval, callback });
                    state.push(due_after(due, interval), id);
                    trace!(timer = id, "manual periodic timer ticked");
                    return Some((due, Fire::Periodic(tick)));
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, delay: Duration, entry: Entry) -> TimerHandle {
        let due = due_after(self.clock.now(), delay);
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(id, entry);
        state.push(due, id);
        TimerHandle(id)
    }
}

enum Fire {
    Once(TimerCallback),
    Periodic(PeriodicCallback),
}

impl TimerService for ManualTimer {
    fn post_delayed(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        self.arm(delay, Entry::Once(callback))
    }

    fn post_periodic(&self, interval: Duration, callback: PeriodicCallback) -> TimerHandle {
        let interval = interval.max(MIN_PERIOD);
        self.arm(interval, Entry::Periodic { interval, callback })
    }

    fn cancel(&self, handle: TimerHandle) {
        self.lock().entries.remove(&handle.0);
    }

    fn pending(&self) -> usize {
        self.lock().entries.len()
    }
}
