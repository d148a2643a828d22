//! Buffered tasks, partitioned by priority class, FIFO within each class.

use std::collections::VecDeque;

use crate::task::Task;
use crate::types::Priority;

#[derive(Default)]
pub(crate) struct Backlog {
    /// One queue per buffered class, indexed in drain order.
    lanes: [VecDeque<Task>; 3],
}

fn lane_index(priority: Priority) -> Option<usize> {
    match priority {
        Priority::Immediate => Some(0),
        Priority::UserFacing => Some(1),
        Priority::Background => Some(2),
        Priority::BarrierBegin | Priority::BarrierReset => None,
    }
}

impl Backlog {
    /// Append a task behind others of its class. Barrier tasks are rejected
    /// and handed back.
    pub fn push(&mut self, task: Task) -> Result<(), Task> {
        match lane_index(task.priority) {
            Some(idx) => {
                self.lanes[idx].push_back(task);
                Ok(())
            }
            None => Err(task),
        }
    }

    /// Remove the head of the highest-priority non-empty class.
    pub fn pop_next(&mut self) -> Option<Task> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Remove a specific task, e.g. when its deadline fires.
    pub fn remove(&mut self, id: u64) -> Option<Task> {
        for lane in &mut self.lanes {
            if let Some(pos) = lane.iter().position(|t| t.id == id) {
                return lane.remove(pos);
            }
        }
        None
    }

    /// Remove everything, in drain order.
    pub fn drain_all(&mut self) -> Vec<Task> {
        self.lanes.iter_mut().flat_map(|lane| lane.drain(..)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.lanes.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn len_for(&self, priority: Priority) -> usize {
        lane_index(priority).map_or(0, |idx| self.lanes[idx].len())
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn task(id: u64, priority: Priority) -> Task {
        Task {
            id,
            label: format!("t{}", id),
            priority,
            body: Box::new(|| {}),
            enqueued_at: Instant::now(),
            deadline: None,
        }
    }

    fn drain_ids(backlog: &mut Backlog) -> Vec<u64> {
        std::iter::from_fn(|| backlog.pop_next()).map(|t| t.id).collect()
    }

    #[test]
    fn pops_by_class_then_fifo() {
        let mut backlog = Backlog::default();
        for (id, p) in [
            (1, Priority::Background),
            (2, Priority::UserFacing),
            (3, Priority::Background),
            (4, Priority::Immediate),
            (5, Priority::UserFacing),
        ] {
            assert!(backlog.push(task(id, p)).is_ok());
        }

        assert_eq!(backlog.len(), 5);
        assert_eq!(backlog.len_for(Priority::Background), 2);
        assert_eq!(drain_ids(&mut backlog), vec![4, 2, 5, 1, 3]);
        assert!(backlog.is_empty());
    }

    #[test]
    fn barrier_tasks_rejected() {
        let mut backlog = Backlog::default();
        let rejected = backlog.push(task(1, Priority::BarrierBegin)).unwrap_err();
        assert_eq!(rejected.id, 1);
        assert!(backlog.is_empty());
        assert_eq!(backlog.len_for(Priority::BarrierReset), 0);
    }

    #[test]
    fn remove_by_id_keeps_order_of_rest() {
        let mut backlog = Backlog::default();
        for id in 1..=3 {
            backlog.push(task(id, Priority::Background)).ok();
        }
        assert_eq!(backlog.remove(2).map(|t| t.id), Some(2));
        assert!(backlog.remove(2).is_none());
        assert_eq!(drain_ids(&mut backlog), vec![1, 3]);
    }

    #[test]
    fn drain_all_empties_every_class() {
        let mut backlog = Backlog::default();
        backlog.push(task(1, Priority::Background)).ok();
        backlog.push(task(2, Priority::Immediate)).ok();
        let ids: Vec<u64> = backlog.drain_all().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(backlog.is_empty());
    }
}
