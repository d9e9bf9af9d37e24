//! # Per-worker Task Queue
//!
//! The original worker queue was a `std::priority_queue` that work
//! stealing drained entirely (`pop()` every element, keep the lowest
//! priority one, push the rest back) to reach the victim-favored task
//! — an O(n) hold of the queue lock on every steal. Keyed on
//! `(priority, Reverse(sequence))` in a `BTreeMap` instead: both
//! "highest priority, oldest enqueued" (normal dequeue) and "lowest
//! priority" (steal) are the map's first or last entry, so both are
//! O(log n) with no full drain.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::task::Task;

type Key = (i32, Reverse<u64>);

#[derive(Default)]
pub struct TaskQueue {
    entries: BTreeMap<Key, Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key_for(task: &Task, sequence: u64) -> Key {
        (task.priority, Reverse(sequence))
    }

    /// Insert a task, keyed by its own id as the tie-break sequence —
    /// ids are assigned monotonically at submission time.
    pub fn push(&mut self, task: Task) {
        let key = Self::key_for(&task, task.id);
        self.entries.insert(key, task);
    }

    /// Highest priority first, oldest enqueued among ties.
    pub fn pop_highest(&mut self) -> Option<Task> {
        let key = *self.entries.keys().next_back()?;
        self.entries.remove(&key)
    }

    /// Lowest priority first — the task a victim-favored steal takes,
    /// so the stolen worker keeps its important work.
    pub fn pop_lowest(&mut self) -> Option<Task> {
        let key = *self.entries.keys().next()?;
        self.entries.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn task(id: u64, priority: i32) -> Task {
        Task {
            id,
            priority,
            enqueued_at: Instant::now(),
            function: Box::new(|| {}),
        }
    }

    #[test]
    fn pop_highest_respects_priority_then_fifo() {
        let mut q = TaskQueue::new();
        q.push(task(1, 5));
        q.push(task(2, 5));
        q.push(task(3, 9));
        // highest priority (9) comes first regardless of insertion order
        assert_eq!(q.pop_highest().unwrap().id, 3);
        // tie between id 1 and 2 at priority 5: earliest id first
        assert_eq!(q.pop_highest().unwrap().id, 1);
        assert_eq!(q.pop_highest().unwrap().id, 2);
        assert!(q.pop_highest().is_none());
    }

    #[test]
    fn pop_lowest_favors_victim_importance() {
        let mut q = TaskQueue::new();
        q.push(task(1, 5));
        q.push(task(2, 1));
        q.push(task(3, 9));
        assert_eq!(q.pop_lowest().unwrap().id, 2);
        assert_eq!(q.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn pop_highest_is_never_out_of_priority_order(
            priorities in proptest::collection::vec(-50i32..50, 0..200)
        ) {
            let mut q = TaskQueue::new();
            for (id, priority) in priorities.iter().enumerate() {
                q.push(task(id as u64, *priority));
            }
            let mut last = i32::MAX;
            while let Some(t) = q.pop_highest() {
                proptest::prop_assert!(t.priority <= last);
                last = t.priority;
            }
        }
    }
}
