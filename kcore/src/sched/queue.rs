use std::cmp::Reverse;
use std::collections::VecDeque;
use std::fmt;

use super::task::{Task, TaskId};

/// One of the three ready bands, L1 being the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Shortest estimated burst first, preemptive.
    L1,
    /// Highest priority first, preemptive.
    L2,
    /// FIFO, round-robin by the timer.
    L3,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Level::L1 => 1,
            Level::L2 => 2,
            Level::L3 => 3,
        };
        write!(f, "L{}", n)
    }
}

/// Tasks kept sorted by a key captured at insertion. Equal keys stay in
/// insertion order.
#[derive(Debug)]
pub struct SortedQueue<K: Ord> {
    entries: Vec<(K, TaskId)>,
}

impl<K: Ord> Default for SortedQueue<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Ord> SortedQueue<K> {
    pub fn insert(&mut self, key: K, task: TaskId) {
        let at = self.entries.partition_point(|(k, _)| *k <= key);
        self.entries.insert(at, (key, task));
    }

    pub fn pop_front(&mut self) -> Option<TaskId> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.remove(0).1)
    }

    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|(_, t)| *t == task) {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|(_, t)| *t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three disjoint ready queues.
#[derive(Debug, Default)]
pub struct ReadyQueueSet {
    l1: SortedQueue<u64>,
    l2: SortedQueue<Reverse<u32>>,
    l3: VecDeque<TaskId>,
}

impl ReadyQueueSet {
    pub fn insert(&mut self, level: Level, task: &Task) {
        debug_assert!(self.level_of(task.id()).is_none(), "task {} queued twice", task.id());
        match level {
            Level::L1 => self.l1.insert(task.burst_time(), task.id()),
            Level::L2 => self.l2.insert(Reverse(task.priority()), task.id()),
            Level::L3 => self.l3.push_back(task.id()),
        }
    }

    /// Removes the head of the most urgent non-empty queue.
    pub fn pop_next(&mut self) -> Option<(TaskId, Level)> {
        if let Some(task) = self.l1.pop_front() {
            return Some((task, Level::L1));
        }
        if let Some(task) = self.l2.pop_front() {
            return Some((task, Level::L2));
        }
        self.l3.pop_front().map(|task| (task, Level::L3))
    }

    pub fn remove(&mut self, level: Level, task: TaskId) -> bool {
        match level {
            Level::L1 => self.l1.remove(task),
            Level::L2 => self.l2.remove(task),
            Level::L3 => match self.l3.iter().position(|t| *t == task) {
                Some(at) => self.l3.remove(at).is_some(),
                None => false,
            },
        }
    }

    /// Queue contents from head to tail.
    pub fn tasks(&self, level: Level) -> Vec<TaskId> {
        match level {
            Level::L1 => self.l1.iter().collect(),
            Level::L2 => self.l2.iter().collect(),
            Level::L3 => self.l3.iter().copied().collect(),
        }
    }

    /// Which queue holds `task`, if any.
    pub fn level_of(&self, task: TaskId) -> Option<Level> {
        if self.l1.iter().any(|t| t == task) {
            Some(Level::L1)
        } else if self.l2.iter().any(|t| t == task) {
            Some(Level::L2)
        } else if self.l3.contains(&task) {
            Some(Level::L3)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.l1.len() + self.l2.len() + self.l3.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_queue_is_stable_for_equal_keys() {
        let mut q = SortedQueue::default();
        q.insert(5, TaskId(1));
        q.insert(3, TaskId(2));
        q.insert(5, TaskId(3));
        q.insert(3, TaskId(4));
        assert_eq!(q.iter().collect::<Vec<_>>(), vec![TaskId(2), TaskId(4), TaskId(1), TaskId(3)]);
    }

    #[test]
    fn l2_puts_higher_priority_first() {
        let mut set = ReadyQueueSet::default();
        set.insert(Level::L2, &Task::new(1, "a", 60));
        set.insert(Level::L2, &Task::new(2, "b", 90));
        set.insert(Level::L2, &Task::new(3, "c", 60));
        assert_eq!(set.tasks(Level::L2), vec![TaskId(2), TaskId(1), TaskId(3)]);
    }

    #[test]
    fn l1_puts_shorter_burst_first() {
        let mut set = ReadyQueueSet::default();
        set.insert(Level::L1, &Task::new(1, "a", 120).with_burst_time(40));
        set.insert(Level::L1, &Task::new(2, "b", 120).with_burst_time(10));
        assert_eq!(set.pop_next(), Some((TaskId(2), Level::L1)));
        assert_eq!(set.pop_next(), Some((TaskId(1), Level::L1)));
        assert_eq!(set.pop_next(), None);
    }

    #[test]
    fn pop_next_drains_bands_in_order() {
        let mut set = ReadyQueueSet::default();
        set.insert(Level::L3, &Task::new(1, "a", 10));
        set.insert(Level::L2, &Task::new(2, "b", 70));
        set.insert(Level::L1, &Task::new(3, "c", 110));
        set.insert(Level::L3, &Task::new(4, "d", 10));

        let order: Vec<_> = std::iter::from_fn(|| set.pop_next()).collect();
        assert_eq!(
            order,
            vec![
                (TaskId(3), Level::L1),
                (TaskId(2), Level::L2),
                (TaskId(1), Level::L3),
                (TaskId(4), Level::L3),
            ]
        );
    }

    #[test]
    fn remove_reports_membership() {
        let mut set = ReadyQueueSet::default();
        set.insert(Level::L3, &Task::new(1, "a", 10));
        assert_eq!(set.level_of(TaskId(1)), Some(Level::L3));
        assert!(!set.remove(Level::L2, TaskId(1)));
        assert!(set.remove(Level::L3, TaskId(1)));
        assert!(set.is_empty());
    }
}
