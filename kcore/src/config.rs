//! Disk geometry and scheduler tunables.

use crate::sched::{Level, TaskId};

pub use fileblock::SECTOR_SIZE;

/// Sector references held by one file header. Two 32-bit counters and the
/// references together fill exactly one sector.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * 4) / 4;

/// Bytes addressable by a header whose entries are data sectors.
pub const SINGLE_SIZE: u32 = (NUM_DIRECT * SECTOR_SIZE) as u32;
/// Bytes addressable by a header whose entries are single-band headers.
pub const DOUBLE_SIZE: u32 = NUM_DIRECT as u32 * SINGLE_SIZE;
/// Bytes addressable by a header whose entries are double-band headers.
pub const TRIPLE_SIZE: u32 = NUM_DIRECT as u32 * DOUBLE_SIZE;
/// Largest file a root header can describe.
pub const MAX_FILE_SIZE: u64 = NUM_DIRECT as u64 * TRIPLE_SIZE as u64;

/// Default disk size: 32 tracks of 32 sectors, scaled up so that files in
/// the double band fit.
pub const NUM_SECTORS: usize = 32 * 32 * 16;

/// Knobs for the multilevel feedback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Ticks a ready task may wait before its priority is raised.
    pub aging_threshold: u64,
    /// Priority added per aging step.
    pub aging_step: u32,
    /// Priorities are capped here.
    pub max_priority: u32,
    /// Priorities at or above this go to L1.
    pub l1_threshold: u32,
    /// Priorities at or above this (and below `l1_threshold`) go to L2.
    pub l2_threshold: u32,
    /// Round-robin quantum for L3 tasks, in ticks.
    pub time_slice: u64,
    /// The task that runs when nothing else can. Never preempted.
    pub idle_task: TaskId,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            aging_threshold: 1500,
            aging_step: 10,
            max_priority: 149,
            l1_threshold: 100,
            l2_threshold: 50,
            time_slice: 100,
            idle_task: TaskId(0),
        }
    }
}

impl SchedulerConfig {
    /// The ready band a task of `priority` belongs to.
    pub fn level_of(&self, priority: u32) -> Level {
        if priority < self.l2_threshold {
            Level::L3
        } else if priority < self.l1_threshold {
            Level::L2
        } else {
            Level::L1
        }
    }

    pub fn with_aging_threshold(mut self, ticks: u64) -> Self {
        self.aging_threshold = ticks;
        self
    }

    pub fn with_aging_step(mut self, step: u32) -> Self {
        self.aging_step = step;
        self
    }

    pub fn with_time_slice(mut self, ticks: u64) -> Self {
        self.time_slice = ticks;
        self
    }

    pub fn with_idle_task(mut self, id: TaskId) -> Self {
        self.idle_task = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_map_to_bands() {
        let config = SchedulerConfig::default();
        assert_eq!(config.level_of(0), Level::L3);
        assert_eq!(config.level_of(49), Level::L3);
        assert_eq!(config.level_of(50), Level::L2);
        assert_eq!(config.level_of(99), Level::L2);
        assert_eq!(config.level_of(100), Level::L1);
        assert_eq!(config.level_of(149), Level::L1);
    }

    #[test]
    fn header_fits_in_one_sector() {
        assert_eq!(NUM_DIRECT, 30);
        assert_eq!(8 + NUM_DIRECT * 4, SECTOR_SIZE);
    }

    #[test]
    fn capacity_ladder_is_geometric() {
        assert_eq!(SINGLE_SIZE, 3840);
        assert_eq!(DOUBLE_SIZE, 115_200);
        assert_eq!(TRIPLE_SIZE, 3_456_000);
    }

    #[test]
    fn scheduler_knobs_can_be_overridden() {
        let config = SchedulerConfig::default()
            .with_aging_threshold(200)
            .with_aging_step(5)
            .with_time_slice(20)
            .with_idle_task(TaskId(7));
        assert_eq!(config.aging_threshold, 200);
        assert_eq!(config.aging_step, 5);
        assert_eq!(config.time_slice, 20);
        assert_eq!(config.idle_task, TaskId(7));
        assert_eq!(config.max_priority, 149);
    }
}
