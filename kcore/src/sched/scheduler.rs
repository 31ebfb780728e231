//! Picks the next task to run and dispatches to it.
//!
//! Every entry point assumes interrupts are already disabled; on a single
//! processor that is what gives mutual exclusion here. Locks cannot be used
//! instead: waiting on a busy lock would call back into
//! [`Scheduler::find_next_to_run`].

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, warn};

use super::machine::Machine;
use super::queue::{Level, ReadyQueueSet};
use super::task::{Task, TaskId, TaskStatus};
use crate::config::SchedulerConfig;
use crate::error::SchedError;

pub struct Scheduler<M: Machine> {
    machine: M,
    config: SchedulerConfig,
    tasks: BTreeMap<TaskId, Task>,
    ready: ReadyQueueSet,
    current: TaskId,
    /// A finished task whose stack may still be in use until the next switch
    /// completes.
    to_be_destroyed: Option<TaskId>,
}

/// Halfway between the previous estimate and the burst just observed.
fn approximate_burst(estimate: u64, elapsed: u64) -> u64 {
    (estimate + elapsed) / 2
}

impl<M: Machine> Scheduler<M> {
    /// Starts scheduling with `main` already on the processor.
    pub fn new(machine: M, config: SchedulerConfig, mut main: Task) -> Self {
        main.status = TaskStatus::Running;
        main.burst_start = machine.total_ticks();
        let current = main.id();
        let mut tasks = BTreeMap::new();
        tasks.insert(current, main);
        Self {
            machine,
            config,
            tasks,
            ready: ReadyQueueSet::default(),
            current,
            to_be_destroyed: None,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The task on the processor.
    pub fn current(&self) -> TaskId {
        self.current
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    /// Contents of one ready queue, head first.
    pub fn ready_queue(&self, level: Level) -> Vec<TaskId> {
        self.ready.tasks(level)
    }

    /// The ready queue currently holding `id`.
    pub fn queued_in(&self, id: TaskId) -> Option<Level> {
        self.ready.level_of(id)
    }

    pub fn pending_destruction(&self) -> Option<TaskId> {
        self.to_be_destroyed
    }

    fn assert_interrupts_off(&self) {
        assert!(
            !self.machine.interrupts_enabled(),
            "scheduler entered with interrupts enabled"
        );
    }

    fn current_task(&self) -> &Task {
        &self.tasks[&self.current]
    }

    /// Hands a new task to the scheduler and makes it ready. Priorities above
    /// the configured maximum are lowered to it.
    pub fn spawn(&mut self, mut task: Task) -> Result<TaskId, SchedError> {
        let id = task.id();
        if self.tasks.contains_key(&id) {
            return Err(SchedError::DuplicateTask(id));
        }
        if task.priority > self.config.max_priority {
            warn!(
                "task {} asked for priority {}, capped at {}",
                id, task.priority, self.config.max_priority
            );
            task.priority = self.config.max_priority;
        }
        self.tasks.insert(id, task);
        self.admit(id);
        Ok(id)
    }

    /// Marks a task ready and queues it in the band its priority selects,
    /// requesting preemption of the running task when the newcomer should
    /// run first.
    pub fn ready_to_run(&mut self, id: TaskId) -> Result<(), SchedError> {
        if !self.tasks.contains_key(&id) {
            return Err(SchedError::UnknownTask(id));
        }
        self.admit(id);
        Ok(())
    }

    fn admit(&mut self, id: TaskId) {
        self.assert_interrupts_off();
        let now = self.machine.total_ticks();
        let running = self.current_task();
        let running_id = running.id();
        let running_priority = running.priority;
        let running_level = self.config.level_of(running_priority);
        let running_estimate =
            approximate_burst(running.burst_time, now.saturating_sub(running.burst_start));
        let running_idle = running_id == self.config.idle_task;

        let task = match self.tasks.get_mut(&id) {
            Some(task) => task,
            None => return,
        };
        debug!("Putting task on ready list: {}", task.name());
        task.status = TaskStatus::Ready;
        task.wait_since = now;
        let level = self.config.level_of(task.priority);
        self.ready.insert(level, task);
        info!("Tick {}: Task {} is inserted into queue {}", now, id, level);

        let preempt = match level {
            Level::L3 => false,
            Level::L2 => task.priority > running_priority && !running_idle,
            Level::L1 => {
                debug!(
                    "approximated burst time ({},{})=({},{})",
                    running_id, id, running_estimate, task.burst_time
                );
                if id == running_id || running_idle {
                    false
                } else if running_level == Level::L1 {
                    task.burst_time < running_estimate
                } else {
                    true
                }
            }
        };
        if preempt {
            self.machine.request_preemption();
        }
    }

    /// Removes and returns the next task to run, L1 before L2 before L3.
    /// `None` means the processor should idle.
    pub fn find_next_to_run(&mut self) -> Option<TaskId> {
        self.assert_interrupts_off();
        let (id, level) = self.ready.pop_next()?;
        info!(
            "Tick {}: Task {} is removed from queue {}",
            self.machine.total_ticks(),
            id,
            level
        );
        Some(id)
    }

    /// Dispatches the processor to `next`.
    ///
    /// The running task's state must already have been changed from running
    /// to blocked or ready. With `finishing` set, the outgoing task is
    /// destroyed once execution has moved off its stack.
    ///
    /// # Panics
    ///
    /// Panics if interrupts are enabled, if another finished task is still
    /// waiting to be destroyed, or if the outgoing task overflowed its stack.
    pub fn run(&mut self, next: TaskId, finishing: bool) -> Result<(), SchedError> {
        self.assert_interrupts_off();
        let old = self.current;
        if old == next {
            return Ok(());
        }
        if !self.tasks.contains_key(&next) {
            return Err(SchedError::UnknownTask(next));
        }

        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "task {:?} is still waiting to be destroyed",
                self.to_be_destroyed
            );
            self.to_be_destroyed = Some(old);
        }

        let now = self.machine.total_ticks();
        let registers = self.machine.user_registers();
        let old_task = self.tasks.get_mut(&old).ok_or(SchedError::UnknownTask(old))?;
        if old_task.space.is_some() {
            old_task.save_user_state(&registers);
        }
        old_task.check_overflow();
        let duration = now.saturating_sub(old_task.burst_start);
        old_task.burst_time = approximate_burst(old_task.burst_time, duration);
        if finishing {
            old_task.status = TaskStatus::Terminated;
        }

        self.current = next;
        if let Some(next_task) = self.tasks.get_mut(&next) {
            next_task.status = TaskStatus::Running;
            next_task.burst_start = now;
        }
        info!("Tick {}: Task {} is now selected for execution", now, next);
        info!(
            "Tick {}: Task {} is replaced, and it has executed {} ticks",
            now, old, duration
        );
        debug!(
            "Switching from: {} to: {}",
            self.tasks[&old].name(),
            self.tasks[&next].name()
        );

        self.machine.switch(&self.tasks[&old], &self.tasks[&next]);

        self.resume();
        Ok(())
    }

    /// The second half of a switch, executed by whichever task was resumed.
    fn resume(&mut self) {
        // Interrupts are off when we come back from a switch.
        self.assert_interrupts_off();
        debug!("Now in task: {}", self.current_task().name());

        self.check_to_be_destroyed();

        let task = match self.tasks.get_mut(&self.current) {
            Some(task) => task,
            None => return,
        };
        if let Some(space) = task.space.as_mut() {
            self.machine.load_user_registers(&task.user_registers);
            space.restore_state();
        }
    }

    /// Reaps the task that finished before the latest switch. This cannot
    /// happen earlier because until the switch we were still on its stack.
    fn check_to_be_destroyed(&mut self) {
        if let Some(id) = self.to_be_destroyed.take() {
            if self.tasks.remove(&id).is_some() {
                debug!("destroyed task {}", id);
            }
        }
    }

    /// Raises the priority of tasks that have waited longer than the aging
    /// threshold. L2 tasks are requeued and may move up to L1; L1 tasks are
    /// ordered by burst, so only their priority changes.
    pub fn aging(&mut self) {
        self.assert_interrupts_off();
        let now = self.machine.total_ticks();
        let threshold = self.config.aging_threshold;
        let step = self.config.aging_step;
        let max = self.config.max_priority;

        for id in self.ready.tasks(Level::L1) {
            let task = match self.tasks.get_mut(&id) {
                Some(task) => task,
                None => continue,
            };
            if now.saturating_sub(task.wait_since) > threshold {
                let old_priority = task.priority;
                task.priority = (old_priority + step).min(max);
                task.wait_since = now;
                if old_priority < max {
                    info!(
                        "Tick {}: Task {} changes its priority from {} to {}",
                        now, id, old_priority, task.priority
                    );
                }
            }
        }

        let stale: Vec<TaskId> = self
            .ready
            .tasks(Level::L2)
            .into_iter()
            .filter(|id| {
                self.tasks
                    .get(id)
                    .map_or(false, |t| now.saturating_sub(t.wait_since) > threshold)
            })
            .collect();
        for id in stale {
            self.ready.remove(Level::L2, id);
            if let Some(task) = self.tasks.get_mut(&id) {
                let old_priority = task.priority;
                task.priority = (old_priority + step).min(max);
                task.wait_since = now;
                info!(
                    "Tick {}: Task {} changes its priority from {} to {}",
                    now, id, old_priority, task.priority
                );
            }
            info!("Tick {}: Task {} is removed from queue {}", now, id, Level::L2);
            self.admit(id);
        }
    }

    /// Timer interrupt work: age waiting tasks and slice L3 tasks round-robin.
    pub fn timer_tick(&mut self) {
        self.aging();
        let now = self.machine.total_ticks();
        let running = self.current_task();
        if running.id() != self.config.idle_task
            && self.config.level_of(running.priority) == Level::L3
            && now.saturating_sub(running.burst_start) >= self.config.time_slice
        {
            self.machine.request_preemption();
        }
    }

    /// Gives up the processor if any other task is ready; the current task
    /// goes back on its ready queue.
    pub fn yield_now(&mut self) -> Result<(), SchedError> {
        if let Some(next) = self.find_next_to_run() {
            let current = self.current;
            self.admit(current);
            self.run(next, false)?;
        }
        Ok(())
    }

    /// Blocks the current task and runs the next ready one, idling the
    /// machine until one exists.
    ///
    /// # Errors
    ///
    /// [`SchedError::Halted`] when nothing is ready and no interrupt is
    /// pending that could change that. Wakeups for tasks the scheduler does
    /// not know are dropped.
    pub fn sleep(&mut self, finishing: bool) -> Result<(), SchedError> {
        let current = self.current;
        if let Some(task) = self.tasks.get_mut(&current) {
            task.status = TaskStatus::Blocked;
        }
        loop {
            if let Some(next) = self.find_next_to_run() {
                if next == current {
                    if let Some(task) = self.tasks.get_mut(&current) {
                        task.status = TaskStatus::Running;
                    }
                    return Ok(());
                }
                return self.run(next, finishing);
            }
            let woken = self.machine.idle();
            if woken.is_empty() {
                return Err(SchedError::Halted);
            }
            for id in woken {
                if self.ready_to_run(id).is_err() {
                    warn!("ignoring wakeup for unknown task {}", id);
                }
            }
        }
    }

    /// Ends the current task. It is destroyed after the switch away from it.
    pub fn finish(&mut self) -> Result<(), SchedError> {
        self.sleep(true)
    }
}

impl<M: Machine> fmt::Display for Scheduler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in [Level::L1, Level::L2, Level::L3].iter() {
            writeln!(f, "{} Queue contents:", level)?;
            for id in self.ready.tasks(*level) {
                if let Some(task) = self.tasks.get(&id) {
                    writeln!(
                        f,
                        "  {} ({}) priority {} burst {}",
                        id,
                        task.name(),
                        task.priority,
                        task.burst_time
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SimMachine;

    fn scheduler() -> Scheduler<SimMachine> {
        Scheduler::new(
            SimMachine::new(),
            SchedulerConfig::default(),
            Task::new(0, "main", 0),
        )
    }

    #[test]
    fn burst_estimate_is_an_even_average() {
        assert_eq!(approximate_burst(0, 0), 0);
        assert_eq!(approximate_burst(10, 31), 20);
        assert_eq!(approximate_burst(100, 0), 50);
    }

    #[test]
    fn spawn_rejects_duplicate_ids() {
        let mut sched = scheduler();
        sched.spawn(Task::new(1, "a", 10)).unwrap();
        assert_eq!(
            sched.spawn(Task::new(1, "b", 10)),
            Err(SchedError::DuplicateTask(TaskId(1)))
        );
    }

    #[test]
    fn unknown_task_is_an_error() {
        let mut sched = scheduler();
        assert_eq!(sched.ready_to_run(TaskId(9)), Err(SchedError::UnknownTask(TaskId(9))));
        assert_eq!(sched.run(TaskId(9), false), Err(SchedError::UnknownTask(TaskId(9))));
    }

    #[test]
    fn spawn_caps_priority() {
        let mut sched = scheduler();
        sched.spawn(Task::new(1, "greedy", 200)).unwrap();
        assert_eq!(sched.task(TaskId(1)).unwrap().priority(), 149);
        assert_eq!(sched.queued_in(TaskId(1)), Some(Level::L1));

        // Aging never moves a capped task downwards.
        sched.machine_mut().advance(2000);
        sched.aging();
        assert_eq!(sched.task(TaskId(1)).unwrap().priority(), 149);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn admission_with_interrupts_on_is_fatal() {
        let mut sched = scheduler();
        sched.machine_mut().set_interrupts_enabled(true);
        let _ = sched.spawn(Task::new(1, "a", 10));
    }

    #[test]
    fn display_lists_every_queue() {
        let mut sched = scheduler();
        sched.spawn(Task::new(1, "io", 120).with_burst_time(5)).unwrap();
        sched.spawn(Task::new(2, "batch", 10)).unwrap();
        let dump = sched.to_string();
        assert_eq!(
            dump,
            "L1 Queue contents:\n  1 (io) priority 120 burst 5\n\
             L2 Queue contents:\n\
             L3 Queue contents:\n  2 (batch) priority 10 burst 0\n"
        );
    }
}
