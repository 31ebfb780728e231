//! The hardware the scheduler drives: a tick counter, the interrupt level,
//! the preemption request line and the context switch itself.

use super::task::{Task, TaskId};

/// Number of user-visible machine registers saved per task.
pub const NUM_TOTAL_REGS: usize = 40;

pub type UserRegisters = [i64; NUM_TOTAL_REGS];

pub trait Machine {
    /// Monotonic tick counter.
    fn total_ticks(&self) -> u64;

    fn interrupts_enabled(&self) -> bool;

    /// Asks the interrupt layer to preempt the running task at the next
    /// opportunity. Never switches by itself.
    fn request_preemption(&mut self);

    /// Transfers the processor from `from` to `to`. Control comes back here
    /// once some later switch resumes a task.
    fn switch(&mut self, from: &Task, to: &Task);

    /// Current contents of the user registers.
    fn user_registers(&self) -> UserRegisters;

    fn load_user_registers(&mut self, regs: &UserRegisters);

    /// Waits for the next pending interrupt and returns the tasks it made
    /// runnable. Returns an empty list when nothing is pending, meaning the
    /// machine would halt.
    fn idle(&mut self) -> Vec<TaskId>;
}

/// A deterministic machine for driving the scheduler without hardware.
///
/// `switch` records the transfer and returns at once: from the scheduler's
/// point of view the next task is resumed immediately.
#[derive(Debug)]
pub struct SimMachine {
    ticks: u64,
    interrupts_enabled: bool,
    preemption_requests: usize,
    switches: Vec<(TaskId, TaskId)>,
    registers: Vec<i64>,
    wakeups: Vec<(u64, TaskId)>,
}

impl SimMachine {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            interrupts_enabled: false,
            preemption_requests: 0,
            switches: Vec::new(),
            registers: vec![0; NUM_TOTAL_REGS],
            wakeups: Vec::new(),
        }
    }

    pub fn advance(&mut self, ticks: u64) {
        self.ticks += ticks;
    }

    pub fn set_ticks(&mut self, ticks: u64) {
        assert!(ticks >= self.ticks, "ticks only move forward");
        self.ticks = ticks;
    }

    pub fn set_interrupts_enabled(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    /// Preemption requests since the last [`SimMachine::take_preemption`].
    pub fn preemption_requests(&self) -> usize {
        self.preemption_requests
    }

    /// Consumes any pending preemption request.
    pub fn take_preemption(&mut self) -> bool {
        let pending = self.preemption_requests > 0;
        self.preemption_requests = 0;
        pending
    }

    /// Every `(from, to)` transfer so far.
    pub fn switches(&self) -> &[(TaskId, TaskId)] {
        &self.switches
    }

    pub fn registers_mut(&mut self) -> &mut [i64] {
        &mut self.registers
    }

    /// Schedules `task` to become runnable when the clock reaches `tick`.
    pub fn wake_at(&mut self, tick: u64, task: TaskId) {
        self.wakeups.push((tick, task));
    }
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for SimMachine {
    fn total_ticks(&self) -> u64 {
        self.ticks
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    fn request_preemption(&mut self) {
        self.preemption_requests += 1;
    }

    fn switch(&mut self, from: &Task, to: &Task) {
        self.switches.push((from.id(), to.id()));
    }

    fn user_registers(&self) -> UserRegisters {
        let mut regs = [0; NUM_TOTAL_REGS];
        regs.copy_from_slice(&self.registers);
        regs
    }

    fn load_user_registers(&mut self, regs: &UserRegisters) {
        self.registers.copy_from_slice(regs);
    }

    fn idle(&mut self) -> Vec<TaskId> {
        let next = match self.wakeups.iter().map(|(tick, _)| *tick).min() {
            Some(tick) => tick,
            None => return Vec::new(),
        };
        self.ticks = self.ticks.max(next);
        let now = self.ticks;
        let mut woken = Vec::new();
        self.wakeups.retain(|&(tick, task)| {
            if tick <= now {
                woken.push(task);
                false
            } else {
                true
            }
        });
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_jumps_to_the_next_wakeup() {
        let mut machine = SimMachine::new();
        machine.wake_at(50, TaskId(2));
        machine.wake_at(20, TaskId(1));
        machine.wake_at(20, TaskId(3));

        assert_eq!(machine.idle(), vec![TaskId(1), TaskId(3)]);
        assert_eq!(machine.total_ticks(), 20);
        assert_eq!(machine.idle(), vec![TaskId(2)]);
        assert_eq!(machine.total_ticks(), 50);
        assert!(machine.idle().is_empty());
    }

    #[test]
    fn preemption_requests_are_consumed() {
        let mut machine = SimMachine::new();
        machine.request_preemption();
        machine.request_preemption();
        assert_eq!(machine.preemption_requests(), 2);
        assert!(machine.take_preemption());
        assert!(!machine.take_preemption());
    }
}
