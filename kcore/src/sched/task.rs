use std::fmt;

use super::machine::{UserRegisters, NUM_TOTAL_REGS};

/// Identity of a task. Id 0 is conventionally the idle/main task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Written at the bottom of every task stack; anything else there means the
/// stack ran over.
pub const STACK_FENCEPOST: u32 = 0xdedb_eef;
const STACK_WORDS: usize = 256;

/// The user-mode half of a task's state that the scheduler must preserve
/// across a switch.
pub trait AddressSpace {
    fn save_state(&mut self);
    fn restore_state(&mut self);
}

pub struct Task {
    id: TaskId,
    name: String,
    pub(crate) status: TaskStatus,
    pub(crate) priority: u32,
    /// Exponentially averaged CPU burst, in ticks.
    pub(crate) burst_time: u64,
    /// Tick at which the current (or last) burst started.
    pub(crate) burst_start: u64,
    /// Tick at which the task last entered a ready queue or was aged.
    pub(crate) wait_since: u64,
    stack: Vec<u32>,
    pub(crate) user_registers: UserRegisters,
    pub(crate) space: Option<Box<dyn AddressSpace>>,
}

impl Task {
    pub fn new(id: u32, name: &str, priority: u32) -> Self {
        let mut stack = vec![0; STACK_WORDS];
        stack[0] = STACK_FENCEPOST;
        Self {
            id: TaskId(id),
            name: name.to_string(),
            status: TaskStatus::JustCreated,
            priority,
            burst_time: 0,
            burst_start: 0,
            wait_since: 0,
            stack,
            user_registers: [0; NUM_TOTAL_REGS],
            space: None,
        }
    }

    /// Seeds the burst estimate, e.g. from a previous run of the program.
    pub fn with_burst_time(mut self, ticks: u64) -> Self {
        self.burst_time = ticks;
        self
    }

    /// Makes this a user task whose address space is saved and restored
    /// around every switch.
    pub fn with_address_space(mut self, space: Box<dyn AddressSpace>) -> Self {
        self.space = Some(space);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn burst_time(&self) -> u64 {
        self.burst_time
    }

    pub fn burst_start(&self) -> u64 {
        self.burst_start
    }

    pub fn wait_since(&self) -> u64 {
        self.wait_since
    }

    pub fn user_registers(&self) -> &UserRegisters {
        &self.user_registers
    }

    /// The task's own stack. Only the task's execution writes here.
    pub fn stack_mut(&mut self) -> &mut [u32] {
        &mut self.stack
    }

    /// Halts if the fencepost at the bottom of the stack was overwritten.
    pub fn check_overflow(&self) {
        assert_eq!(
            self.stack[0], STACK_FENCEPOST,
            "stack overflow detected in task {} ({})",
            self.id, self.name
        );
    }

    pub(crate) fn save_user_state(&mut self, machine_registers: &UserRegisters) {
        self.user_registers = *machine_registers;
        if let Some(space) = self.space.as_mut() {
            space.save_state();
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("priority", &self.priority)
            .field("burst_time", &self.burst_time)
            .field("burst_start", &self.burst_start)
            .field("wait_since", &self.wait_since)
            .field("user", &self.space.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_intact_stack() {
        let task = Task::new(3, "worker", 60).with_burst_time(12);
        assert_eq!(task.id(), TaskId(3));
        assert_eq!(task.status(), TaskStatus::JustCreated);
        assert_eq!(task.burst_time(), 12);
        task.check_overflow();
    }

    #[test]
    #[should_panic(expected = "stack overflow detected in task 3")]
    fn smashed_fencepost_is_fatal() {
        let mut task = Task::new(3, "worker", 60);
        task.stack_mut()[0] = 0;
        task.check_overflow();
    }
}
