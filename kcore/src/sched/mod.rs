//! Multilevel feedback scheduling for a single processor.
//!
//! Three ready bands, checked from the top:
//! - L1 (`priority >= 100`): shortest estimated burst first, preemptive.
//! - L2 (`50 <= priority < 100`): highest priority first, preemptive.
//! - L3 (`priority < 50`): FIFO, sliced round-robin by the timer.
//!
//! Waiting tasks are aged so that nothing starves.
mod machine;
mod queue;
mod scheduler;
mod task;

pub use machine::{Machine, SimMachine, UserRegisters, NUM_TOTAL_REGS};
pub use queue::{Level, ReadyQueueSet, SortedQueue};
pub use scheduler::Scheduler;
pub use task::{AddressSpace, Task, TaskId, TaskStatus, STACK_FENCEPOST};
