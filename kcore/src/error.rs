use thiserror::Error;

use crate::sched::TaskId;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not enough free sectors: need {needed}, have {available}")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("file of {requested} bytes exceeds the {max} byte limit")]
    FileTooLarge { requested: u64, max: u64 },
    #[error("sector device failure")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum SchedError {
    #[error("no task with id {0}")]
    UnknownTask(TaskId),
    #[error("a task with id {0} already exists")]
    DuplicateTask(TaskId),
    #[error("no task can become ready, machine halted")]
    Halted,
}
