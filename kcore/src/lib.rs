//! Resource managers from the core of a small teaching kernel.
//!
//! - [`filehdr`]: the recursive file header mapping file offsets to disk
//!   sectors, allocating from a shared [`alloc::SectorPool`].
//! - [`sched`]: the three level feedback CPU scheduler.
pub mod alloc;
pub mod config;
mod error;
pub mod filehdr;
pub mod sched;

pub use error::{FsError, SchedError};
pub use filehdr::FileHeader;
