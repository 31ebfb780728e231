//! Sector-addressed storage used underneath the kernel file system.
//!
//! Two devices are provided: a file backed emulator for persistent test disks
//! and a plain in-memory disk.
mod blockio;
mod emulator;
mod memdisk;

pub use blockio::{SectorNumber, SectorStorage};
pub use emulator::{FileDiskEmulator, FileDiskEmulatorBuilder};
pub use memdisk::MemDisk;

/// Bytes per disk sector. Every transfer moves exactly one sector.
pub const SECTOR_SIZE: usize = 128;
