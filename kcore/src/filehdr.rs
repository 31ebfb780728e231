//! The on-disk file header: a fixed size table of sector references that
//! fits in exactly one sector.
//!
//! Small files (up to [`SINGLE_SIZE`] bytes) keep their data sector numbers
//! directly in the table. Larger files turn the table into references to child
//! headers, each describing a [`SINGLE_SIZE`], [`DOUBLE_SIZE`] or
//! [`TRIPLE_SIZE`] chunk of the file, chosen by the size of the whole file:
//!
//! ```text
//! size <= SINGLE_SIZE                 entries are data sectors
//! SINGLE_SIZE < size <= DOUBLE_SIZE   entries are single-band headers
//! DOUBLE_SIZE < size <= TRIPLE_SIZE   entries are double-band headers
//! TRIPLE_SIZE < size                  entries are triple-band headers
//! ```
//!
//! Child headers are allocated, written to their own sector and dropped; a
//! parent only remembers where its children live.

use std::io::Write;

use fileblock::{SectorNumber, SectorStorage};
use log::{debug, warn};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::alloc::SectorPool;
use crate::config::*;
use crate::error::FsError;

/// Marks a table entry that does not reference anything.
pub const UNUSED_SECTOR: SectorNumber = SectorNumber::MAX;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug, PartialEq)]
/// This structure __must be exactly one sector.__
pub struct FileHeader {
    /// Bytes covered by this header's subtree.
    num_bytes: u32,
    /// Data sectors covered by this header's subtree, `ceil(num_bytes / SECTOR_SIZE)`.
    num_sectors: u32,
    /// Data sectors for a leaf, child header sectors otherwise.
    data_sectors: [SectorNumber; NUM_DIRECT],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == SECTOR_SIZE);

fn div_round_up(n: u32, d: u32) -> u32 {
    n / d + (n % d != 0) as u32
}

/// Bytes described by each child of a header covering `num_bytes`, or `None`
/// when the header is a leaf.
fn child_span(num_bytes: u32) -> Option<u32> {
    if num_bytes > TRIPLE_SIZE {
        Some(TRIPLE_SIZE)
    } else if num_bytes > DOUBLE_SIZE {
        Some(DOUBLE_SIZE)
    } else if num_bytes > SINGLE_SIZE {
        Some(SINGLE_SIZE)
    } else {
        None
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHeader {
    /// An empty header. Fill it with [`FileHeader::allocate`] or load one with
    /// [`FileHeader::fetch_from`].
    pub fn new() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            data_sectors: [UNUSED_SECTOR; NUM_DIRECT],
        }
    }

    /// Total sectors a file of `file_size` bytes takes from the pool: its data
    /// sectors plus one sector for every child header below the root.
    pub fn sectors_required(file_size: u32) -> usize {
        match child_span(file_size) {
            None => div_round_up(file_size, SECTOR_SIZE as u32) as usize,
            Some(span) => {
                let full = (file_size / span) as usize;
                let rest = file_size % span;
                let mut total = full * (1 + Self::sectors_required(span));
                if rest > 0 {
                    total += 1 + Self::sectors_required(rest);
                }
                total
            }
        }
    }

    /// Initializes a fresh header for a newly created file, taking every
    /// sector the file needs out of `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::InsufficientSpace`] without touching `pool` when the
    /// file does not fit. If the device fails part way, every sector taken so
    /// far is handed back and the header is left empty.
    pub fn allocate<D, P>(&mut self, disk: &mut D, pool: &mut P, file_size: u32) -> Result<(), FsError>
    where
        D: SectorStorage,
        P: SectorPool,
    {
        if file_size as u64 > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge {
                requested: file_size as u64,
                max: MAX_FILE_SIZE,
            });
        }
        let needed = Self::sectors_required(file_size);
        let available = pool.num_clear();
        if available < needed {
            return Err(FsError::InsufficientSpace { needed, available });
        }

        let mut taken = Vec::with_capacity(needed);
        if let Err(e) = self.allocate_tree(disk, pool, file_size, &mut taken) {
            warn!(
                "allocation of {} bytes failed, returning {} sectors: {}",
                file_size,
                taken.len(),
                e
            );
            for sector in taken {
                pool.clear(sector);
            }
            *self = FileHeader::new();
            return Err(e);
        }
        debug!(
            "allocated {} bytes over {} sectors",
            file_size,
            taken.len()
        );
        Ok(())
    }

    fn allocate_tree<D, P>(
        &mut self,
        disk: &mut D,
        pool: &mut P,
        file_size: u32,
        taken: &mut Vec<SectorNumber>,
    ) -> Result<(), FsError>
    where
        D: SectorStorage,
        P: SectorPool,
    {
        self.num_bytes = file_size;
        self.num_sectors = div_round_up(file_size, SECTOR_SIZE as u32);

        match child_span(file_size) {
            Some(span) => {
                let mut remaining = file_size;
                for slot in self.data_sectors.iter_mut() {
                    if remaining == 0 {
                        break;
                    }
                    let sector = take_sector(pool, taken)?;
                    *slot = sector;
                    let chunk = remaining.min(span);
                    let mut child = FileHeader::new();
                    child.allocate_tree(disk, pool, chunk, taken)?;
                    child.write_back(disk, sector)?;
                    remaining -= chunk;
                }
            }
            None => {
                for slot in self.data_sectors.iter_mut().take(self.num_sectors as usize) {
                    *slot = take_sector(pool, taken)?;
                }
            }
        }
        Ok(())
    }

    /// Returns every sector owned by this header's subtree to `pool`. The
    /// sector holding this header itself belongs to the caller.
    ///
    /// # Panics
    ///
    /// Panics if a data sector is already free in `pool`, which means the pool
    /// and the headers disagree and continuing would corrupt the disk.
    pub fn deallocate<D, P>(&self, disk: &mut D, pool: &mut P) -> Result<(), FsError>
    where
        D: SectorStorage,
        P: SectorPool,
    {
        match child_span(self.num_bytes) {
            Some(span) => {
                // Single-band children hold NUM_DIRECT sectors each, so this is
                // ceil(num_sectors / NUM_DIRECT) there.
                let per_child = span / SECTOR_SIZE as u32;
                let children = div_round_up(self.num_sectors, per_child) as usize;
                for &sector in &self.data_sectors[..children] {
                    let child = FileHeader::fetch_from(disk, sector)?;
                    child.deallocate(disk, pool)?;
                    release(pool, sector);
                }
            }
            None => {
                for &sector in &self.data_sectors[..self.num_sectors as usize] {
                    release(pool, sector);
                }
            }
        }
        Ok(())
    }

    /// Loads the header stored in `sector`.
    pub fn fetch_from<D: SectorStorage>(disk: &mut D, sector: SectorNumber) -> Result<Self, FsError> {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(sector, &mut buf)?;
        let hdr = FileHeader::read_from(&buf[..]).ok_or_else(|| corrupt(sector))?;
        if hdr.num_sectors != div_round_up(hdr.num_bytes, SECTOR_SIZE as u32)
            || hdr.num_bytes as u64 > MAX_FILE_SIZE
        {
            return Err(corrupt(sector));
        }
        Ok(hdr)
    }

    /// Writes this header to `sector`.
    pub fn write_back<D: SectorStorage>(&self, disk: &mut D, sector: SectorNumber) -> Result<(), FsError> {
        disk.write_sector(sector, self.as_bytes())?;
        Ok(())
    }

    /// Translates a byte offset within the file into the sector storing it.
    /// The result is meaningless for `offset >= file_length()`.
    pub fn byte_to_sector<D: SectorStorage>(&self, disk: &mut D, offset: u32) -> Result<SectorNumber, FsError> {
        debug_assert!(offset < self.num_bytes, "offset {} past end of file", offset);
        match child_span(self.num_bytes) {
            Some(span) => {
                let index = (offset / span) as usize;
                let child = FileHeader::fetch_from(disk, self.data_sectors[index])?;
                child.byte_to_sector(disk, offset - index as u32 * span)
            }
            None => Ok(self.data_sectors[offset as usize / SECTOR_SIZE]),
        }
    }

    /// Number of bytes in the file.
    pub fn file_length(&self) -> u32 {
        self.num_bytes
    }

    pub fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    /// True when the table entries reference data rather than child headers.
    pub fn is_leaf(&self) -> bool {
        child_span(self.num_bytes).is_none()
    }

    /// Every data sector of the file, in file offset order.
    pub fn data_sectors<D: SectorStorage>(&self, disk: &mut D) -> Result<Vec<SectorNumber>, FsError> {
        match child_span(self.num_bytes) {
            Some(span) => {
                let children = div_round_up(self.num_bytes, span) as usize;
                let mut sectors = Vec::with_capacity(self.num_sectors as usize);
                for &sector in &self.data_sectors[..children] {
                    let child = FileHeader::fetch_from(disk, sector)?;
                    sectors.extend(child.data_sectors(disk)?);
                }
                Ok(sectors)
            }
            None => Ok(self.data_sectors[..self.num_sectors as usize].to_vec()),
        }
    }

    /// Dumps the header and the file contents it points to. Non-printable
    /// bytes are written as `\` followed by their hex value.
    pub fn print<D: SectorStorage, W: Write>(&self, disk: &mut D, out: &mut W) -> Result<(), FsError> {
        writeln!(
            out,
            "FileHeader contents.  File size: {}.  File blocks:",
            self.num_bytes
        )?;
        if let Some(span) = child_span(self.num_bytes) {
            let children = div_round_up(self.num_bytes, span) as usize;
            for &sector in &self.data_sectors[..children] {
                writeln!(out, "Indirect FileHeader: {}", sector)?;
                FileHeader::fetch_from(disk, sector)?.print(disk, out)?;
            }
            return Ok(());
        }

        let sectors = &self.data_sectors[..self.num_sectors as usize];
        for sector in sectors {
            write!(out, "{} ", sector)?;
        }
        writeln!(out, "\nFile contents:")?;
        let mut data = [0u8; SECTOR_SIZE];
        let mut remaining = self.num_bytes as usize;
        for &sector in sectors {
            disk.read_sector(sector, &mut data)?;
            for &byte in data.iter().take(remaining) {
                if (0x20..=0x7e).contains(&byte) {
                    write!(out, "{}", byte as char)?;
                } else {
                    write!(out, "\\{:x}", byte)?;
                }
            }
            remaining = remaining.saturating_sub(SECTOR_SIZE);
            writeln!(out)?;
        }
        Ok(())
    }
}

fn take_sector<P: SectorPool>(pool: &mut P, taken: &mut Vec<SectorNumber>) -> Result<SectorNumber, FsError> {
    let sector = pool.find_and_set().ok_or(FsError::InsufficientSpace {
        needed: 1,
        available: 0,
    })?;
    taken.push(sector);
    Ok(sector)
}

fn release<P: SectorPool>(pool: &mut P, sector: SectorNumber) {
    assert!(
        pool.test(sector),
        "pool consistency violation: sector {} owned by a file header is not in use",
        sector
    );
    pool.clear(sector);
}

fn corrupt(sector: SectorNumber) -> FsError {
    FsError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("sector {} does not hold a valid file header", sector),
    ))
}
