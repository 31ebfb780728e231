/// The sector number to access ranging from 0 (the first sector) to n - 1 (the
/// last sector) where n is number of sectors on the device.
pub type SectorNumber = u32;

/// A synchronous, whole-sector device. Both transfers block until the sector
/// has been moved; there are never partial sector reads or writes.
pub trait SectorStorage {
    /// Number of sectors addressable on this device.
    fn sector_count(&self) -> usize;

    /// Reads sector into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a sector out of range, or into a buffer that is not
    /// exactly one sector long, will return an error.
    fn read_sector(&mut self, sector: SectorNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes provided buffer into the specified sector.
    ///
    /// # Errors
    ///
    /// Attempting to write a sector out of range, or from a buffer that is not
    /// exactly one sector long, will return an error.
    fn write_sector(&mut self, sector: SectorNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Flush any buffered disk IO from memory.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}

pub(crate) fn check_transfer(
    sector: SectorNumber,
    sector_count: usize,
    len: usize,
) -> std::io::Result<()> {
    use std::io::{Error, ErrorKind};

    if sector as usize >= sector_count {
        return Err(Error::new(ErrorKind::InvalidInput, "sector out of range"));
    }
    if len != crate::SECTOR_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "buffer must be exactly one sector long",
        ));
    }
    Ok(())
}
