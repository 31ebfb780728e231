use crate::blockio::{check_transfer, SectorNumber, SectorStorage};
use crate::SECTOR_SIZE;
use log::trace;
use std::fs::File;
use std::io::prelude::*;
use std::io::SeekFrom;

/// Emulates a sector disk in userspace using a file as backing storage.
/// This is only meant to be used for file system development and testing.
pub struct FileDiskEmulator {
    /// The file must be a fixed-size file some exact multiple of the sector size.
    fd: File,
    /// The total number of sectors available in the file store.
    sector_count: usize,
}

impl FileDiskEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }
}

impl SectorStorage for FileDiskEmulator {
    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read_sector(&mut self, sector: SectorNumber, buf: &mut [u8]) -> std::io::Result<()> {
        check_transfer(sector, self.sector_count, buf.len())?;
        trace!("read sector {}", sector);
        self.fd
            .seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))?;
        self.fd.read_exact(buf)
    }

    fn write_sector(&mut self, sector: SectorNumber, buf: &[u8]) -> std::io::Result<()> {
        check_transfer(sector, self.sector_count, buf.len())?;
        trace!("write sector {}", sector);
        self.fd
            .seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))?;
        self.fd.write_all(buf)
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

pub struct FileDiskEmulatorBuilder {
    fd: File,
    sector_count: usize,
    clear_medium: bool,
}

impl From<File> for FileDiskEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileDiskEmulatorBuilder {
            fd,
            sector_count: 0,
            clear_medium: true,
        }
    }
}

impl FileDiskEmulatorBuilder {
    /// Sets the number of sectors on the emulated device.
    pub fn with_sector_count(mut self, sectors: usize) -> Self {
        self.sector_count = sectors;
        self
    }

    /// Whether to zero the whole medium on build. Turn this off to reopen a
    /// disk that already holds data.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and, unless
    /// told otherwise, zeroes it. Ownership of the file is transferred to the
    /// emulator so a builder creates exactly one emulator.
    pub fn build(mut self) -> std::io::Result<FileDiskEmulator> {
        if self.sector_count == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "a disk needs at least one sector",
            ));
        }
        if self.clear_medium {
            self.zero_medium()?;
        }
        Ok(FileDiskEmulator {
            fd: self.fd,
            sector_count: self.sector_count,
        })
    }

    fn zero_medium(&mut self) -> std::io::Result<()> {
        let total_bytes = self.sector_count * SECTOR_SIZE;
        self.fd.seek(SeekFrom::Start(0))?;
        self.fd.write_all(&vec![0x00; total_bytes])?;
        self.fd.set_len(total_bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_device(sectors: usize) -> FileDiskEmulator {
        let fs_block = tempfile::tempfile().unwrap();
        FileDiskEmulatorBuilder::from(fs_block)
            .with_sector_count(sectors)
            .build()
            .expect("failed to allocate file disk")
    }

    #[test]
    fn file_emulator_allocates_correct_num_bytes() {
        let mut disk_emu = create_test_device(4);
        disk_emu.sync_disk().unwrap();
        assert_eq!(
            disk_emu.into_file().metadata().unwrap().len(),
            4 * SECTOR_SIZE as u64
        );
    }

    #[test]
    fn can_read_and_write_sectors() {
        let mut disk_emu = create_test_device(4);

        disk_emu.write_sector(2, &[0x55; SECTOR_SIZE]).unwrap();
        disk_emu.sync_disk().unwrap();

        // Read a different sector.
        let mut read_block = [0x00; SECTOR_SIZE];
        disk_emu.read_sector(3, &mut read_block).unwrap();
        assert_eq!(read_block, [0x00; SECTOR_SIZE]);

        // Read the sector with data.
        disk_emu.read_sector(2, &mut read_block).unwrap();
        assert_eq!(read_block, [0x55; SECTOR_SIZE]);
    }

    #[test]
    fn can_read_and_write_start_and_end_sectors() {
        let mut disk_emu = create_test_device(2);

        disk_emu.write_sector(0, &[0x11; SECTOR_SIZE]).unwrap();
        disk_emu.write_sector(1, &[0x22; SECTOR_SIZE]).unwrap();

        let mut read_block = [0x00; SECTOR_SIZE];
        disk_emu.read_sector(0, &mut read_block).unwrap();
        assert_eq!(read_block, [0x11; SECTOR_SIZE]);
        disk_emu.read_sector(1, &mut read_block).unwrap();
        assert_eq!(read_block, [0x22; SECTOR_SIZE]);
    }

    #[test]
    fn write_beyond_range_returns_error() {
        let mut disk_emu = create_test_device(1);
        assert!(disk_emu.write_sector(1, &[0x55; SECTOR_SIZE]).is_err());
    }

    #[test]
    fn partial_sector_transfer_returns_error() {
        let mut disk_emu = create_test_device(1);
        let mut short = [0x00; SECTOR_SIZE - 1];
        assert!(disk_emu.read_sector(0, &mut short).is_err());
    }

    #[test]
    fn reopening_without_clearing_keeps_contents() {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let mut emu = FileDiskEmulatorBuilder::from(disk.reopen().unwrap())
            .with_sector_count(8)
            .build()
            .unwrap();
        emu.write_sector(5, &[0x7a; SECTOR_SIZE]).unwrap();
        emu.sync_disk().unwrap();

        let mut emu = FileDiskEmulatorBuilder::from(disk.reopen().unwrap())
            .with_sector_count(8)
            .clear_medium(false)
            .build()
            .unwrap();
        let mut buf = [0x00; SECTOR_SIZE];
        emu.read_sector(5, &mut buf).unwrap();
        assert_eq!(buf, [0x7a; SECTOR_SIZE]);
    }

    #[test]
    fn building_without_sectors_fails() {
        let fs_block = tempfile::tempfile().unwrap();
        assert!(FileDiskEmulatorBuilder::from(fs_block).build().is_err());
    }
}
