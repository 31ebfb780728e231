use crate::blockio::{check_transfer, SectorNumber, SectorStorage};
use crate::SECTOR_SIZE;

/// A disk held entirely in memory. Flushing is a no-op.
pub struct MemDisk {
    data: Vec<u8>,
    sector_count: usize,
    reads: usize,
    writes: usize,
}

impl MemDisk {
    /// Creates a zeroed disk of `sector_count` sectors.
    pub fn new(sector_count: usize) -> Self {
        Self {
            data: vec![0; sector_count * SECTOR_SIZE],
            sector_count,
            reads: 0,
            writes: 0,
        }
    }

    /// Number of sector reads served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of sector writes served so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SectorStorage for MemDisk {
    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read_sector(&mut self, sector: SectorNumber, buf: &mut [u8]) -> std::io::Result<()> {
        check_transfer(sector, self.sector_count, buf.len())?;
        let start = sector as usize * SECTOR_SIZE;
        buf.copy_from_slice(&self.data[start..start + SECTOR_SIZE]);
        self.reads += 1;
        Ok(())
    }

    fn write_sector(&mut self, sector: SectorNumber, buf: &[u8]) -> std::io::Result<()> {
        check_transfer(sector, self.sector_count, buf.len())?;
        let start = sector as usize * SECTOR_SIZE;
        self.data[start..start + SECTOR_SIZE].copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_transfers() {
        let mut disk = MemDisk::new(4);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.write_sector(1, &[9; SECTOR_SIZE]).unwrap();
        disk.read_sector(1, &mut buf).unwrap();
        disk.read_sector(0, &mut buf).unwrap();
        assert_eq!(disk.sector_count(), 4);
        assert_eq!(disk.writes(), 1);
        assert_eq!(disk.reads(), 2);
        assert_eq!(buf, [0; SECTOR_SIZE]);
    }

    #[test]
    fn rejects_out_of_range_sector() {
        let mut disk = MemDisk::new(2);
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(disk.read_sector(2, &mut buf).is_err());
    }
}
