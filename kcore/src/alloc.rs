use crate::config::SECTOR_SIZE;
use fileblock::{SectorNumber, SectorStorage};
use zerocopy::{AsBytes, FromBytes};

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// The free-space pool file headers allocate from.
pub trait SectorPool {
    /// Reserves the first free sector, or returns `None` when the pool is full.
    fn find_and_set(&mut self) -> Option<SectorNumber>;
    /// Returns a sector to the pool.
    fn clear(&mut self, sector: SectorNumber);
    /// True when the sector is in use.
    fn test(&self, sector: SectorNumber) -> bool;
    /// Number of free sectors.
    fn num_clear(&self) -> usize;
}

/// Tracks one bit per disk sector, packed into 64-bit words.
#[derive(Debug, Clone)]
pub struct SectorBitmap {
    bits: Vec<u64>,
    num_sectors: usize,
    /// Keeps track of the next starting place for looking for free sectors.
    marker: usize,
}

impl SectorBitmap {
    pub fn new(num_sectors: usize) -> Self {
        Self {
            bits: vec![0; (num_sectors + 63) / 64],
            num_sectors,
            marker: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.num_sectors
    }

    pub fn is_empty(&self) -> bool {
        self.num_sectors == 0
    }

    pub fn get(&self, sector: SectorNumber) -> State {
        let sector = sector as usize;
        assert!(sector < self.num_sectors, "sector {} outside the bitmap", sector);
        let word = self.bits[sector / 64];
        match (word >> (sector % 64)) & 0b01 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    /// Reserves a specific sector, e.g. one holding the bitmap itself.
    pub fn mark(&mut self, sector: SectorNumber) {
        let sector = sector as usize;
        assert!(sector < self.num_sectors, "sector {} outside the bitmap", sector);
        self.bits[sector / 64] |= 0b01_u64 << (sector % 64);
    }

    /// Sectors needed to persist this bitmap.
    pub fn sectors_on_disk(&self) -> usize {
        (self.bits.len() * 8 + SECTOR_SIZE - 1) / SECTOR_SIZE
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut encoded = self.bits.as_slice().as_bytes().to_vec();
        encoded.resize(self.sectors_on_disk() * SECTOR_SIZE, 0);
        encoded
    }

    /// Rebuilds a bitmap of `num_sectors` bits from its serialized form.
    /// Passing a buffer shorter than the packed words will result in a panic.
    pub fn parse(buf: &[u8], num_sectors: usize) -> Self {
        let mut bmp = Self::new(num_sectors);
        assert!(
            buf.len() >= bmp.bits.len() * 8,
            "Buffer too short for a bitmap of {} sectors.",
            num_sectors
        );
        for (word, chunk) in bmp.bits.iter_mut().zip(buf.chunks_exact(8)) {
            *word = u64::read_from(chunk).unwrap_or_default();
        }
        bmp
    }

    /// Loads the bitmap from consecutive sectors starting at `first`.
    pub fn fetch_from<D: SectorStorage>(
        disk: &mut D,
        first: SectorNumber,
        num_sectors: usize,
    ) -> std::io::Result<Self> {
        let needed = Self::new(num_sectors).sectors_on_disk();
        let mut buf = vec![0; needed * SECTOR_SIZE];
        for (i, chunk) in buf.chunks_mut(SECTOR_SIZE).enumerate() {
            disk.read_sector(first + i as SectorNumber, chunk)?;
        }
        Ok(Self::parse(&buf, num_sectors))
    }

    /// Persists the bitmap to consecutive sectors starting at `first`.
    pub fn write_back<D: SectorStorage>(
        &self,
        disk: &mut D,
        first: SectorNumber,
    ) -> std::io::Result<()> {
        for (i, chunk) in self.serialize().chunks(SECTOR_SIZE).enumerate() {
            disk.write_sector(first + i as SectorNumber, chunk)?;
        }
        Ok(())
    }
}

impl PartialEq for SectorBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.num_sectors == other.num_sectors && self.bits == other.bits
    }
}

impl SectorPool for SectorBitmap {
    fn find_and_set(&mut self) -> Option<SectorNumber> {
        let n = self.num_sectors;
        for i in (self.marker..n).chain(0..self.marker) {
            if let State::Free = self.get(i as SectorNumber) {
                self.mark(i as SectorNumber);
                self.marker = (i + 1) % n;
                return Some(i as SectorNumber);
            }
        }
        None
    }

    fn clear(&mut self, sector: SectorNumber) {
        assert!(
            self.test(sector),
            "pool consistency violation: sector {} is already free",
            sector
        );
        let sector = sector as usize;
        self.bits[sector / 64] &= !(0b01_u64 << (sector % 64));
    }

    fn test(&self, sector: SectorNumber) -> bool {
        self.get(sector) == State::Used
    }

    fn num_clear(&self) -> usize {
        let used: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        self.num_sectors - used
    }
}
