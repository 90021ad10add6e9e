use crate::error::{FsError, Result};
use crate::{BlockStorage, BLOCK_SIZE};

use log::trace;

/// Owns one on-disk allocation bitmap (block or inode), cached in memory and
/// flushed back to its fixed block on every mutation. One bit per tracked
/// item; bit set means allocated. The raw bit buffer is never exposed.
///
/// Allocation policy is lowest-free-index: scan ascending from
/// `reserved_start` for the first clear bit. Deterministic and simple to
/// verify; fancier policies (contiguous runs, wear spreading) are a non-goal.
pub struct BitmapAllocator {
    bits: [u8; BLOCK_SIZE],
    /// Number of valid bits; indices at or beyond this are out of range.
    capacity: u32,
    /// First index eligible for allocation. Skips the metadata region when
    /// allocating data blocks; zero for the inode bitmap.
    reserved_start: u32,
    /// The device block this bitmap lives in.
    disk_block: usize,
}

impl BitmapAllocator {
    /// A fresh all-free bitmap, not yet backed by a device read.
    pub fn new(disk_block: usize, capacity: u32, reserved_start: u32) -> Self {
        debug_assert!(capacity as usize <= BLOCK_SIZE * 8);
        BitmapAllocator {
            bits: [0u8; BLOCK_SIZE],
            capacity,
            reserved_start,
            disk_block,
        }
    }

    /// Loads the bitmap block from the device, done once at mount.
    pub fn load<T: BlockStorage>(
        dev: &mut T,
        disk_block: usize,
        capacity: u32,
        reserved_start: u32,
    ) -> Result<Self> {
        let mut map = BitmapAllocator::new(disk_block, capacity, reserved_start);
        dev.read_block(disk_block, &mut map.bits)?;
        Ok(map)
    }

    /// Writes the cached bitmap back to its block. Idempotent.
    pub fn flush<T: BlockStorage>(&self, dev: &mut T) -> Result<()> {
        dev.write_block(self.disk_block, &self.bits)?;
        Ok(())
    }

    /// Claims the lowest free index at or above `reserved_start`, sets its
    /// bit, and flushes the bitmap block before returning it.
    pub fn allocate<T: BlockStorage>(&mut self, dev: &mut T) -> Result<u32> {
        for index in self.reserved_start..self.capacity {
            if !self.bit(index) {
                self.set_bit(index);
                self.flush(dev)?;
                trace!("bitmap block {}: allocated index {}", self.disk_block, index);
                return Ok(index);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Clears the bit for `index` and flushes. Freeing an already-free index
    /// is a no-op; an out-of-range index is an error and leaves the buffer
    /// untouched.
    pub fn free<T: BlockStorage>(&mut self, dev: &mut T, index: u32) -> Result<()> {
        if index >= self.capacity {
            return Err(FsError::InvalidBlock(index));
        }
        if !self.bit(index) {
            return Ok(());
        }
        self.clear_bit(index);
        self.flush(dev)?;
        trace!("bitmap block {}: freed index {}", self.disk_block, index);
        Ok(())
    }

    /// Sets a bit without flushing. Used at format time to pre-mark the
    /// metadata region and the root inode; those bits are never cleared.
    pub(crate) fn mark(&mut self, index: u32) {
        debug_assert!(index < self.capacity);
        self.set_bit(index);
    }

    /// Whether `index` is currently allocated.
    pub fn is_allocated(&self, index: u32) -> bool {
        index < self.capacity && self.bit(index)
    }

    /// Number of free indices, by population count over the valid range.
    pub fn free_count(&self) -> u32 {
        (0..self.capacity).filter(|&i| !self.bit(i)).count() as u32
    }

    fn bit(&self, index: u32) -> bool {
        self.bits[index as usize / 8] & (1 << (index % 8)) != 0
    }

    fn set_bit(&mut self, index: u32) {
        self.bits[index as usize / 8] |= 1 << (index % 8);
    }

    fn clear_bit(&mut self, index: u32) {
        self.bits[index as usize / 8] &= !(1 << (index % 8));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileblock::{FileBlockEmulator, FileBlockEmulatorBuilder};

    fn test_device() -> FileBlockEmulator {
        let fd = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(fd)
            .with_block_count(8)
            .build()
            .expect("could not initialize disk emulator")
    }

    #[test]
    fn allocate_returns_ascending_distinct_indices() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 64, 0);

        let a = map.allocate(&mut dev).unwrap();
        let b = map.allocate(&mut dev).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert!(map.is_allocated(a));
        assert!(map.is_allocated(b));
    }

    #[test]
    fn allocate_never_returns_a_reserved_index() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 64, 5);

        for _ in 0..8 {
            assert!(map.allocate(&mut dev).unwrap() >= 5);
        }
    }

    #[test]
    fn free_restores_pre_allocation_state() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 64, 0);

        let before = map.free_count();
        let index = map.allocate(&mut dev).unwrap();
        assert_eq!(map.free_count(), before - 1);
        map.free(&mut dev, index).unwrap();
        assert_eq!(map.free_count(), before);
        // Freeing again is a no-op.
        map.free(&mut dev, index).unwrap();
        assert_eq!(map.free_count(), before);
    }

    #[test]
    fn free_out_of_range_is_an_error() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 64, 0);

        match map.free(&mut dev, 64) {
            Err(FsError::InvalidBlock(64)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(map.free_count(), 64);
    }

    #[test]
    fn exhausted_bitmap_reports_no_space() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 4, 0);

        for _ in 0..4 {
            map.allocate(&mut dev).unwrap();
        }
        match map.allocate(&mut dev) {
            Err(FsError::NoSpace) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn mutations_are_written_through_to_the_device() {
        let mut dev = test_device();
        let mut map = BitmapAllocator::new(2, 64, 0);
        map.mark(0);
        map.flush(&mut dev).unwrap();
        map.allocate(&mut dev).unwrap();

        let reloaded = BitmapAllocator::load(&mut dev, 2, 64, 0).unwrap();
        assert!(reloaded.is_allocated(0));
        assert!(reloaded.is_allocated(1));
        assert!(!reloaded.is_allocated(2));
    }
}
