use crate::error::{FsError, Result};
use crate::{
    BlockStorage, BLOCK_SIZE, INODE_RECORD_SIZE, INODE_TABLE_START, NAIVE_MAGIC, SUPERBLOCK_BLOCK,
};

use std::convert::TryInto;

/// The volume-wide metadata record at block 1, describing geometry and
/// identifying the filesystem via its magic number. Read once at mount and
/// cached; immutable after format.
///
/// The on-disk encoding is five little-endian u32 fields padded with zeros to
/// a full block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperBlock {
    pub magic: u32,
    /// Total number of 512-byte blocks in the volume, metadata included.
    pub block_total: u32,
    /// Total number of inode records the table holds.
    pub inode_total: u32,
    /// Index of the first inode table block.
    pub inode_table_start: u32,
    /// Index of the first data block; everything below it is metadata.
    pub data_start: u32,
}

impl SuperBlock {
    /// Computes the layout for a fresh volume of `block_total` blocks holding
    /// `inode_total` inodes.
    pub fn new(block_total: u32, inode_total: u32) -> Self {
        let table_bytes = inode_total as usize * INODE_RECORD_SIZE;
        let table_blocks = ((table_bytes + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32;
        SuperBlock {
            magic: NAIVE_MAGIC,
            block_total,
            inode_total,
            inode_table_start: INODE_TABLE_START,
            data_start: INODE_TABLE_START + table_blocks,
        }
    }

    /// Number of blocks the inode table occupies.
    pub fn inode_table_blocks(&self) -> u32 {
        self.data_start - self.inode_table_start
    }

    /// Checks the geometry against the fixed layout limits. Each bitmap
    /// occupies a single block, so neither total may exceed its bit capacity,
    /// and `data_start` must agree with the inode table size and leave at
    /// least one data block. Anything else is rejected before the volume is
    /// touched.
    pub fn validate(&self) -> Result<()> {
        let bitmap_bits = (BLOCK_SIZE * 8) as u32;
        let table_bytes = self.inode_total as usize * INODE_RECORD_SIZE;
        let table_blocks = ((table_bytes + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32;
        if self.block_total > bitmap_bits
            || self.inode_total > bitmap_bits
            || self.inode_total == 0
            || self.inode_table_start != INODE_TABLE_START
            || self.data_start != self.inode_table_start + table_blocks
            || self.data_start >= self.block_total
        {
            return Err(FsError::CorruptSuperblock);
        }
        Ok(())
    }

    /// Decodes a superblock from one raw block, rejecting any volume whose
    /// magic does not match or whose geometry fails [`SuperBlock::validate`].
    pub fn parse(buf: &[u8]) -> Result<Self> {
        assert_eq!(buf.len(), BLOCK_SIZE);
        let field = |i: usize| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());

        let magic = field(0);
        if magic != NAIVE_MAGIC {
            return Err(FsError::InvalidMagic(magic));
        }
        let sb = SuperBlock {
            magic,
            block_total: field(1),
            inode_total: field(2),
            inode_table_start: field(3),
            data_start: field(4),
        };
        sb.validate()?;
        Ok(sb)
    }

    /// Encodes the superblock into a full block for writing to disk.
    pub fn serialize(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        for (i, v) in [
            self.magic,
            self.block_total,
            self.inode_total,
            self.inode_table_start,
            self.data_start,
        ]
        .iter()
        .enumerate()
        {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Reads and validates the superblock from a device. A failed read or a
    /// magic mismatch aborts the mount; there is no retry.
    pub fn load<T: BlockStorage>(dev: &mut T) -> Result<Self> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLOCK, &mut buf)?;
        SuperBlock::parse(&buf)
    }

    /// Writes the superblock back to its fixed block.
    pub fn persist<T: BlockStorage>(&self, dev: &mut T) -> Result<()> {
        dev.write_block(SUPERBLOCK_BLOCK, &self.serialize())?;
        Ok(())
    }
}
