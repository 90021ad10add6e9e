use crate::error::{FsError, Result};
use crate::sb::SuperBlock;
use crate::{BlockStorage, BLOCK_SIZE, DIRECT_BLOCKS, INODES_PER_BLOCK, INODE_RECORD_SIZE};

use std::time::{SystemTime, UNIX_EPOCH};

use zerocopy::{AsBytes, FromBytes};

/// File type bits within `Inode::mode`, mirroring the usual mode layout.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

/// One on-disk inode record. Fixed at 128 bytes so four records pack into
/// every table block; all fields are little-endian u32 on disk.
///
/// `size` is the file's byte length for regular files and the byte length of
/// the entry region for directories; the meaning follows the type bits in
/// `mode`, never a runtime union. Unused `block` slots hold zero, which is
/// never a valid data block index.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Clone, Copy, PartialEq)]
pub struct Inode {
    /// Type and permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Byte length; never exceeds `DIRECT_BLOCKS * BLOCK_SIZE`.
    pub size: u32,
    /// How many of the direct pointers are in use.
    pub block_count: u32,
    pub nlink: u32,
    /// Seconds since the epoch.
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    /// Direct data block pointers; no indirection levels are supported.
    pub block: [u32; DIRECT_BLOCKS],
    padding: [u32; 15],
}

pub(crate) fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl Inode {
    /// An all-zero record: mode 0, size 0, no blocks, no links. Callers
    /// populate it and write it back.
    pub fn zeroed() -> Self {
        Inode {
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            block_count: 0,
            nlink: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            block: [0; DIRECT_BLOCKS],
            padding: [0; 15],
        }
    }

    /// A fresh regular file record with one link and current timestamps.
    pub fn new_file(mode: u32, uid: u32, gid: u32) -> Self {
        let now = unix_now();
        Inode {
            mode: S_IFREG | (mode & 0o7777),
            uid,
            gid,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
            ..Inode::zeroed()
        }
    }

    /// A fresh directory record. Two links for the name and `.`; the entry
    /// block itself is seeded by the directory layer.
    pub fn new_dir(mode: u32, uid: u32, gid: u32) -> Self {
        let now = unix_now();
        Inode {
            mode: S_IFDIR | (mode & 0o7777),
            uid,
            gid,
            nlink: 2,
            atime: now,
            mtime: now,
            ctime: now,
            ..Inode::zeroed()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Stamps modify and change times with the current clock.
    pub(crate) fn touch(&mut self) {
        let now = unix_now();
        self.mtime = now;
        self.ctime = now;
    }
}

/// Maps 1-based inode numbers to record offsets in the contiguous on-disk
/// table and reads or writes one record at a time. The table packs multiple
/// records per block, so every write is a read-modify-write of the containing
/// block to avoid clobbering sibling records.
pub struct InodeTable {
    start_block: u32,
    count: u32,
}

impl InodeTable {
    pub fn new(sb: &SuperBlock) -> Self {
        InodeTable {
            start_block: sb.inode_table_start,
            count: sb.inode_total,
        }
    }

    fn locate(&self, ino: u32) -> Result<(usize, usize)> {
        if ino < 1 || ino > self.count {
            return Err(FsError::InvalidInode(ino));
        }
        let slot = (ino - 1) as usize;
        let block = self.start_block as usize + slot / INODES_PER_BLOCK;
        let offset = (slot % INODES_PER_BLOCK) * INODE_RECORD_SIZE;
        Ok((block, offset))
    }

    /// Fetches the record for inode `ino` from the table.
    pub fn read_inode<T: BlockStorage>(&self, dev: &mut T, ino: u32) -> Result<Inode> {
        let (block, offset) = self.locate(ino)?;
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(block, &mut buf)?;
        // The record layout is plain little-endian u32s, safe to reinterpret
        // at any alignment.
        let inode =
            unsafe { std::ptr::read_unaligned(buf.as_ptr().add(offset) as *const Inode) };
        Ok(inode)
    }

    /// Writes the record for inode `ino` back into its table block.
    pub fn write_inode<T: BlockStorage>(&self, dev: &mut T, ino: u32, inode: &Inode) -> Result<()> {
        let (block, offset) = self.locate(ino)?;
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(block, &mut buf)?;
        buf[offset..offset + INODE_RECORD_SIZE].copy_from_slice(inode.as_bytes());
        dev.write_block(block, &buf)?;
        Ok(())
    }
}
