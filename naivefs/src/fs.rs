use crate::alloc::BitmapAllocator;
use crate::dir;
use crate::dir::DirRecord;
use crate::error::{FsError, Result};
use crate::node::{Inode, InodeTable};
use crate::sb::SuperBlock;
use crate::{
    data, BlockStorage, BLOCK_BITMAP_BLOCK, BLOCK_SIZE, BOOT_BLOCK, DIR_NAME_LEN,
    INODE_BITMAP_BLOCK, ROOT_INO,
};

use log::debug;

/// Volume totals and free counts, the `statfs` answer. Free counts come from
/// bitmap population counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsStat {
    pub block_total: u32,
    pub block_free: u32,
    pub inode_total: u32,
    pub inode_free: u32,
    pub block_size: u32,
    pub name_len: u32,
}

/// A mounted naivefs volume over any block storage. All operations are
/// synchronous and run to completion; exclusive (`&mut`) access serializes
/// every bitmap, directory, and inode mutation, so no further locking exists
/// inside the engine.
///
/// Callers address files by inode number and receive record copies; the
/// engine owns no cross-call object graph.
pub struct NaiveFs<T: BlockStorage> {
    dev: T,
    sb: SuperBlock,
    table: InodeTable,
    block_alloc: BitmapAllocator,
    inode_alloc: BitmapAllocator,
}

impl<T: BlockStorage> NaiveFs<T> {
    /// Performs the one-time layout of a fresh volume: boot block and inode
    /// table zeroed, superblock written, bitmaps seeded with the metadata
    /// region pre-set, and the root directory created with its `.` and `..`
    /// entries.
    pub fn format(mut dev: T, block_total: u32, inode_total: u32) -> Result<Self> {
        let sb = SuperBlock::new(block_total, inode_total);
        sb.validate()?;
        debug!(
            "formatting volume: {} blocks, {} inodes, data starts at block {}",
            block_total, inode_total, sb.data_start
        );

        let zero = [0u8; BLOCK_SIZE];
        dev.write_block(BOOT_BLOCK, &zero)?;
        sb.persist(&mut dev)?;
        for block in sb.inode_table_start..sb.data_start {
            dev.write_block(block as usize, &zero)?;
        }

        // Bits for the boot block, superblock, bitmaps, and inode table are
        // pre-set and never cleared.
        let mut block_alloc = BitmapAllocator::new(BLOCK_BITMAP_BLOCK, block_total, sb.data_start);
        for block in 0..sb.data_start {
            block_alloc.mark(block);
        }
        block_alloc.flush(&mut dev)?;

        // Inode 1 is the root directory, pre-marked allocated.
        let mut inode_alloc = BitmapAllocator::new(INODE_BITMAP_BLOCK, inode_total, 0);
        inode_alloc.mark(ROOT_INO - 1);
        inode_alloc.flush(&mut dev)?;

        let table = InodeTable::new(&sb);
        let mut root = Inode::new_dir(0o755, 0, 0);
        dir::add_entry(&mut dev, &mut block_alloc, &mut root, ".", ROOT_INO)?;
        dir::add_entry(&mut dev, &mut block_alloc, &mut root, "..", ROOT_INO)?;
        table.write_inode(&mut dev, ROOT_INO, &root)?;
        dev.sync_disk()?;

        Ok(NaiveFs {
            dev,
            sb,
            table,
            block_alloc,
            inode_alloc,
        })
    }

    /// Mounts a formatted volume: reads and validates the superblock, then
    /// caches both bitmaps. Any failure aborts the mount with nothing
    /// applied.
    pub fn mount(mut dev: T) -> Result<Self> {
        let sb = SuperBlock::load(&mut dev)?;
        let block_alloc =
            BitmapAllocator::load(&mut dev, BLOCK_BITMAP_BLOCK, sb.block_total, sb.data_start)?;
        let inode_alloc = BitmapAllocator::load(&mut dev, INODE_BITMAP_BLOCK, sb.inode_total, 0)?;
        let table = InodeTable::new(&sb);
        debug!(
            "mounted volume: {} blocks, {} inodes",
            sb.block_total, sb.inode_total
        );
        Ok(NaiveFs {
            dev,
            sb,
            table,
            block_alloc,
            inode_alloc,
        })
    }

    /// Flushes all cached metadata, syncs the device, and releases the
    /// in-memory state, handing the device back. The flushes are idempotent;
    /// every mutation already wrote through.
    pub fn unmount(mut self) -> Result<T> {
        self.block_alloc.flush(&mut self.dev)?;
        self.inode_alloc.flush(&mut self.dev)?;
        self.sb.persist(&mut self.dev)?;
        self.dev.sync_disk()?;
        Ok(self.dev)
    }

    /// Resolves `name` inside directory `dir_ino` to an inode number.
    pub fn lookup(&mut self, dir_ino: u32, name: &str) -> Result<u32> {
        let parent = self.read_dir_inode(dir_ino)?;
        dir::find_entry(&mut self.dev, &parent, name)
    }

    /// Creates a regular file. Duplicate names are rejected here, not by the
    /// directory layer.
    pub fn create(&mut self, dir_ino: u32, name: &str, mode: u32) -> Result<u32> {
        debug!("create {:?} in directory inode {}", name, dir_ino);
        let mut parent = self.prepare_new_entry(dir_ino, name)?;

        let ino = self.allocate_ino()?;
        let inode = Inode::new_file(mode, 0, 0);
        self.table.write_inode(&mut self.dev, ino, &inode)?;

        if let Err(err) = dir::add_entry(&mut self.dev, &mut self.block_alloc, &mut parent, name, ino)
        {
            let _ = self.inode_alloc.free(&mut self.dev, ino - 1);
            return Err(err);
        }
        self.table.write_inode(&mut self.dev, dir_ino, &parent)?;
        Ok(ino)
    }

    /// Creates a directory seeded with `.` and `..`, bumping the parent's
    /// link count for the new `..` reference.
    pub fn mkdir(&mut self, dir_ino: u32, name: &str, mode: u32) -> Result<u32> {
        debug!("mkdir {:?} in directory inode {}", name, dir_ino);
        let mut parent = self.prepare_new_entry(dir_ino, name)?;

        let ino = self.allocate_ino()?;
        let mut child = Inode::new_dir(mode, 0, 0);

        let seeded = (|| -> Result<()> {
            dir::add_entry(&mut self.dev, &mut self.block_alloc, &mut child, ".", ino)?;
            dir::add_entry(&mut self.dev, &mut self.block_alloc, &mut child, "..", dir_ino)?;
            dir::add_entry(&mut self.dev, &mut self.block_alloc, &mut parent, name, ino)?;
            Ok(())
        })();
        if let Err(err) = seeded {
            self.release_blocks(&child);
            let _ = self.inode_alloc.free(&mut self.dev, ino - 1);
            return Err(err);
        }

        parent.nlink += 1;
        self.table.write_inode(&mut self.dev, ino, &child)?;
        self.table.write_inode(&mut self.dev, dir_ino, &parent)?;
        Ok(ino)
    }

    /// Removes a file entry and releases its data blocks and inode.
    pub fn unlink(&mut self, dir_ino: u32, name: &str) -> Result<()> {
        debug!("unlink {:?} in directory inode {}", name, dir_ino);
        let parent = self.read_dir_inode(dir_ino)?;
        let ino = dir::find_entry(&mut self.dev, &parent, name)?;
        let inode = self.table.read_inode(&mut self.dev, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }

        dir::remove_entry(&mut self.dev, &parent, name)?;
        self.release_blocks(&inode);
        self.inode_alloc.free(&mut self.dev, ino - 1)?;
        self.table.write_inode(&mut self.dev, ino, &Inode::zeroed())?;
        Ok(())
    }

    /// Removes an empty directory; anything beyond `.` and `..` fails with
    /// `DirectoryNotEmpty`.
    pub fn rmdir(&mut self, dir_ino: u32, name: &str) -> Result<()> {
        debug!("rmdir {:?} in directory inode {}", name, dir_ino);
        if name == "." || name == ".." {
            return Err(FsError::InvalidName);
        }
        let mut parent = self.read_dir_inode(dir_ino)?;
        let ino = dir::find_entry(&mut self.dev, &parent, name)?;
        let inode = self.table.read_inode(&mut self.dev, ino)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !dir::is_empty(&mut self.dev, &inode)? {
            return Err(FsError::DirectoryNotEmpty);
        }

        dir::remove_entry(&mut self.dev, &parent, name)?;
        self.release_blocks(&inode);
        self.inode_alloc.free(&mut self.dev, ino - 1)?;
        self.table.write_inode(&mut self.dev, ino, &Inode::zeroed())?;

        parent.nlink = parent.nlink.saturating_sub(1);
        self.table.write_inode(&mut self.dev, dir_ino, &parent)?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes from a file at `offset`; a short count
    /// means EOF.
    pub fn read(&mut self, ino: u32, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let inode = self.table.read_inode(&mut self.dev, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        data::read_range(&mut self.dev, &inode, offset, buf)
    }

    /// Writes `data` to a file at `offset`, growing it block by block, and
    /// persists the updated inode record.
    pub fn write(&mut self, ino: u32, offset: usize, bytes: &[u8]) -> Result<usize> {
        let mut inode = self.table.read_inode(&mut self.dev, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let written = data::write_range(
            &mut self.dev,
            &mut self.block_alloc,
            &mut inode,
            offset,
            bytes,
        )?;
        self.table.write_inode(&mut self.dev, ino, &inode)?;
        Ok(written)
    }

    /// A copy of the on-disk record for `ino`.
    pub fn stat_inode(&mut self, ino: u32) -> Result<Inode> {
        self.table.read_inode(&mut self.dev, ino)
    }

    /// All occupied entries of a directory in deterministic scan order.
    pub fn read_dir(&mut self, dir_ino: u32) -> Result<Vec<DirRecord>> {
        let inode = self.read_dir_inode(dir_ino)?;
        dir::list_entries(&mut self.dev, &inode)
    }

    /// Volume totals and free counts.
    pub fn statfs(&self) -> FsStat {
        FsStat {
            block_total: self.sb.block_total,
            block_free: self.block_alloc.free_count(),
            inode_total: self.sb.inode_total,
            inode_free: self.inode_alloc.free_count(),
            block_size: BLOCK_SIZE as u32,
            name_len: DIR_NAME_LEN as u32,
        }
    }

    pub fn root_ino(&self) -> u32 {
        ROOT_INO
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    fn read_dir_inode(&mut self, ino: u32) -> Result<Inode> {
        let inode = self.table.read_inode(&mut self.dev, ino)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(inode)
    }

    /// Shared preamble of `create` and `mkdir`: the parent must be a
    /// directory and must not already hold `name`.
    fn prepare_new_entry(&mut self, dir_ino: u32, name: &str) -> Result<Inode> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::InvalidName);
        }
        let parent = self.read_dir_inode(dir_ino)?;
        match dir::find_entry(&mut self.dev, &parent, name) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => Ok(parent),
            Err(err) => Err(err),
        }
    }

    /// Bitmap indices are 0-based, inode numbers 1-based. An exhausted inode
    /// bitmap surfaces as `NoInodes`, distinct from running out of blocks.
    fn allocate_ino(&mut self) -> Result<u32> {
        match self.inode_alloc.allocate(&mut self.dev) {
            Ok(index) => Ok(index + 1),
            Err(FsError::NoSpace) => Err(FsError::NoInodes),
            Err(err) => Err(err),
        }
    }

    fn release_blocks(&mut self, inode: &Inode) {
        for i in 0..inode.block_count as usize {
            if inode.block[i] != 0 {
                let _ = self.block_alloc.free(&mut self.dev, inode.block[i]);
            }
        }
    }
}
