//! naivefs is a minimal block-based filesystem storage engine: bitmap block
//! and inode allocation, fixed-size inode records with direct block pointers,
//! linear directory entry tables, and byte-range file I/O. It sits beneath any
//! host integration (kernel VFS, FUSE, or a userspace library); callers hold
//! inode numbers and record copies, never shared objects.
//!
//! On-disk layout (512-byte blocks):
//!
//! | Block      | Content                                       |
//! |------------|-----------------------------------------------|
//! | 0          | boot block, unused, zero-filled               |
//! | 1          | superblock                                    |
//! | 2          | block bitmap                                  |
//! | 3          | inode bitmap                                  |
//! | 4 .. 4+T-1 | inode table, T = ceil(inode_total * 128 / 512)|
//! | 4+T ..     | data blocks                                   |
//!
//! All multi-byte on-disk integers are little-endian u32.

mod alloc;
mod data;
mod dir;
mod error;
mod fs;
mod node;
mod sb;

pub use crate::alloc::BitmapAllocator;
pub use crate::dir::DirRecord;
pub use crate::error::{FsError, Result};
pub use crate::fs::{FsStat, NaiveFs};
pub use crate::node::{Inode, InodeTable, S_IFDIR, S_IFMT, S_IFREG};
pub use crate::sb::SuperBlock;

pub use fileblock::{BlockStorage, BLOCK_SIZE};

/// Identifies a naivefs volume; any other value in the superblock rejects the
/// mount.
pub const NAIVE_MAGIC: u32 = 0x0099_0717;

/// Inode number of the root directory. Inode numbering is 1-based; 0 is never
/// a valid inode and marks a free directory slot.
pub const ROOT_INO: u32 = 1;

pub(crate) const BOOT_BLOCK: usize = 0;
pub(crate) const SUPERBLOCK_BLOCK: usize = 1;
pub(crate) const BLOCK_BITMAP_BLOCK: usize = 2;
pub(crate) const INODE_BITMAP_BLOCK: usize = 3;
pub(crate) const INODE_TABLE_START: u32 = 4;

/// Number of direct block pointers per inode. There is no indirection, so
/// this also caps file size.
pub const DIRECT_BLOCKS: usize = 8;

/// Largest byte length a single file can reach.
pub const MAX_FILE_SIZE: usize = DIRECT_BLOCKS * BLOCK_SIZE;

/// Size of one on-disk inode record. Four records pack into each table block.
pub const INODE_RECORD_SIZE: usize = 128;
pub(crate) const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_RECORD_SIZE;

/// Width of the fixed name field in a directory record. Longer names are
/// truncated on insert.
pub const DIR_NAME_LEN: usize = 28;
/// Size of one directory record: a u32 inode number plus the name field.
pub const DIR_RECORD_SIZE: usize = 4 + DIR_NAME_LEN;
pub(crate) const DIR_RECORDS_PER_BLOCK: usize = BLOCK_SIZE / DIR_RECORD_SIZE;
