//! Block device abstraction for naivefs plus a file-backed emulator for
//! development and testing. The engine only ever talks to storage through the
//! [`BlockStorage`] trait; anything that can read and write fixed 512-byte
//! blocks by index can host a volume.

mod emulator;

pub use crate::emulator::{FileBlockEmulator, FileBlockEmulatorBuilder};

use std::path::Path;

/// Fixed size of a device block in bytes. The engine's unit of I/O.
pub const BLOCK_SIZE: usize = 512;

/// The block number to access ranging from 0 (the first block) to n - 1 (the
/// last block) where n is the number of blocks available.
pub type BlockNumber = usize;

/// Interface to an addressable array of fixed-size storage blocks.
///
/// All calls are synchronous and run to completion. A failed read or write
/// surfaces as `std::io::Error` and is never retried here; policy belongs to
/// the caller.
pub trait BlockStorage {
    /// Opens an existing volume image at the specified path. This does not
    /// validate the storage blocks, it is up to clients to ensure disks are
    /// appropriately initialized.
    fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;

    /// Reads disk block number into the provided buffer. The buffer must be
    /// exactly [`BLOCK_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range returns an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes the provided [`BLOCK_SIZE`]-byte buffer into the specified block
    /// number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range returns an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Flushes any buffered disk IO to the medium. Useful when it must be
    /// guaranteed that writes actually occurred, for instance before the
    /// volume is re-read from disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
