//! Byte-range file I/O across an inode's direct block pointers.

use crate::alloc::BitmapAllocator;
use crate::error::{FsError, Result};
use crate::node::Inode;
use crate::{BlockStorage, BLOCK_SIZE, DIRECT_BLOCKS, MAX_FILE_SIZE};

use log::trace;

/// Reads up to `buf.len()` bytes starting at `offset` into `buf`, clamped to
/// the file's size. Returns the byte count actually copied; coming up short
/// only happens at EOF and is not an error.
pub fn read_range<T: BlockStorage>(
    dev: &mut T,
    inode: &Inode,
    offset: usize,
    buf: &mut [u8],
) -> Result<usize> {
    let size = inode.size as usize;
    if offset >= size {
        return Ok(0);
    }
    let mut remaining = buf.len().min(size - offset);
    let mut pos = offset;
    let mut copied = 0;
    let mut block_buf = [0u8; BLOCK_SIZE];

    while remaining > 0 {
        let index = pos / BLOCK_SIZE;
        // A pointer slot past the allocated count truncates the read.
        if index >= inode.block_count as usize {
            break;
        }
        dev.read_block(inode.block[index] as usize, &mut block_buf)?;

        let start = pos % BLOCK_SIZE;
        let take = remaining.min(BLOCK_SIZE - start);
        buf[copied..copied + take].copy_from_slice(&block_buf[start..start + take]);

        copied += take;
        pos += take;
        remaining -= take;
    }

    Ok(copied)
}

/// Writes `data` at `offset`, allocating the exact number of extra blocks the
/// range needs. Each spanned block is read-modify-written so bytes outside
/// the range survive. On success the inode's size and mtime/ctime are
/// updated in memory; the caller persists the record.
///
/// A range past the direct-pointer capacity fails up front with
/// `FileTooLarge`. If allocation fails partway, every block claimed by this
/// call is released again before the error returns, so nothing leaks.
pub fn write_range<T: BlockStorage>(
    dev: &mut T,
    balloc: &mut BitmapAllocator,
    inode: &mut Inode,
    offset: usize,
    data: &[u8],
) -> Result<usize> {
    let end = offset + data.len();
    if end > MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge);
    }
    if data.is_empty() {
        return Ok(0);
    }

    let blocks_needed = (end + BLOCK_SIZE - 1) / BLOCK_SIZE;
    if blocks_needed > inode.block_count as usize {
        grow(dev, balloc, inode, blocks_needed - inode.block_count as usize)?;
    }

    let mut remaining = data.len();
    let mut pos = offset;
    let mut written = 0;
    let mut block_buf = [0u8; BLOCK_SIZE];

    while remaining > 0 {
        let index = pos / BLOCK_SIZE;
        let block = inode.block[index] as usize;

        dev.read_block(block, &mut block_buf)?;
        let start = pos % BLOCK_SIZE;
        let take = remaining.min(BLOCK_SIZE - start);
        block_buf[start..start + take].copy_from_slice(&data[written..written + take]);
        dev.write_block(block, &block_buf)?;

        written += take;
        pos += take;
        remaining -= take;
    }

    if end as u32 > inode.size {
        inode.size = end as u32;
    }
    inode.touch();

    Ok(written)
}

fn grow<T: BlockStorage>(
    dev: &mut T,
    balloc: &mut BitmapAllocator,
    inode: &mut Inode,
    count: usize,
) -> Result<()> {
    debug_assert!(inode.block_count as usize + count <= DIRECT_BLOCKS);
    let mut fresh = Vec::with_capacity(count);
    for _ in 0..count {
        match balloc.allocate(dev) {
            Ok(block) => fresh.push(block),
            Err(err) => {
                // Release this call's blocks so a failed grow leaks nothing.
                for block in fresh {
                    let _ = balloc.free(dev, block);
                }
                return Err(err);
            }
        }
    }

    let zero = [0u8; BLOCK_SIZE];
    for block in fresh {
        dev.write_block(block as usize, &zero)?;
        inode.block[inode.block_count as usize] = block;
        inode.block_count += 1;
    }
    trace!("file grew to {} blocks", inode.block_count);
    Ok(())
}
