//! Directory entry tables. A directory inode's data blocks hold an array of
//! fixed-size (inode number, name) records; inode number 0 marks a free slot.
//! All scans run in increasing block-pointer-slot order, then increasing
//! in-block record order, which fixes the listing order for a given on-disk
//! state.

use crate::alloc::BitmapAllocator;
use crate::error::{FsError, Result};
use crate::node::Inode;
use crate::{BlockStorage, BLOCK_SIZE, DIRECT_BLOCKS, DIR_NAME_LEN, DIR_RECORDS_PER_BLOCK, DIR_RECORD_SIZE};

use log::trace;

use zerocopy::{AsBytes, FromBytes};

/// One fixed-size directory record: a u32 inode number and a fixed-width name
/// field. Names longer than the field are truncated on insert.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Clone, Copy)]
pub struct DirRecord {
    pub ino: u32,
    pub name: [u8; DIR_NAME_LEN],
}

impl DirRecord {
    pub fn new(ino: u32, name: &str) -> Self {
        let mut field = [0u8; DIR_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIR_NAME_LEN);
        field[..len].copy_from_slice(&bytes[..len]);
        DirRecord { ino, name: field }
    }

    fn free() -> Self {
        DirRecord {
            ino: 0,
            name: [0u8; DIR_NAME_LEN],
        }
    }

    pub fn is_free(&self) -> bool {
        self.ino == 0
    }

    /// Match against the stored name. The query is clamped to the field width
    /// first, so a name truncated on insert is still found by its full form.
    pub fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIR_NAME_LEN);
        self.name_bytes() == &bytes[..len]
    }

    fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DIR_NAME_LEN);
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}

fn record_at(buf: &[u8], slot: usize) -> DirRecord {
    let offset = slot * DIR_RECORD_SIZE;
    unsafe { std::ptr::read_unaligned(buf.as_ptr().add(offset) as *const DirRecord) }
}

fn put_record(buf: &mut [u8], slot: usize, record: &DirRecord) {
    let offset = slot * DIR_RECORD_SIZE;
    buf[offset..offset + DIR_RECORD_SIZE].copy_from_slice(record.as_bytes());
}

/// Writes `(ino, name)` into the first free slot of the directory's occupied
/// blocks. If every slot is taken, allocates and zero-initializes one new
/// block, appends it to the pointer array, and grows the directory's logical
/// size by a block; a full pointer array fails with `FileTooLarge`. The
/// caller persists the mutated directory inode afterward.
pub fn add_entry<T: BlockStorage>(
    dev: &mut T,
    balloc: &mut BitmapAllocator,
    dir: &mut Inode,
    name: &str,
    ino: u32,
) -> Result<()> {
    let record = DirRecord::new(ino, name);
    let mut buf = [0u8; BLOCK_SIZE];

    for i in 0..dir.block_count as usize {
        dev.read_block(dir.block[i] as usize, &mut buf)?;
        for slot in 0..DIR_RECORDS_PER_BLOCK {
            if record_at(&buf, slot).is_free() {
                put_record(&mut buf, slot, &record);
                dev.write_block(dir.block[i] as usize, &buf)?;
                return Ok(());
            }
        }
    }

    // No free slot anywhere; the directory needs another block.
    if dir.block_count as usize >= DIRECT_BLOCKS {
        return Err(FsError::FileTooLarge);
    }
    let new_block = balloc.allocate(dev)?;
    trace!("directory grows into block {}", new_block);
    buf = [0u8; BLOCK_SIZE];
    put_record(&mut buf, 0, &record);
    dev.write_block(new_block as usize, &buf)?;

    dir.block[dir.block_count as usize] = new_block;
    dir.block_count += 1;
    dir.size += BLOCK_SIZE as u32;
    Ok(())
}

/// Linear scan for the first occupied record whose name matches exactly.
/// First match wins; insertion does not police duplicates.
pub fn find_entry<T: BlockStorage>(dev: &mut T, dir: &Inode, name: &str) -> Result<u32> {
    let mut buf = [0u8; BLOCK_SIZE];
    for i in 0..dir.block_count as usize {
        dev.read_block(dir.block[i] as usize, &mut buf)?;
        for slot in 0..DIR_RECORDS_PER_BLOCK {
            let record = record_at(&buf, slot);
            if !record.is_free() && record.name_matches(name) {
                return Ok(record.ino);
            }
        }
    }
    Err(FsError::NotFound)
}

/// Zeroes the matching record in place, making the slot reusable. The
/// directory never shrinks: an emptied block stays allocated and stays in the
/// pointer array.
pub fn remove_entry<T: BlockStorage>(dev: &mut T, dir: &Inode, name: &str) -> Result<u32> {
    let mut buf = [0u8; BLOCK_SIZE];
    for i in 0..dir.block_count as usize {
        dev.read_block(dir.block[i] as usize, &mut buf)?;
        for slot in 0..DIR_RECORDS_PER_BLOCK {
            let record = record_at(&buf, slot);
            if !record.is_free() && record.name_matches(name) {
                put_record(&mut buf, slot, &DirRecord::free());
                dev.write_block(dir.block[i] as usize, &buf)?;
                return Ok(record.ino);
            }
        }
    }
    Err(FsError::NotFound)
}

/// A directory is empty when nothing beyond the conventional `.` and `..`
/// records is occupied.
pub fn is_empty<T: BlockStorage>(dev: &mut T, dir: &Inode) -> Result<bool> {
    let mut occupied = 0;
    let mut buf = [0u8; BLOCK_SIZE];
    for i in 0..dir.block_count as usize {
        dev.read_block(dir.block[i] as usize, &mut buf)?;
        for slot in 0..DIR_RECORDS_PER_BLOCK {
            if !record_at(&buf, slot).is_free() {
                occupied += 1;
            }
        }
    }
    Ok(occupied == 2)
}

/// All occupied records in deterministic scan order.
pub fn list_entries<T: BlockStorage>(dev: &mut T, dir: &Inode) -> Result<Vec<DirRecord>> {
    let mut entries = Vec::new();
    let mut buf = [0u8; BLOCK_SIZE];
    for i in 0..dir.block_count as usize {
        dev.read_block(dir.block[i] as usize, &mut buf)?;
        for slot in 0..DIR_RECORDS_PER_BLOCK {
            let record = record_at(&buf, slot);
            if !record.is_free() {
                entries.push(record);
            }
        }
    }
    Ok(entries)
}
