use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every failure a volume operation can surface. Errors propagate to the
/// caller immediately; the engine performs no retry or repair.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("block device i/o failed")]
    Io(#[from] std::io::Error),
    #[error("bad superblock magic {0:#010x}")]
    InvalidMagic(u32),
    #[error("superblock geometry is invalid")]
    CorruptSuperblock,
    #[error("block bitmap exhausted, no free blocks")]
    NoSpace,
    #[error("inode bitmap exhausted, no free inodes")]
    NoInodes,
    #[error("no such entry")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("invalid entry name")]
    InvalidName,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("write exceeds the direct pointer capacity")]
    FileTooLarge,
    #[error("inode number {0} out of range")]
    InvalidInode(u32),
    #[error("index {0} out of bitmap range")]
    InvalidBlock(u32),
}
