use naivefs::{
    FsError, NaiveFs, BLOCK_SIZE, DIRECT_BLOCKS, MAX_FILE_SIZE, ROOT_INO,
};

use fileblock::{FileBlockEmulator, FileBlockEmulatorBuilder};

use std::io::{Read, Seek, SeekFrom, Write};

fn test_device(blocks: usize) -> FileBlockEmulator {
    FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
        .with_block_count(blocks)
        .build()
        .expect("could not initialize disk emulator")
}

/// A freshly formatted 64 KiB volume with 128 inodes.
fn small_volume() -> NaiveFs<FileBlockEmulator> {
    NaiveFs::format(test_device(128), 128, 128).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn format_computes_expected_geometry() {
    let fs = small_volume();
    let sb = fs.superblock();
    assert_eq!(sb.block_total, 128);
    assert_eq!(sb.inode_total, 128);
    assert_eq!(sb.inode_table_start, 4);
    // 128 inodes at 128 bytes each occupy 32 table blocks.
    assert_eq!(sb.data_start, 36);

    let stat = fs.statfs();
    assert_eq!(stat.block_size, 512);
    // Metadata region plus the root directory's first entry block are taken.
    assert_eq!(stat.block_free, 128 - 36 - 1);
    assert_eq!(stat.inode_free, 127);
}

#[test]
fn format_seeds_root_directory() {
    let mut fs = small_volume();
    let root = fs.stat_inode(ROOT_INO).unwrap();
    assert!(root.is_dir());
    assert_eq!(root.nlink, 2);
    assert_eq!(root.block_count, 1);
    assert_eq!(root.size, BLOCK_SIZE as u32);

    let entries = fs.read_dir(ROOT_INO).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec![".", ".."]);
    assert!(entries.iter().all(|e| e.ino == ROOT_INO));
}

#[test]
fn format_presets_metadata_bits_on_disk() {
    let fs = small_volume();
    let mut file = fs.unmount().unwrap().into_file();

    // Block bitmap at block 2: blocks 0..36 are metadata, block 36 holds the
    // root directory, so the first five bytes read 0xff x4 then 0x1f.
    let mut bitmap = [0u8; 5];
    file.seek(SeekFrom::Start(2 * 512)).unwrap();
    file.read_exact(&mut bitmap).unwrap();
    assert_eq!(bitmap, [0xff, 0xff, 0xff, 0xff, 0x1f]);

    // Inode bitmap at block 3: only the root inode is pre-marked.
    let mut bitmap = [0u8; 2];
    file.seek(SeekFrom::Start(3 * 512)).unwrap();
    file.read_exact(&mut bitmap).unwrap();
    assert_eq!(bitmap, [0x01, 0x00]);
}

#[test]
fn formatting_an_oversized_volume_is_rejected() {
    // A single bitmap block tracks 4096 items, so an 8192-block volume must
    // fail cleanly before anything is written.
    match NaiveFs::format(test_device(8192), 8192, 128) {
        Err(FsError::CorruptSuperblock) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    match NaiveFs::format(test_device(128), 128, 8192) {
        Err(FsError::CorruptSuperblock) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn mounting_a_volume_with_tampered_geometry_is_rejected() {
    let fs = small_volume();
    let mut file = fs.unmount().unwrap().into_file();

    // Overwrite the superblock's block_total field with an impossible value.
    file.seek(SeekFrom::Start(512 + 4)).unwrap();
    file.write_all(&100_000u32.to_le_bytes()).unwrap();

    let dev = FileBlockEmulatorBuilder::from(file)
        .with_block_count(128)
        .clear_medium(false)
        .build()
        .unwrap();
    match NaiveFs::mount(dev) {
        Err(FsError::CorruptSuperblock) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn mounting_an_unformatted_volume_is_rejected() {
    match NaiveFs::mount(test_device(128)) {
        Err(FsError::InvalidMagic(0)) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn create_then_lookup_resolves_the_same_inode() {
    let mut fs = small_volume();
    let ino = fs.create(ROOT_INO, "foo", 0o644).unwrap();
    assert_eq!(fs.lookup(ROOT_INO, "foo").unwrap(), ino);

    let inode = fs.stat_inode(ino).unwrap();
    assert!(inode.is_file());
    assert_eq!(inode.nlink, 1);
    assert_eq!(inode.size, 0);
    assert_eq!(inode.block_count, 0);

    // The conventional self entry resolves too.
    assert_eq!(fs.lookup(ROOT_INO, ".").unwrap(), ROOT_INO);
}

#[test]
fn duplicate_names_are_rejected_on_create() {
    let mut fs = small_volume();
    fs.create(ROOT_INO, "foo", 0o644).unwrap();
    match fs.create(ROOT_INO, "foo", 0o644) {
        Err(FsError::AlreadyExists) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    match fs.mkdir(ROOT_INO, "foo", 0o755) {
        Err(FsError::AlreadyExists) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn lookup_of_a_missing_name_is_not_found() {
    let mut fs = small_volume();
    match fs.lookup(ROOT_INO, "missing") {
        Err(FsError::NotFound) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn a_600_byte_write_spans_two_blocks_and_reads_back() {
    let mut fs = small_volume();
    let free_before = fs.statfs().block_free;
    let ino = fs.create(ROOT_INO, "data.bin", 0o644).unwrap();

    let payload = pattern(600);
    assert_eq!(fs.write(ino, 0, &payload).unwrap(), 600);

    let inode = fs.stat_inode(ino).unwrap();
    assert_eq!(inode.size, 600);
    assert_eq!(inode.block_count, 2);
    assert_eq!(fs.statfs().block_free, free_before - 2);

    let mut buf = vec![0u8; 600];
    assert_eq!(fs.read(ino, 0, &mut buf).unwrap(), 600);
    assert_eq!(buf, payload);
}

#[test]
fn overwrites_preserve_bytes_outside_the_range() {
    let mut fs = small_volume();
    let ino = fs.create(ROOT_INO, "notes", 0o644).unwrap();
    fs.write(ino, 0, b"hello world").unwrap();
    fs.write(ino, 0, b"HE").unwrap();

    let mut buf = vec![0u8; 11];
    assert_eq!(fs.read(ino, 0, &mut buf).unwrap(), 11);
    assert_eq!(&buf, b"HEllo world");
    assert_eq!(fs.stat_inode(ino).unwrap().size, 11);
}

#[test]
fn reads_are_clamped_at_end_of_file() {
    let mut fs = small_volume();
    let ino = fs.create(ROOT_INO, "short", 0o644).unwrap();
    fs.write(ino, 0, b"abc").unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(fs.read(ino, 0, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(fs.read(ino, 3, &mut buf).unwrap(), 0);
    assert_eq!(fs.read(ino, 100, &mut buf).unwrap(), 0);
}

#[test]
fn writes_past_direct_pointer_capacity_are_rejected() {
    let mut fs = small_volume();
    let ino = fs.create(ROOT_INO, "big", 0o644).unwrap();

    let too_big = vec![0x55u8; MAX_FILE_SIZE + 1];
    match fs.write(ino, 0, &too_big) {
        Err(FsError::FileTooLarge) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    let inode = fs.stat_inode(ino).unwrap();
    assert_eq!(inode.block_count, 0);
    assert_eq!(inode.size, 0);

    // Exactly the capacity still works.
    let full = pattern(MAX_FILE_SIZE);
    assert_eq!(fs.write(ino, 0, &full).unwrap(), MAX_FILE_SIZE);
    assert_eq!(fs.stat_inode(ino).unwrap().block_count, DIRECT_BLOCKS as u32);
    match fs.write(ino, MAX_FILE_SIZE, b"x") {
        Err(FsError::FileTooLarge) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn exhausting_the_inode_bitmap_reports_no_inodes() {
    // 8 inodes, one of which is the root directory.
    let mut fs = NaiveFs::format(test_device(64), 64, 8).unwrap();
    for i in 0..7 {
        fs.create(ROOT_INO, &format!("f{}", i), 0o644).unwrap();
    }
    match fs.create(ROOT_INO, "one-too-many", 0o644) {
        Err(FsError::NoInodes) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn unlink_releases_blocks_and_the_inode() {
    let mut fs = small_volume();
    let stat_before = fs.statfs();

    let ino = fs.create(ROOT_INO, "doomed", 0o644).unwrap();
    fs.write(ino, 0, &pattern(1000)).unwrap();
    assert_eq!(fs.statfs().block_free, stat_before.block_free - 2);

    fs.unlink(ROOT_INO, "doomed").unwrap();
    let stat_after = fs.statfs();
    assert_eq!(stat_after.block_free, stat_before.block_free);
    assert_eq!(stat_after.inode_free, stat_before.inode_free);
    match fs.lookup(ROOT_INO, "doomed") {
        Err(FsError::NotFound) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn rmdir_requires_an_empty_directory() {
    let mut fs = small_volume();
    let dir = fs.mkdir(ROOT_INO, "sub", 0o755).unwrap();
    assert_eq!(fs.stat_inode(ROOT_INO).unwrap().nlink, 3);
    assert_eq!(fs.stat_inode(dir).unwrap().nlink, 2);

    fs.create(dir, "file", 0o644).unwrap();
    match fs.rmdir(ROOT_INO, "sub") {
        Err(FsError::DirectoryNotEmpty) => (),
        other => panic!("unexpected result: {:?}", other),
    }

    fs.unlink(dir, "file").unwrap();
    fs.rmdir(ROOT_INO, "sub").unwrap();
    assert_eq!(fs.stat_inode(ROOT_INO).unwrap().nlink, 2);
    match fs.lookup(ROOT_INO, "sub") {
        Err(FsError::NotFound) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn type_mismatches_are_surfaced() {
    let mut fs = small_volume();
    let dir = fs.mkdir(ROOT_INO, "sub", 0o755).unwrap();
    let file = fs.create(ROOT_INO, "file", 0o644).unwrap();

    match fs.unlink(ROOT_INO, "sub") {
        Err(FsError::IsADirectory) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    match fs.rmdir(ROOT_INO, "file") {
        Err(FsError::NotADirectory) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    match fs.read(dir, 0, &mut [0u8; 8]) {
        Err(FsError::IsADirectory) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    match fs.create(file, "child", 0o644) {
        Err(FsError::NotADirectory) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn directories_grow_by_one_block_and_reuse_freed_slots() {
    let mut fs = small_volume();

    // The root's first block holds 16 records, two of which are `.`/`..`.
    for i in 0..14 {
        fs.create(ROOT_INO, &format!("f{}", i), 0o644).unwrap();
    }
    assert_eq!(fs.stat_inode(ROOT_INO).unwrap().block_count, 1);

    fs.create(ROOT_INO, "overflow", 0o644).unwrap();
    let root = fs.stat_inode(ROOT_INO).unwrap();
    assert_eq!(root.block_count, 2);
    assert_eq!(root.size, 2 * BLOCK_SIZE as u32);

    // Removal leaves the block in place but frees the slot for reuse.
    fs.unlink(ROOT_INO, "f3").unwrap();
    assert_eq!(fs.stat_inode(ROOT_INO).unwrap().block_count, 2);
    fs.create(ROOT_INO, "recycled", 0o644).unwrap();
    assert_eq!(fs.stat_inode(ROOT_INO).unwrap().block_count, 2);

    // Listing order is block order, then slot order, so the recycled slot
    // shows up where f3 used to sit.
    let names: Vec<_> = fs
        .read_dir(ROOT_INO)
        .unwrap()
        .iter()
        .map(|e| e.name())
        .collect();
    assert_eq!(names[5], "recycled");
    assert_eq!(names.last().unwrap(), "overflow");
}

#[test]
fn a_directory_cannot_outgrow_its_pointer_array() {
    let dev = test_device(512);
    let mut fs = NaiveFs::format(dev, 512, 200).unwrap();

    // 8 blocks x 16 records, minus `.` and `..`, leaves room for 126 names.
    for i in 0..126 {
        fs.create(ROOT_INO, &format!("n{}", i), 0o644).unwrap();
    }
    match fs.create(ROOT_INO, "one-too-many", 0o644) {
        Err(FsError::FileTooLarge) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn can_unmount_and_remount_an_initialized_volume() {
    let disk = tempfile::NamedTempFile::new().unwrap();
    let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_count(128)
        .build()
        .unwrap();

    let mut fs = NaiveFs::format(dev, 128, 128).unwrap();
    let ino = fs.create(ROOT_INO, "persisted", 0o644).unwrap();
    fs.write(ino, 0, b"still here").unwrap();
    fs.unmount().unwrap();

    let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_count(128)
        // Don't reset the initialized disk.
        .clear_medium(false)
        .build()
        .unwrap();
    let mut fs = NaiveFs::mount(dev).unwrap();
    let found = fs.lookup(ROOT_INO, "persisted").unwrap();
    assert_eq!(found, ino);

    let mut buf = vec![0u8; 10];
    assert_eq!(fs.read(found, 0, &mut buf).unwrap(), 10);
    assert_eq!(&buf, b"still here");
    assert_eq!(fs.statfs().inode_free, 126);
}
