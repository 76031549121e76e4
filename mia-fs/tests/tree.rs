use std::path::Path;

use mia_fs::layout::{Fit, InodeId, InodeKind, Link, SINGLE_INDIRECT};
use mia_fs::tree::{self, BlockKind};
use mia_fs::{
    fdisk, mkdisk, mkfs, open_volume, FdiskRequest, FormatKind, FsError, MountTable, SizeUnit,
    Volume, BLOCK_SIZE, USERS_CONTENT,
};

/// 挂载并格式化一个`bytes`字节的分区
fn formatted(dir: &Path, bytes: u64) -> (MountTable, String) {
    let path = dir.join("disco.mia");
    mkdisk(&path, 1, SizeUnit::Mega, Fit::First).unwrap();
    fdisk(&FdiskRequest {
        unit: SizeUnit::Byte,
        ..FdiskRequest::new(&path, bytes, "Part1")
    })
    .unwrap();

    let mut table = MountTable::new("34");
    let id = table.mount(&path, "Part1").unwrap();
    mkfs(&table, &id, FormatKind::Fast).unwrap();
    (table, id)
}

fn volume(table: &MountTable, id: &str) -> Volume {
    open_volume(table, id).unwrap()
}

#[test]
fn fresh_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 512 * 1024);
    let vol = volume(&table, &id);

    let sb = vol.super_block();
    let n = (512 * 1024 - 76) / 296;
    assert_eq!(n, sb.inodes_count);
    assert_eq!(3 * n, sb.blocks_count);
    assert_eq!(n - 2, sb.free_inodes_count);
    assert_eq!(3 * n - 2, sb.free_blocks_count);
    assert_eq!(Link::To(2), sb.first_ino);
    assert_eq!(Link::To(2), sb.first_blo);
    assert_eq!(1, sb.mnt_count);

    assert_eq!(USERS_CONTENT.as_bytes(), tree::cat(&vol, "/users.txt").unwrap());
    let entries = tree::list(&vol, "/").unwrap();
    assert_eq!(1, entries.len());
    assert_eq!("users.txt", entries[0].name);
    assert_eq!(InodeId::new(1), entries[0].inode);
    assert_eq!(InodeKind::File, entries[0].kind);

    let root = vol.read_inode(InodeId::ROOT).unwrap();
    assert_eq!("777", root.perm.to_string());
    let users = vol.read_inode(InodeId::new(1)).unwrap();
    assert_eq!("770", users.perm.to_string());
    assert_eq!(USERS_CONTENT.len() as u32, users.size);
}

#[test]
fn mkdir_parents() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 512 * 1024);
    let mut vol = volume(&table, &id);

    assert!(matches!(
        tree::mkdir(&mut vol, "/home/user/docs", false),
        Err(FsError::NotFound(path)) if path == "/home"
    ));
    tree::mkdir(&mut vol, "/home/user/docs", true).unwrap();
    assert!(matches!(
        tree::mkdir(&mut vol, "/home/user", true),
        Err(FsError::Exists(_))
    ));
    tree::mkdir(&mut vol, "/home/other", false).unwrap();

    let names: Vec<String> = tree::list(&vol, "/home")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(vec!["user", "other"], names);

    assert!(matches!(
        tree::mkdir(&mut vol, "/users.txt/x", false),
        Err(FsError::NotDirectory(_))
    ));
    assert!(matches!(
        tree::mkdir(&mut vol, "relative", false),
        Err(FsError::InvalidPath(_))
    ));

    // 重新打开后结构仍在
    let vol = volume(&table, &id);
    let docs = tree::lookup(&vol, "/home/user/docs").unwrap();
    assert_eq!(InodeKind::Folder, vol.read_inode(docs).unwrap().kind);
}

#[test]
fn folder_grows_into_indirect_block() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 512 * 1024);
    let mut vol = volume(&table, &id);
    tree::mkdir(&mut vol, "/d", false).unwrap();

    // 首块剩 2 个空位，其余 11 个直接索引块各 4 个
    for i in 0..46 {
        tree::mkfile(&mut vol, &format!("/d/f{i}"), false, b"").unwrap();
    }
    let d = tree::lookup(&vol, "/d").unwrap();
    let inode = vol.read_inode(d).unwrap();
    assert_eq!(12, inode.direct_blocks().count());
    assert_eq!(None, inode.single_indirect());

    let free_blocks = vol.super_block().free_blocks_count;
    tree::mkfile(&mut vol, "/d/f46", false, b"").unwrap();
    let inode = vol.read_inode(d).unwrap();
    let pointer = inode.single_indirect().unwrap();
    assert_eq!(Link::from(pointer), inode.block[SINGLE_INDIRECT]);
    assert_eq!(free_blocks - 2, vol.super_block().free_blocks_count);
    assert_eq!(Some(tree::lookup(&vol, "/d/f46").unwrap()), {
        let entries = tree::list(&vol, "/d").unwrap();
        entries.last().map(|entry| entry.inode)
    });

    let uses = tree::reachable_blocks(&vol).unwrap();
    let owned: Vec<_> = uses.iter().filter(|u| u.owner == d).collect();
    assert_eq!(14, owned.len());
    assert_eq!(1, owned.iter().filter(|u| u.kind == BlockKind::Pointer).count());
    assert!(owned
        .iter()
        .filter(|u| u.block != pointer)
        .all(|u| u.kind == BlockKind::Folder));
}

#[test]
fn folder_full() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 512 * 1024);
    let mut vol = volume(&table, &id);
    tree::mkdir(&mut vol, "/d", false).unwrap();

    // 2 + 11 * 4 + 16 * 4
    for i in 0..110 {
        tree::mkfile(&mut vol, &format!("/d/f{i}"), false, b"").unwrap();
    }
    let (inodes, blocks) = {
        let sb = vol.super_block();
        (sb.free_inodes_count, sb.free_blocks_count)
    };

    assert!(matches!(
        tree::mkfile(&mut vol, "/d/f110", false, b""),
        Err(FsError::FolderFull(_))
    ));
    assert_eq!(inodes, vol.super_block().free_inodes_count);
    assert_eq!(blocks, vol.super_block().free_blocks_count);
    assert!(matches!(
        tree::lookup(&vol, "/d/f110"),
        Err(FsError::NotFound(_))
    ));

    // 超级块与位图保持一致
    let reopened = volume(&table, &id);
    assert_eq!(inodes, reopened.super_block().free_inodes_count);
    let free = reopened
        .inode_bitmap()
        .load(reopened.image())
        .unwrap()
        .iter()
        .filter(|&&b| b == mia_fs::bitmap::FREE)
        .count();
    assert_eq!(inodes as usize, free);
}

#[test]
fn file_content() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 512 * 1024);
    let mut vol = volume(&table, &id);

    let small = tree::digits(100);
    tree::mkfile(&mut vol, "/a/b/small.txt", true, &small).unwrap();
    assert_eq!(small, tree::cat(&vol, "/a/b/small.txt").unwrap());

    // 12 个直接索引块加 4 个间接索引块
    let large = tree::digits(1000);
    let file = tree::mkfile(&mut vol, "/large.txt", false, &large).unwrap();
    assert_eq!(large, tree::cat(&vol, "/large.txt").unwrap());
    let inode = vol.read_inode(file).unwrap();
    assert_eq!(1000, inode.size);
    assert!(inode.single_indirect().is_some());

    let uses = tree::reachable_blocks(&vol).unwrap();
    let owned: Vec<_> = uses.iter().filter(|u| u.owner == file).collect();
    assert_eq!(17, owned.len());
    assert_eq!(16, owned.iter().filter(|u| u.kind == BlockKind::File).count());

    let max = 28 * BLOCK_SIZE as usize;
    tree::mkfile(&mut vol, "/max.txt", false, &tree::digits(max)).unwrap();
    assert!(matches!(
        tree::mkfile(&mut vol, "/over.txt", false, &tree::digits(max + 1)),
        Err(FsError::FileTooLarge { .. })
    ));
    assert!(matches!(
        tree::mkfile(&mut vol, "/large.txt", false, b"again"),
        Err(FsError::Exists(_))
    ));
    assert!(matches!(
        tree::cat(&vol, "/a/b"),
        Err(FsError::NotFile(_))
    ));
    assert!(matches!(
        tree::mkfile(&mut vol, "/x/y.txt", false, b""),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn exhausted_inodes_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    // 3 个索引节点，9 个数据块
    let (table, id) = formatted(dir.path(), 76 + 3 * 296);
    let mut vol = volume(&table, &id);
    assert_eq!(3, vol.super_block().inodes_count);

    tree::mkdir(&mut vol, "/a", false).unwrap();
    let free_blocks = vol.super_block().free_blocks_count;
    assert!(matches!(
        tree::mkdir(&mut vol, "/b", false),
        Err(FsError::Exhausted("inode"))
    ));
    assert_eq!(0, vol.super_block().free_inodes_count);
    assert_eq!(free_blocks, vol.super_block().free_blocks_count);
}

#[test]
fn format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disco.mia");
    mkdisk(&path, 64, SizeUnit::Kilo, Fit::First).unwrap();
    let tiny = FdiskRequest {
        unit: SizeUnit::Byte,
        ..FdiskRequest::new(&path, 600, "Tiny")
    };
    fdisk(&tiny).unwrap();
    fdisk(&FdiskRequest::new(&path, 8, "Raw")).unwrap();
    fdisk(&FdiskRequest {
        kind: mia_fs::PartitionType::Extended,
        ..FdiskRequest::new(&path, 8, "Ext")
    })
    .unwrap();

    let mut table = MountTable::new("34");
    assert!(matches!(
        mkfs(&table, "341A", FormatKind::Fast),
        Err(FsError::NotMounted(_))
    ));

    let tiny = table.mount(&path, "Tiny").unwrap();
    assert!(matches!(
        mkfs(&table, &tiny, FormatKind::Fast),
        Err(FsError::TooSmall(600))
    ));

    let ext = table.mount(&path, "Ext").unwrap();
    assert!(matches!(
        mkfs(&table, &ext, FormatKind::Full),
        Err(FsError::FormatExtended)
    ));

    let raw = table.mount(&path, "Raw").unwrap();
    assert!(matches!(
        open_volume(&table, &raw),
        Err(FsError::NotFormatted(..))
    ));
    mkfs(&table, &raw, FormatKind::Full).unwrap();
    let vol = open_volume(&table, &raw).unwrap();
    assert_eq!(USERS_CONTENT.as_bytes(), tree::cat(&vol, "/users.txt").unwrap());
}

#[test]
fn full_format_zeroes_the_partition() {
    let dir = tempfile::tempdir().unwrap();
    let (table, id) = formatted(dir.path(), 64 * 1024);
    let vol = volume(&table, &id);
    let range = vol.partition();
    let tail = vol.super_block().end();
    vol.image().fill(tail, range.end - tail, 0xAA).unwrap();

    mkfs(&table, &id, FormatKind::Full).unwrap();
    let mut rest = vec![0; (range.end - tail) as usize];
    vol.image().read_at(tail, &mut rest).unwrap();
    assert!(rest.iter().all(|&b| b == 0));
}

/// 在根目录写入填充文件，直到只剩`leave`个空闲块
fn consume_blocks(vol: &mut Volume, leave: u32) {
    for i in 0.. {
        let free = vol.super_block().free_blocks_count;
        if free <= leave {
            break;
        }
        // 根目录所有块已满时，下一个目录项会先占一个新块
        let grows = (tree::list(vol, "/").unwrap().len() + 2) % 4 == 0;
        let budget = (free - leave - grows as u32) as usize;
        let blocks = match budget {
            0..=12 => budget,
            13 => 12,
            _ => (budget - 1).min(28),
        };
        let content = tree::digits(blocks * BLOCK_SIZE as usize);
        tree::mkfile(vol, &format!("/fill{i}"), false, &content).unwrap();
    }
    assert_eq!(leave, vol.super_block().free_blocks_count);
}

#[test]
fn indirect_growth_rolls_back_when_blocks_run_out() {
    let dir = tempfile::tempdir().unwrap();
    // 60 个索引节点，180 个数据块
    let (table, id) = formatted(dir.path(), 76 + 60 * 296);
    let mut vol = volume(&table, &id);
    tree::mkdir(&mut vol, "/d", false).unwrap();
    for i in 0..46 {
        tree::mkfile(&mut vol, &format!("/d/f{i}"), false, b"").unwrap();
    }
    consume_blocks(&mut vol, 1);
    let free_inodes = vol.super_block().free_inodes_count;

    // 间接索引块能分配，其后的目录块不能
    assert!(matches!(
        tree::mkfile(&mut vol, "/d/f46", false, b""),
        Err(FsError::Exhausted("block"))
    ));
    assert_eq!(1, vol.super_block().free_blocks_count);
    assert_eq!(free_inodes, vol.super_block().free_inodes_count);

    let reopened = volume(&table, &id);
    let d = tree::lookup(&reopened, "/d").unwrap();
    assert_eq!(None, reopened.read_inode(d).unwrap().single_indirect());
    let free = reopened
        .block_bitmap()
        .load(reopened.image())
        .unwrap()
        .iter()
        .filter(|&&b| b == mia_fs::bitmap::FREE)
        .count();
    assert_eq!(1, free);
    assert_eq!(1, reopened.super_block().free_blocks_count);
}
