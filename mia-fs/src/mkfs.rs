//! # 格式化
//!
//! 分区大小`size`与索引节点数`n`满足：
//!
//! ```text
//! size >= SuperBlock::SIZE + n + 3n + n * Inode::SIZE + 3n * BLOCK_SIZE
//! ```
//!
//! 取满足该式的最大`n`，剩余的字节不使用。

use std::str::FromStr;

use enumflags2::BitFlags;

use crate::error::{FsError, ParseValueError, Result};
use crate::layout::{FolderBlock, Inode, InodeId, InodeKind, PartKind, Permissions, SuperBlock};
use crate::mount::MountTable;
use crate::volume::Volume;
use crate::{now, tree, BLOCKS_PER_INODE, BLOCK_SIZE, USERS_CONTENT, USERS_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    /// 只写元数据
    #[default]
    Fast,
    /// 先将整个分区清零
    Full,
}

impl FromStr for FormatKind {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "full" => Ok(Self::Full),
            _ => Err(ParseValueError::new("format type", s)),
        }
    }
}

/// 每个索引节点连同其位图单元与数据块所占的字节数
const BYTES_PER_INODE: u64 =
    1 + BLOCKS_PER_INODE as u64 + Inode::SIZE + BLOCKS_PER_INODE as u64 * BLOCK_SIZE;

/// 分区能容纳的索引节点数
pub fn inode_count(partition_size: u64) -> u64 {
    partition_size.saturating_sub(SuperBlock::SIZE) / BYTES_PER_INODE
}

/// 格式化已挂载的分区，返回新写入的超级块
pub fn mkfs(table: &MountTable, id: &str, kind: FormatKind) -> Result<SuperBlock> {
    let (image, partition) = table.resolve(id)?;
    if partition.kind == PartKind::Extended {
        return Err(FsError::FormatExtended);
    }

    let size = partition.size as u64;
    let inodes = inode_count(size);
    // 根目录与用户表各占一个索引节点
    if inodes < 2 {
        return Err(FsError::TooSmall(size));
    }
    let inodes = u32::try_from(inodes).map_err(|_| FsError::TooSmall(size))?;

    if kind == FormatKind::Full {
        image.fill(partition.start as u64, size, 0)?;
    }

    let now = now();
    let sb = SuperBlock::new(partition.start as u64, inodes, now);
    let mut vol = Volume::with_super_block(image, &partition, sb);
    vol.inode_bitmap().init(vol.image())?;
    vol.block_bitmap().init(vol.image())?;

    let root = vol.alloc_inode()?;
    let block = vol.alloc_block()?;
    if root != InodeId::ROOT {
        return Err(FsError::Corrupted(format!("root allocated as inode {root}")));
    }
    vol.write_block(block, &FolderBlock::with_links(root, root))?;
    let mut inode = Inode::new(InodeKind::Folder, now);
    inode.block[0] = block.into();
    inode.perm = Permissions {
        owner: BitFlags::all(),
        group: BitFlags::all(),
        other: BitFlags::all(),
    };
    vol.write_inode(root, &inode)?;
    vol.commit()?;

    let users = tree::mkfile(&mut vol, &format!("/{USERS_FILE}"), false, USERS_CONTENT.as_bytes())?;
    let mut inode = vol.read_inode(users)?;
    inode.perm = Permissions {
        owner: BitFlags::all(),
        group: BitFlags::all(),
        other: BitFlags::empty(),
    };
    vol.write_inode(users, &inode)?;
    vol.commit()?;

    let sb = vol.super_block().clone();
    log::info!(
        "formatted {:?} ({id}): {} inodes, {} blocks",
        vol.name(),
        sb.inodes_count,
        sb.blocks_count
    );
    Ok(sb)
}
