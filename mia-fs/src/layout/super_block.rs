use std::num::TryFromIntError;
use std::ops::Range;

use binrw::binrw;

use super::{BlockId, Inode, InodeId, Link};
use crate::{BLOCKS_PER_INODE, BLOCK_SIZE, EXT2, MAGIC};

fn non_negative(raw: i32) -> Result<u32, TryFromIntError> {
    u32::try_from(raw)
}

fn wire(value: &u32) -> i32 {
    *value as i32
}

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录各区域的起始偏移（绝对偏移）与空闲计数
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub filesystem_type: i32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub inodes_count: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub blocks_count: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub free_blocks_count: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub free_inodes_count: u32,

    /// 最近一次挂载时间
    pub mtime: i64,

    /// 最近一次卸载时间
    pub umtime: i64,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub mnt_count: u32,

    /// 魔数：用于校验文件系统合法性
    #[br(assert(magic == MAGIC, "bad superblock magic {:#x}", magic))]
    magic: i32,

    #[br(assert(inode_size as u64 == Inode::SIZE, "unexpected inode size {}", inode_size))]
    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub inode_size: u32,

    #[br(assert(block_size as u64 == BLOCK_SIZE, "unexpected block size {}", block_size))]
    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub block_size: u32,

    /// 最小的空闲索引节点
    pub first_ino: Link,

    /// 最小的空闲数据块
    pub first_blo: Link,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub bm_inode_start: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub bm_block_start: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub inode_start: u32,

    #[br(try_map = non_negative)]
    #[bw(map = wire)]
    pub block_start: u32,
}

impl SuperBlock {
    pub const SIZE: u64 = 4 * 5 + 8 * 2 + 4 * 10;

    /// 分区从`start`开始，包含`inodes`个索引节点与其
    /// [`BLOCKS_PER_INODE`]倍的数据块。
    ///
    /// 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域
    pub fn new(start: u64, inodes: u32, now: i64) -> Self {
        let blocks = inodes * BLOCKS_PER_INODE;
        let bm_inode_start = start + Self::SIZE;
        let bm_block_start = bm_inode_start + inodes as u64;
        let inode_start = bm_block_start + blocks as u64;
        let block_start = inode_start + inodes as u64 * Inode::SIZE;

        Self {
            filesystem_type: EXT2,
            inodes_count: inodes,
            blocks_count: blocks,
            free_blocks_count: blocks,
            free_inodes_count: inodes,
            mtime: now,
            umtime: now,
            mnt_count: 1,
            magic: MAGIC,
            inode_size: Inode::SIZE as u32,
            block_size: BLOCK_SIZE as u32,
            first_ino: Link::To(0),
            first_blo: Link::To(0),
            bm_inode_start: bm_inode_start as u32,
            bm_block_start: bm_block_start as u32,
            inode_start: inode_start as u32,
            block_start: block_start as u32,
        }
    }

    #[inline]
    pub fn inode_offset(&self, id: InodeId) -> u64 {
        self.inode_start as u64 + u32::from(id) as u64 * self.inode_size as u64
    }

    #[inline]
    pub fn block_offset(&self, id: BlockId) -> u64 {
        self.block_start as u64 + u32::from(id) as u64 * self.block_size as u64
    }

    /// 数据块区域的末尾（不含）
    #[inline]
    pub fn end(&self) -> u64 {
        self.block_start as u64 + self.blocks_count as u64 * self.block_size as u64
    }

    /// 各区域必须按序排列、互相衔接，且落在分区`partition`内
    pub fn check_layout(&self, partition: Range<u64>) -> Result<(), String> {
        let expected = Self::new(partition.start, self.inodes_count, 0);

        if self.blocks_count != expected.blocks_count {
            return Err(format!(
                "{} blocks for {} inodes",
                self.blocks_count, self.inodes_count
            ));
        }
        let regions = [
            ("inode bitmap", self.bm_inode_start, expected.bm_inode_start),
            ("block bitmap", self.bm_block_start, expected.bm_block_start),
            ("inode table", self.inode_start, expected.inode_start),
            ("block table", self.block_start, expected.block_start),
        ];
        if let Some((region, found, want)) = regions.iter().find(|(_, f, w)| f != w) {
            return Err(format!("{region} starts at {found}, expected {want}"));
        }
        if self.end() > partition.end {
            return Err(format!(
                "block table ends at {} past the partition end {}",
                self.end(),
                partition.end
            ));
        }
        if self.free_inodes_count > self.inodes_count || self.free_blocks_count > self.blocks_count
        {
            return Err("free counters exceed totals".to_owned());
        }

        Ok(())
    }
}
