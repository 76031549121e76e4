//! # 位图
//!
//! 每个单元占一字节，`'0'`表示空闲，`'1'`表示已用。
//! 位图只负责磁盘上的字节，空闲计数与最小空闲单元记录在超级块中，
//! 由调用者负责写回。

use disk_image::DiskImage;

use crate::error::{FsError, Result};
use crate::layout::{Link, SuperBlock};

pub const FREE: u8 = b'0';
pub const USED: u8 = b'1';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Inode,
    Block,
}

impl Unit {
    fn label(self) -> &'static str {
        match self {
            Self::Inode => "inode",
            Self::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    /// 位图首字节在磁盘内的偏移
    start: u64,
    count: u32,
    unit: Unit,
}

impl Bitmap {
    pub fn inodes(sb: &SuperBlock) -> Self {
        Self {
            start: sb.bm_inode_start as u64,
            count: sb.inodes_count,
            unit: Unit::Inode,
        }
    }

    pub fn blocks(sb: &SuperBlock) -> Self {
        Self {
            start: sb.bm_block_start as u64,
            count: sb.blocks_count,
            unit: Unit::Block,
        }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// 全部置为空闲
    pub fn init(&self, image: &DiskImage) -> Result<()> {
        image.fill(self.start, self.count as u64, FREE)?;
        Ok(())
    }

    /// 整张位图，用于报表与一致性检查
    pub fn load(&self, image: &DiskImage) -> Result<Vec<u8>> {
        let mut map = vec![0; self.count as usize];
        image.read_at(self.start, &mut map)?;
        if let Some(pos) = map.iter().position(|&b| b != FREE && b != USED) {
            return Err(FsError::Corrupted(format!(
                "{} bitmap byte {pos} is {:#04x}",
                self.unit.label(),
                map[pos]
            )));
        }
        Ok(map)
    }

    pub fn is_used(&self, image: &DiskImage, index: u32) -> Result<bool> {
        self.check_index(index)?;
        let mut byte = [0];
        image.read_at(self.start + index as u64, &mut byte)?;
        Ok(byte[0] == USED)
    }

    /// 从 0 开始扫描，返回最小的空闲单元
    pub fn find_free(&self, image: &DiskImage) -> Result<u32> {
        self.find_free_from(image, 0)?
            .ok_or(FsError::Exhausted(self.unit.label()))
    }

    fn find_free_from(&self, image: &DiskImage, from: u32) -> Result<Option<u32>> {
        if from >= self.count {
            return Ok(None);
        }
        let mut tail = vec![0; (self.count - from) as usize];
        image.read_at(self.start + from as u64, &mut tail)?;
        log::trace!("scanning {} bitmap from {from}", self.unit.label());

        Ok(tail
            .iter()
            .position(|&b| b == FREE)
            .map(|pos| from + pos as u32))
    }

    pub fn mark_used(&self, image: &DiskImage, sb: &mut SuperBlock, index: u32) -> Result<()> {
        if self.is_used(image, index)? {
            return Err(FsError::Corrupted(format!(
                "{} {index} is already allocated",
                self.unit.label()
            )));
        }
        image.write_at(self.start + index as u64, &[USED])?;

        let (free, first) = self.counters(sb);
        *free = free.saturating_sub(1);
        if first.get() == Some(index) {
            *first = Link::from(self.find_free_from(image, index + 1)?);
        }
        Ok(())
    }

    pub fn mark_free(&self, image: &DiskImage, sb: &mut SuperBlock, index: u32) -> Result<()> {
        if !self.is_used(image, index)? {
            return Err(FsError::Corrupted(format!(
                "{} {index} is already free",
                self.unit.label()
            )));
        }
        image.write_at(self.start + index as u64, &[FREE])?;

        let (free, first) = self.counters(sb);
        *free += 1;
        if first.get().is_none_or(|lowest| index < lowest) {
            *first = Link::To(index);
        }
        Ok(())
    }

    fn counters<'a>(&self, sb: &'a mut SuperBlock) -> (&'a mut u32, &'a mut Link) {
        match self.unit {
            Unit::Inode => (&mut sb.free_inodes_count, &mut sb.first_ino),
            Unit::Block => (&mut sb.free_blocks_count, &mut sb.first_blo),
        }
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.count {
            return Err(FsError::Corrupted(format!(
                "{} {index} is out of range (count {})",
                self.unit.label(),
                self.count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn setup(inodes: u32) -> (TempDir, DiskImage, SuperBlock) {
        let dir = tempfile::tempdir().unwrap();
        let sb = SuperBlock::new(0, inodes, 0);
        let image = DiskImage::create(dir.path().join("bm.mia"), sb.end()).unwrap();
        Bitmap::inodes(&sb).init(&image).unwrap();
        Bitmap::blocks(&sb).init(&image).unwrap();
        (dir, image, sb)
    }

    #[test]
    fn lowest_free_first() {
        let (_dir, image, mut sb) = setup(4);
        let bitmap = Bitmap::blocks(&sb);
        assert_eq!(12, bitmap.count());

        for expected in 0..3 {
            let index = bitmap.find_free(&image).unwrap();
            assert_eq!(expected, index);
            bitmap.mark_used(&image, &mut sb, index).unwrap();
        }
        assert_eq!(9, sb.free_blocks_count);
        assert_eq!(Link::To(3), sb.first_blo);

        bitmap.mark_free(&image, &mut sb, 1).unwrap();
        assert_eq!(1, bitmap.find_free(&image).unwrap());
        assert_eq!(Link::To(1), sb.first_blo);
        assert_eq!(10, sb.free_blocks_count);
    }

    #[test]
    fn exhaustion() {
        let (_dir, image, mut sb) = setup(2);
        let bitmap = Bitmap::inodes(&sb);
        bitmap.mark_used(&image, &mut sb, 0).unwrap();
        bitmap.mark_used(&image, &mut sb, 1).unwrap();

        assert!(matches!(bitmap.find_free(&image), Err(FsError::Exhausted("inode"))));
        assert_eq!(0, sb.free_inodes_count);
        assert_eq!(Link::Absent, sb.first_ino);
        assert_eq!(vec![USED, USED], bitmap.load(&image).unwrap());
    }

    #[test]
    fn double_alloc_and_free() {
        let (_dir, image, mut sb) = setup(2);
        let bitmap = Bitmap::inodes(&sb);
        bitmap.mark_used(&image, &mut sb, 1).unwrap();
        assert!(bitmap.mark_used(&image, &mut sb, 1).is_err());
        assert!(bitmap.mark_free(&image, &mut sb, 0).is_err());
        assert!(bitmap.is_used(&image, 2).is_err());
        assert_eq!(Link::To(0), sb.first_ino);
    }
}
