//! # 卷
//!
//! 已格式化的分区：超级块常驻内存，索引节点与数据块按偏移读写。
//! 每次分配都会立即写位图，超级块需要调用 [`Volume::commit`] 写回。

use std::ops::Range;

use binrw::{BinRead, BinWrite};
use disk_image::{DiskImage, ImageError};

use crate::bitmap::Bitmap;
use crate::error::{FsError, Result};
use crate::layout::{BlockId, Inode, InodeId, Partition, SuperBlock};

#[derive(Debug)]
pub struct Volume {
    image: DiskImage,
    name: String,
    partition: Range<u64>,
    sb: SuperBlock,
}

impl Volume {
    /// 读取并校验分区起始处的超级块
    pub fn open(image: DiskImage, partition: &Partition) -> Result<Self> {
        let name = partition.name.to_string();
        let range = partition.range();

        let sb: SuperBlock = match image.read_record(range.start) {
            Ok(sb) => sb,
            Err(ImageError::Codec(err)) => return Err(FsError::NotFormatted(name, err.to_string())),
            Err(err) => return Err(err.into()),
        };
        sb.check_layout(range.clone())
            .map_err(|reason| FsError::NotFormatted(name.clone(), reason))?;
        log::trace!("opened volume {name:?}: {sb:?}");

        Ok(Self {
            image,
            name,
            partition: range,
            sb,
        })
    }

    /// 格式化时使用：超级块尚未落盘
    pub(crate) fn with_super_block(image: DiskImage, partition: &Partition, sb: SuperBlock) -> Self {
        Self {
            image,
            name: partition.name.to_string(),
            partition: partition.range(),
            sb,
        }
    }

    #[inline]
    pub fn image(&self) -> &DiskImage {
        &self.image
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn partition(&self) -> Range<u64> {
        self.partition.clone()
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    #[inline]
    pub fn inode_bitmap(&self) -> Bitmap {
        Bitmap::inodes(&self.sb)
    }

    #[inline]
    pub fn block_bitmap(&self) -> Bitmap {
        Bitmap::blocks(&self.sb)
    }

    pub fn read_inode(&self, id: InodeId) -> Result<Inode> {
        self.check_inode(id)?;
        Ok(self.image.read_record(self.sb.inode_offset(id))?)
    }

    pub fn write_inode(&self, id: InodeId, inode: &Inode) -> Result<()> {
        self.check_inode(id)?;
        self.image.write_record(self.sb.inode_offset(id), inode)?;
        Ok(())
    }

    /// 按调用者期望的类型解读数据块
    pub fn read_block<T>(&self, id: BlockId) -> Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        self.check_block(id)?;
        Ok(self.image.read_record(self.sb.block_offset(id))?)
    }

    pub fn write_block<T>(&self, id: BlockId, block: &T) -> Result<()>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        self.check_block(id)?;
        self.image.write_record(self.sb.block_offset(id), block)?;
        Ok(())
    }

    pub fn alloc_inode(&mut self) -> Result<InodeId> {
        let bitmap = self.inode_bitmap();
        let index = bitmap.find_free(&self.image)?;
        bitmap.mark_used(&self.image, &mut self.sb, index)?;
        log::debug!("allocated inode {index} on {:?}", self.name);
        Ok(InodeId::new(index))
    }

    pub fn alloc_block(&mut self) -> Result<BlockId> {
        let bitmap = self.block_bitmap();
        let index = bitmap.find_free(&self.image)?;
        bitmap.mark_used(&self.image, &mut self.sb, index)?;
        log::debug!("allocated block {index} on {:?}", self.name);
        Ok(BlockId::new(index))
    }

    pub fn free_inode(&mut self, id: InodeId) -> Result<()> {
        let bitmap = self.inode_bitmap();
        bitmap.mark_free(&self.image, &mut self.sb, id.into())
    }

    pub fn free_block(&mut self, id: BlockId) -> Result<()> {
        let bitmap = self.block_bitmap();
        bitmap.mark_free(&self.image, &mut self.sb, id.into())
    }

    pub fn is_inode_used(&self, id: InodeId) -> Result<bool> {
        self.inode_bitmap().is_used(&self.image, id.into())
    }

    /// 写回超级块
    pub fn commit(&self) -> Result<()> {
        self.image.write_record(self.partition.start, &self.sb)?;
        Ok(())
    }

    fn check_inode(&self, id: InodeId) -> Result<()> {
        if u32::from(id) >= self.sb.inodes_count {
            return Err(FsError::Corrupted(format!(
                "inode {id} is out of range (count {})",
                self.sb.inodes_count
            )));
        }
        Ok(())
    }

    fn check_block(&self, id: BlockId) -> Result<()> {
        if u32::from(id) >= self.sb.blocks_count {
            return Err(FsError::Corrupted(format!(
                "block {id} is out of range (count {})",
                self.sb.blocks_count
            )));
        }
        Ok(())
    }
}
