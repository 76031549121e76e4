use binrw::binrw;

use super::{InodeId, Link, Name};
use crate::{BLOCK_SIZE, FOLDER_ENTRIES, NAME_LEN, POINTER_COUNT};

/// 目录项：名字为空表示未使用
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderEntry {
    pub name: Name<NAME_LEN>,
    pub inode: Link,
}

impl FolderEntry {
    pub fn new(name: Name<NAME_LEN>, inode: InodeId) -> Self {
        Self {
            name,
            inode: inode.into(),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.name.is_empty()
    }
}

/// 目录块
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderBlock {
    pub content: [FolderEntry; FOLDER_ENTRIES],
}

impl FolderBlock {
    /// 新目录的首块：`.`指向自身，`..`指向父目录
    pub fn with_links(itself: InodeId, parent: InodeId) -> Self {
        let mut block = Self::default();
        block.content[0] = FolderEntry::new(Name::new(".").unwrap_or_default(), itself);
        block.content[1] = FolderEntry::new(Name::new("..").unwrap_or_default(), parent);
        block
    }

    pub fn find(&self, name: &str) -> Option<InodeId> {
        self.content
            .iter()
            .find(|entry| entry.name.matches(name))
            .and_then(|entry| entry.inode.inode())
    }

    pub fn free_entry(&mut self) -> Option<&mut FolderEntry> {
        self.content.iter_mut().find(|entry| entry.is_free())
    }

    pub fn entries(&self) -> impl Iterator<Item = &FolderEntry> {
        self.content.iter().filter(|entry| !entry.is_free())
    }
}

/// 文件块：原样存放内容
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub content: [u8; BLOCK_SIZE as usize],
}

impl Default for FileBlock {
    fn default() -> Self {
        Self {
            content: [0; BLOCK_SIZE as usize],
        }
    }
}

impl FileBlock {
    /// `chunk`不足一块时以`\0`补齐
    pub fn from_chunk(chunk: &[u8]) -> Self {
        let mut block = Self::default();
        block.content[..chunk.len()].copy_from_slice(chunk);
        block
    }
}

/// 间接索引块
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PointerBlock {
    pub pointers: [Link; POINTER_COUNT],
}

impl PointerBlock {
    pub fn blocks(&self) -> impl Iterator<Item = super::BlockId> + '_ {
        self.pointers.iter().filter_map(|link| link.block())
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.pointers.iter().position(|link| link.is_absent())
    }
}
