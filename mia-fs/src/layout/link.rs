use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};
use derive_more::{Display, From, Into};

/// 索引节点编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[repr(transparent)]
pub struct InodeId(u32);

/// 数据块编号（块区域内的下标，不是字节偏移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[repr(transparent)]
pub struct BlockId(u32);

impl InodeId {
    pub const ROOT: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

/// 磁盘上的指针。线上格式为`i32`，`-1`表示未使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Link {
    #[default]
    Absent,
    To(u32),
}

impl Link {
    pub const RAW_ABSENT: i32 = -1;

    /// Any negative value other than `-1` is rejected.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            Self::RAW_ABSENT => Some(Self::Absent),
            raw if raw >= 0 => Some(Self::To(raw as u32)),
            _ => None,
        }
    }

    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Absent => Self::RAW_ABSENT,
            Self::To(index) => index as i32,
        }
    }

    #[inline]
    pub const fn get(self) -> Option<u32> {
        match self {
            Self::Absent => None,
            Self::To(index) => Some(index),
        }
    }

    #[inline]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }

    #[inline]
    pub fn inode(self) -> Option<InodeId> {
        self.get().map(InodeId)
    }

    #[inline]
    pub fn block(self) -> Option<BlockId> {
        self.get().map(BlockId)
    }
}

impl From<Option<u32>> for Link {
    fn from(index: Option<u32>) -> Self {
        index.map_or(Self::Absent, Self::To)
    }
}

impl From<InodeId> for Link {
    fn from(id: InodeId) -> Self {
        Self::To(id.0)
    }
}

impl From<BlockId> for Link {
    fn from(id: BlockId) -> Self {
        Self::To(id.0)
    }
}

impl BinRead for Link {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let raw = i32::read_options(reader, endian, ())?;
        Self::from_raw(raw).ok_or_else(|| binrw::Error::AssertFail {
            pos,
            message: format!("invalid pointer {raw}"),
        })
    }
}

impl BinWrite for Link {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_raw().write_options(writer, endian, ())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn sentinel() {
        assert_eq!(Some(Link::Absent), Link::from_raw(-1));
        assert_eq!(Some(Link::To(7)), Link::from_raw(7));
        assert_eq!(None, Link::from_raw(-2));
        assert_eq!(-1, Link::Absent.to_raw());
        assert_eq!(Some(BlockId::new(3)), Link::To(3).block());
        assert_eq!(None, Link::Absent.inode());
    }

    #[test]
    fn rejects_garbage() {
        let mut cursor = Cursor::new((-5i32).to_le_bytes());
        assert!(Link::read_options(&mut cursor, Endian::Little, ()).is_err());
    }
}
