//! 索引节点
//!
//! 15 个块指针：前 12 个为直接索引，随后依次为一级、二级、三级间接索引。
//! 目前只有一级间接索引会被用到。

use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};
use enumflags2::{bitflags, BitFlags};

use super::{BlockId, Link};
use crate::DIRECT_COUNT;

/// 一级间接索引在块指针数组中的下标
pub const SINGLE_INDIRECT: usize = DIRECT_COUNT;

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeKind {
    Folder = b'0',
    File = b'1',
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[bitflags]
#[repr(u8)]
pub enum Access {
    Exec = 0b001,
    Write = 0b010,
    Read = 0b100,
}

/// UGO 权限，线上格式为 3 个 ASCII 八进制数字，如`"664"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub owner: BitFlags<Access>,
    pub group: BitFlags<Access>,
    pub other: BitFlags<Access>,
}

impl Permissions {
    pub fn from_octal(digits: [u8; 3]) -> Option<Self> {
        let class = |digit: u8| match digit {
            b'0'..=b'7' => BitFlags::from_bits(digit - b'0').ok(),
            _ => None,
        };

        Some(Self {
            owner: class(digits[0])?,
            group: class(digits[1])?,
            other: class(digits[2])?,
        })
    }

    pub fn to_octal(self) -> [u8; 3] {
        [self.owner, self.group, self.other].map(|class| b'0' + class.bits())
    }
}

impl Default for Permissions {
    /// rw-rw-r--
    fn default() -> Self {
        Self {
            owner: Access::Read | Access::Write,
            group: Access::Read | Access::Write,
            other: Access::Read.into(),
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [o, g, t] = self.to_octal();
        write!(f, "{}{}{}", o as char, g as char, t as char)
    }
}

impl BinRead for Permissions {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let digits = <[u8; 3]>::read_options(reader, endian, ())?;
        Self::from_octal(digits).ok_or_else(|| binrw::Error::AssertFail {
            pos,
            message: format!("invalid permissions {digits:?}"),
        })
    }
}

impl BinWrite for Permissions {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_octal().write_options(writer, endian, ())
    }
}

#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub uid: i32,
    pub gid: i32,

    /// 文件内容字节数，目录恒为0
    #[br(try_map = |raw: i32| u32::try_from(raw))]
    #[bw(map = |size: &u32| *size as i32)]
    pub size: u32,

    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,

    pub block: [Link; 15],

    pub kind: InodeKind,

    pub perm: Permissions,
}

impl Inode {
    pub const SIZE: u64 = 4 * 3 + 8 * 3 + 4 * 15 + 1 + 3;

    pub fn new(kind: InodeKind, now: i64) -> Self {
        Self {
            uid: 1,
            gid: 1,
            size: 0,
            atime: now,
            ctime: now,
            mtime: now,
            block: [Link::Absent; 15],
            kind,
            perm: Permissions::default(),
        }
    }

    #[inline]
    pub fn is_folder(&self) -> bool {
        self.kind == InodeKind::Folder
    }

    /// 已使用的直接索引块
    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.block[..DIRECT_COUNT].iter().filter_map(|link| link.block())
    }

    #[inline]
    pub fn single_indirect(&self) -> Option<BlockId> {
        self.block[SINGLE_INDIRECT].block()
    }

    pub fn touch(&mut self, now: i64) {
        self.atime = now;
        self.mtime = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_permissions() {
        let perm = Permissions::from_octal(*b"764").unwrap();
        assert_eq!(Access::Read | Access::Write | Access::Exec, perm.owner);
        assert_eq!(Access::Read | Access::Write, perm.group);
        assert_eq!(BitFlags::from(Access::Read), perm.other);
        assert_eq!(*b"764", perm.to_octal());
        assert_eq!("664", Permissions::default().to_string());

        assert!(Permissions::from_octal(*b"684").is_none());
    }

    #[test]
    fn block_slots() {
        let mut inode = Inode::new(InodeKind::Folder, 0);
        inode.block[0] = Link::To(4);
        inode.block[3] = Link::To(9);
        inode.block[SINGLE_INDIRECT] = Link::To(11);

        let direct: Vec<_> = inode.direct_blocks().collect();
        assert_eq!(vec![BlockId::new(4), BlockId::new(9)], direct);
        assert_eq!(Some(BlockId::new(11)), inode.single_indirect());
    }
}
