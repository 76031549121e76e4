use std::ops::Range;

use binrw::binrw;

use super::{Fit, Link, MountStatus, Name};
use crate::PART_NAME_LEN;

/// Extended Boot Record：扩展分区内逻辑分区链表的节点。
///
/// EBR 位于`start`处，逻辑分区占据`[start, start + size)`，
/// 其最前面的 [`Ebr::SIZE`] 字节就是 EBR 本身。
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ebr {
    pub mount: MountStatus,
    pub fit: Fit,

    #[br(try_map = |raw: i32| u32::try_from(raw))]
    #[bw(map = |start: &u32| *start as i32)]
    pub start: u32,

    #[br(try_map = |raw: i32| u32::try_from(raw))]
    #[bw(map = |size: &u32| *size as i32)]
    pub size: u32,

    /// 下一个 EBR 的绝对偏移
    pub next: Link,

    pub name: Name<PART_NAME_LEN>,
}

impl Ebr {
    pub const SIZE: u64 = 1 + 1 + 4 + 4 + 4 + PART_NAME_LEN as u64;

    pub fn new(fit: Fit, start: u32, size: u32, name: Name<PART_NAME_LEN>) -> Self {
        Self {
            mount: MountStatus::Unmounted,
            fit,
            start,
            size,
            next: Link::Absent,
            name,
        }
    }

    /// 新建扩展分区时写入的空链表头：大小为0、没有名字
    pub fn head(start: u32, fit: Fit) -> Self {
        Self::new(fit, start, 0, Name::default())
    }

    /// 空链表头不代表任何逻辑分区
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.size == 0 && self.name.is_empty()
    }

    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.start as u64..self.end()
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }
}
