use std::io::{Read, Seek, Write};
use std::ops::Range;
use std::str::FromStr;

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};

use super::Name;
use crate::error::ParseValueError;
use crate::{MOUNT_ID_LEN, PART_NAME_LEN};

/// 空闲空间的分配策略
#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Fit {
    /// 最小的足够空隙
    Best = b'B',
    /// 起始地址最小的足够空隙
    First = b'F',
    /// 最大的空隙
    #[default]
    Worst = b'W',
}

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MountStatus {
    #[default]
    Unmounted = b'0',
    Mounted = b'1',
}

/// MBR 中只会出现主分区和扩展分区，逻辑分区位于 EBR 链表
#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PartKind {
    Primary = b'P',
    Extended = b'E',
}

impl Fit {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'B' => Some(Self::Best),
            b'F' => Some(Self::First),
            b'W' => Some(Self::Worst),
            _ => None,
        }
    }
}

impl FromStr for Fit {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BF" => Ok(Self::Best),
            "FF" => Ok(Self::First),
            "WF" => Ok(Self::Worst),
            _ => Err(ParseValueError::new("fit", s)),
        }
    }
}

impl MountStatus {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Unmounted),
            b'1' => Some(Self::Mounted),
            _ => None,
        }
    }
}

impl PartKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'P' => Some(Self::Primary),
            b'E' => Some(Self::Extended),
            _ => None,
        }
    }
}

/// 主分区或扩展分区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub status: MountStatus,
    pub kind: PartKind,
    pub fit: Fit,
    /// 分区首字节在磁盘内的偏移
    pub start: u32,
    pub size: u32,
    pub name: Name<PART_NAME_LEN>,
    /// 挂载序号，挂载前为空
    pub correlative: Option<u32>,
    pub id: Name<MOUNT_ID_LEN>,
}

impl Partition {
    pub fn new(kind: PartKind, fit: Fit, start: u32, size: u32, name: Name<PART_NAME_LEN>) -> Self {
        Self {
            status: MountStatus::Unmounted,
            kind,
            fit,
            start,
            size,
            name,
            correlative: None,
            id: Name::default(),
        }
    }

    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.start as u64..self.end()
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.status == MountStatus::Mounted
    }

    pub fn mount(&mut self, correlative: u32, id: Name<MOUNT_ID_LEN>) {
        self.status = MountStatus::Mounted;
        self.correlative = Some(correlative);
        self.id = id;
    }
}

/// MBR 的分区槽位
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    /// 线上格式：状态/类型/策略为`N`，起始/大小/序号为`-1`
    #[default]
    Empty,
    Used(Partition),
}

impl Slot {
    pub const SIZE: u64 = 3 + 4 + 4 + PART_NAME_LEN as u64 + 4 + MOUNT_ID_LEN as u64;

    const EMPTY_MARK: u8 = b'N';

    #[inline]
    pub fn partition(&self) -> Option<&Partition> {
        match self {
            Self::Empty => None,
            Self::Used(partition) => Some(partition),
        }
    }

    #[inline]
    pub fn partition_mut(&mut self) -> Option<&mut Partition> {
        match self {
            Self::Empty => None,
            Self::Used(partition) => Some(partition),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// 槽位的线上格式，空槽位无法用带类型的字段表示
#[binrw]
struct RawSlot {
    status: u8,
    kind: u8,
    fit: u8,
    start: i32,
    size: i32,
    name: Name<PART_NAME_LEN>,
    correlative: i32,
    id: Name<MOUNT_ID_LEN>,
}

impl TryFrom<RawSlot> for Slot {
    type Error = String;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        if raw.kind == Self::EMPTY_MARK {
            return Ok(Self::Empty);
        }

        let status = MountStatus::from_byte(raw.status)
            .ok_or_else(|| format!("invalid partition status {:#04x}", raw.status))?;
        let kind = PartKind::from_byte(raw.kind)
            .ok_or_else(|| format!("invalid partition type {:#04x}", raw.kind))?;
        let fit =
            Fit::from_byte(raw.fit).ok_or_else(|| format!("invalid partition fit {:#04x}", raw.fit))?;
        let start =
            u32::try_from(raw.start).map_err(|_| format!("negative partition start {}", raw.start))?;
        let size =
            u32::try_from(raw.size).map_err(|_| format!("negative partition size {}", raw.size))?;
        let correlative = match raw.correlative {
            -1 => None,
            c => Some(u32::try_from(c).map_err(|_| format!("invalid correlative {c}"))?),
        };

        Ok(Self::Used(Partition {
            status,
            kind,
            fit,
            start,
            size,
            name: raw.name,
            correlative,
            id: raw.id,
        }))
    }
}

impl From<&Slot> for RawSlot {
    fn from(slot: &Slot) -> Self {
        match slot {
            Slot::Empty => Self {
                status: Slot::EMPTY_MARK,
                kind: Slot::EMPTY_MARK,
                fit: Slot::EMPTY_MARK,
                start: -1,
                size: -1,
                name: Name::default(),
                correlative: -1,
                id: Name::default(),
            },
            Slot::Used(p) => Self {
                status: p.status as u8,
                kind: p.kind as u8,
                fit: p.fit as u8,
                start: p.start as i32,
                size: p.size as i32,
                name: p.name,
                correlative: p.correlative.map_or(-1, |c| c as i32),
                id: p.id,
            },
        }
    }
}

impl BinRead for Slot {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let raw = RawSlot::read_options(reader, endian, ())?;
        Slot::try_from(raw).map_err(|message| binrw::Error::AssertFail { pos, message })
    }
}

impl BinWrite for Slot {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        RawSlot::from(self).write_options(writer, endian, ())
    }
}

/// Master Boot Record，位于磁盘首字节
#[binrw]
#[br(assert(
    partitions_fit(&size, &partitions),
    "partition table does not fit a disk of {} bytes",
    size
))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mbr {
    /// 磁盘字节数
    #[br(try_map = |raw: i32| u32::try_from(raw))]
    #[bw(map = |size: &u32| *size as i32)]
    size: u32,

    /// 创建时间（Unix 秒）
    created: i64,

    signature: u32,

    /// mkdisk 时指定的策略
    fit: Fit,

    partitions: [Slot; 4],
}

/// 槽位必须落在 MBR 之后、磁盘之内，互不重叠，且至多一个扩展分区
fn partitions_fit(size: &u32, slots: &[Slot; 4]) -> bool {
    let size = *size as u64;
    if size < Mbr::SIZE {
        return false;
    }

    let mut used: Vec<&Partition> = slots.iter().filter_map(Slot::partition).collect();
    if used.iter().filter(|p| p.kind == PartKind::Extended).count() > 1 {
        return false;
    }
    if used.iter().any(|p| (p.start as u64) < Mbr::SIZE || p.end() > size) {
        return false;
    }

    used.sort_by_key(|p| p.start);
    used.windows(2).all(|pair| pair[0].end() <= pair[1].start as u64)
}

impl Mbr {
    pub const SIZE: u64 = 4 + 8 + 4 + 1 + 4 * Slot::SIZE;

    pub fn new(size: u32, fit: Fit) -> Self {
        Self {
            size,
            created: crate::now(),
            signature: rand::random(),
            fit,
            partitions: Default::default(),
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn created(&self) -> i64 {
        self.created
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.signature
    }

    #[inline]
    pub fn fit(&self) -> Fit {
        self.fit
    }

    #[inline]
    pub fn slots(&self) -> &[Slot; 4] {
        &self.partitions
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut [Slot; 4] {
        &mut self.partitions
    }

    /// 非空槽位及其下标
    pub fn partitions(&self) -> impl Iterator<Item = (usize, &Partition)> {
        self.partitions
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.partition().map(|p| (i, p)))
    }

    /// 线性扫描 4 个槽位，名称精确匹配（区分大小写）
    pub fn partition_by_name(&self, name: &str) -> Option<(usize, &Partition)> {
        self.partitions().find(|(_, p)| p.name.matches(name))
    }

    pub fn partition_by_id(&self, id: &str) -> Option<(usize, &Partition)> {
        self.partitions()
            .find(|(_, p)| p.is_mounted() && p.id.matches(id))
    }

    pub fn extended(&self) -> Option<&Partition> {
        self.partitions()
            .map(|(_, p)| p)
            .find(|p| p.kind == PartKind::Extended)
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.partitions.iter().position(Slot::is_empty)
    }
}
