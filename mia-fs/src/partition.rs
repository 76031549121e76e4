//! # 分区表
//!
//! 主分区与扩展分区记录在 MBR 的 4 个槽位中；逻辑分区位于扩展分区内部，
//! 由 EBR 单链表串联。新建扩展分区时会在其首部写入一个空链表头。

use std::cmp::Reverse;
use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;

use disk_image::DiskImage;

use crate::disk::{read_mbr, write_mbr, SizeUnit};
use crate::error::{FsError, ParseValueError, Result};
use crate::layout::{Ebr, Fit, Link, Mbr, Name, PartKind, Partition, Slot};
use crate::PART_NAME_LEN;

/// `-type`的取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionType {
    #[default]
    Primary,
    Extended,
    Logical,
}

impl FromStr for PartitionType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "P" => Ok(Self::Primary),
            "E" => Ok(Self::Extended),
            "L" => Ok(Self::Logical),
            _ => Err(ParseValueError::new("partition type", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdiskRequest {
    pub path: PathBuf,
    pub size: u64,
    pub unit: SizeUnit,
    pub kind: PartitionType,
    pub fit: Fit,
    pub name: String,
}

impl FdiskRequest {
    /// `-unit=K -type=P -fit=WF`
    pub fn new(path: impl Into<PathBuf>, size: u64, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            unit: SizeUnit::Kilo,
            kind: PartitionType::Primary,
            fit: Fit::Worst,
            name: name.into(),
        }
    }
}

/// 新分区占据的区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub kind: PartitionType,
    pub start: u64,
    pub size: u64,
}

pub fn fdisk(req: &FdiskRequest) -> Result<Placement> {
    let size = req
        .unit
        .bytes(req.size)
        .filter(|&bytes| bytes > 0 && bytes <= i32::MAX as u64)
        .ok_or_else(|| FsError::InvalidSize(format!("{}{:?} for a partition", req.size, req.unit)))?;

    let image = DiskImage::open(&req.path)?;
    let mut mbr = read_mbr(&image)?;
    let chain = mbr
        .extended()
        .map(|extended| EbrChain::load(&image, extended))
        .transpose()?;

    let taken = mbr.partition_by_name(&req.name).is_some()
        || chain.as_ref().is_some_and(|chain| chain.find(&req.name).is_some());
    if taken {
        return Err(FsError::PartitionExists(req.name.clone()));
    }
    let name = Name::<PART_NAME_LEN>::new(&req.name)?;

    let placement = match req.kind {
        PartitionType::Primary => {
            add_to_mbr(&image, &mut mbr, PartKind::Primary, size, req.fit, name)?
        }
        PartitionType::Extended => {
            add_to_mbr(&image, &mut mbr, PartKind::Extended, size, req.fit, name)?
        }
        PartitionType::Logical => {
            let mut chain = chain.ok_or(FsError::NoExtended)?;
            chain.append(&image, size, req.fit, name)?
        }
    };
    log::info!(
        "created {:?} partition {:?} at [{}, {}) on {:?}",
        placement.kind,
        req.name,
        placement.start,
        placement.start + placement.size,
        req.path
    );

    Ok(placement)
}

fn add_to_mbr(
    image: &DiskImage,
    mbr: &mut Mbr,
    kind: PartKind,
    size: u64,
    fit: Fit,
    name: Name<PART_NAME_LEN>,
) -> Result<Placement> {
    let slot = mbr.free_slot().ok_or(FsError::NoFreeSlot)?;
    if kind == PartKind::Extended {
        if mbr.extended().is_some() {
            return Err(FsError::ExtendedExists);
        }
        if size <= Ebr::SIZE {
            return Err(FsError::InvalidSize(format!(
                "{size} bytes cannot hold an extended partition"
            )));
        }
    }

    let gaps = free_gaps(mbr);
    log::debug!("free gaps: {gaps:?}");
    let start = choose_gap(&gaps, size, fit).ok_or(FsError::NoSpace { requested: size })?;

    mbr.slots_mut()[slot] = Slot::Used(Partition::new(kind, fit, start as u32, size as u32, name));
    write_mbr(image, mbr)?;
    if kind == PartKind::Extended {
        image.write_record(start, &Ebr::head(start as u32, fit))?;
    }

    let kind = match kind {
        PartKind::Primary => PartitionType::Primary,
        PartKind::Extended => PartitionType::Extended,
    };
    Ok(Placement { kind, start, size })
}

/// MBR 之后、磁盘末尾之前未被任何槽位占用的区域，按起始地址排列
pub fn free_gaps(mbr: &Mbr) -> Vec<Range<u64>> {
    let mut used: Vec<&Partition> = mbr.partitions().map(|(_, p)| p).collect();
    used.sort_by_key(|p| p.start);

    let mut gaps = Vec::new();
    let mut cursor = Mbr::SIZE;
    for p in used {
        if p.start as u64 > cursor {
            gaps.push(cursor..p.start as u64);
        }
        cursor = cursor.max(p.end());
    }
    if cursor < mbr.size() as u64 {
        gaps.push(cursor..mbr.size() as u64);
    }

    gaps
}

/// 按策略选出能容纳`size`字节的空隙，返回其起始地址
pub fn choose_gap(gaps: &[Range<u64>], size: u64, fit: Fit) -> Option<u64> {
    let mut fitting = gaps.iter().filter(|gap| gap.end - gap.start >= size);
    let gap = match fit {
        Fit::First => fitting.next(),
        Fit::Best => fitting.min_by_key(|gap| (gap.end - gap.start, gap.start)),
        Fit::Worst => fitting.min_by_key(|gap| (Reverse(gap.end - gap.start), gap.start)),
    }?;

    Some(gap.start)
}

/// 扩展分区内的 EBR 链表，按链接顺序读入内存
#[derive(Debug, Clone)]
pub struct EbrChain {
    extended: Range<u64>,
    /// 链表头始终位于扩展分区起始处
    records: Vec<Ebr>,
}

impl EbrChain {
    pub fn load(image: &DiskImage, extended: &Partition) -> Result<Self> {
        let range = extended.range();
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        let mut next = Some(range.start);
        while let Some(offset) = next {
            if offset < range.start || offset + Ebr::SIZE > range.end {
                return Err(FsError::Corrupted(format!(
                    "EBR at {offset} lies outside the extended partition {range:?}"
                )));
            }
            if !seen.insert(offset) {
                return Err(FsError::Corrupted(format!("EBR chain loops back to {offset}")));
            }

            let ebr: Ebr = image.read_record(offset)?;
            if ebr.start as u64 != offset {
                return Err(FsError::Corrupted(format!(
                    "EBR at {offset} claims to start at {}",
                    ebr.start
                )));
            }
            if ebr.end() > range.end {
                return Err(FsError::Corrupted(format!(
                    "logical partition {:?} ends past the extended partition",
                    ebr.name
                )));
            }

            next = ebr.next.get().map(u64::from);
            records.push(ebr);
        }
        log::trace!("loaded {} EBRs from {range:?}", records.len());

        Ok(Self {
            extended: range,
            records,
        })
    }

    /// 逻辑分区，不含空链表头
    pub fn iter(&self) -> impl Iterator<Item = &Ebr> {
        self.records.iter().filter(|ebr| !ebr.is_placeholder())
    }

    pub fn find(&self, name: &str) -> Option<&Ebr> {
        self.iter().find(|ebr| ebr.name.matches(name))
    }

    #[inline]
    pub fn extended(&self) -> Range<u64> {
        self.extended.clone()
    }

    fn is_vacant(&self) -> bool {
        self.iter().next().is_none()
    }

    /// 新逻辑分区的起始地址
    pub fn next_start(&self) -> u64 {
        match self.records.last() {
            Some(tail) if !self.is_vacant() => tail.end(),
            _ => self.extended.start,
        }
    }

    /// 在链尾追加逻辑分区；链表为空时覆盖链表头
    pub fn append(
        &mut self,
        image: &DiskImage,
        size: u64,
        fit: Fit,
        name: Name<PART_NAME_LEN>,
    ) -> Result<Placement> {
        if size <= Ebr::SIZE {
            return Err(FsError::InvalidSize(format!(
                "{size} bytes cannot hold a logical partition"
            )));
        }
        let start = self.next_start();
        if start + size > self.extended.end {
            return Err(FsError::NoSpace { requested: size });
        }

        let ebr = Ebr::new(fit, start as u32, size as u32, name);
        image.write_record(start, &ebr)?;
        if self.is_vacant() {
            self.records.clear();
        } else if let Some(tail) = self.records.last_mut() {
            tail.next = Link::To(start as u32);
            image.write_record(tail.start as u64, &*tail)?;
        }
        self.records.push(ebr);

        Ok(Placement {
            kind: PartitionType::Logical,
            start,
            size,
        })
    }
}

/// 磁盘空间占用，用于报表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

pub fn disk_usage(mbr: &Mbr) -> DiskUsage {
    let total = mbr.size() as u64;
    let used = Mbr::SIZE + mbr.partitions().map(|(_, p)| p.size as u64).sum::<u64>();

    DiskUsage {
        total,
        used,
        free: total.saturating_sub(used),
    }
}
