//! 虚拟磁盘的创建与删除

use std::path::Path;
use std::str::FromStr;

use disk_image::DiskImage;
use typed_bytesize::ByteSizeIec;

use crate::error::{FsError, ParseValueError, Result};
use crate::layout::{Fit, Mbr};

/// 命令中`-unit`的取值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Byte,
    Kilo,
    Mega,
}

impl SizeUnit {
    /// 溢出时返回`None`
    pub fn bytes(self, count: u64) -> Option<u64> {
        let unit = match self {
            Self::Byte => 1,
            Self::Kilo => ByteSizeIec::kib(1).0,
            Self::Mega => ByteSizeIec::mib(1).0,
        };
        count.checked_mul(unit)
    }
}

impl FromStr for SizeUnit {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(Self::Byte),
            "K" => Ok(Self::Kilo),
            "M" => Ok(Self::Mega),
            _ => Err(ParseValueError::new("unit", s)),
        }
    }
}

/// 创建`size * unit`字节的磁盘，并在开头写入空的 MBR。
/// 磁盘大小只能以 K 或 M 为单位。
pub fn mkdisk(path: impl AsRef<Path>, size: u64, unit: SizeUnit, fit: Fit) -> Result<DiskImage> {
    let path = path.as_ref();
    if unit == SizeUnit::Byte {
        return Err(ParseValueError::new("unit", "B").into());
    }
    let bytes = unit
        .bytes(size)
        .filter(|&bytes| bytes > Mbr::SIZE && bytes <= i32::MAX as u64)
        .ok_or_else(|| FsError::InvalidSize(format!("{size}{unit:?} for a disk")))?;

    let image = DiskImage::create(path, bytes)?;
    let mbr = Mbr::new(bytes as u32, fit);
    image.write_record(0, &mbr)?;
    log::info!("created disk {path:?}: {bytes} bytes, signature {}", mbr.signature());

    Ok(image)
}

/// 删除整个磁盘，路径必须带`.mia`后缀
pub fn rmdisk(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    DiskImage::remove(path)?;
    log::info!("removed disk {path:?}");
    Ok(())
}

/// 读取磁盘开头的 MBR
pub fn read_mbr(image: &DiskImage) -> Result<Mbr> {
    Ok(image.read_record(0)?)
}

pub fn write_mbr(image: &DiskImage, mbr: &Mbr) -> Result<()> {
    image.write_record(0, mbr)?;
    Ok(())
}
