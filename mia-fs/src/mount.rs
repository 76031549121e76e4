//! # 挂载表
//!
//! 挂载表只存在于内存，进程退出即丢失；磁盘上只留下 MBR 槽位中的挂载标记、
//! 序号与 id。挂载 id 由操作员编号、全局递增的序号与磁盘字母拼接而成，
//! 如`341A`。

use std::fs;
use std::path::{Path, PathBuf};

use disk_image::DiskImage;

use crate::disk::{read_mbr, write_mbr};
use crate::error::{FsError, Result};
use crate::layout::{Name, Partition};
use crate::MOUNT_ID_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug)]
pub struct MountTable {
    operator_id: String,
    /// 下一次挂载使用的序号
    correlative: u32,
    /// 下标即磁盘字母
    disks: Vec<PathBuf>,
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new(operator_id: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            correlative: 1,
            disks: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// 挂载顺序
    #[inline]
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &str) -> Option<&MountEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// 挂载磁盘`path`上名为`name`的分区，返回挂载 id
    pub fn mount(&mut self, path: impl AsRef<Path>, name: &str) -> Result<String> {
        let path = path.as_ref();
        let image = DiskImage::open(path)?;
        let mut mbr = read_mbr(&image)?;
        let (index, partition) =
            mbr.partition_by_name(name)
                .ok_or_else(|| FsError::PartitionNotFound {
                    path: path.to_owned(),
                    name: name.to_owned(),
                })?;

        let key = disk_key(path);
        if self.entries.iter().any(|e| e.name == name && disk_key(&e.path) == key) {
            return Err(FsError::AlreadyMounted(name.to_owned()));
        }
        if partition.is_mounted() {
            log::warn!(
                "partition {name:?} carries a stale mount id {:?}, remounting",
                partition.id.to_string()
            );
        }

        let (letter, new_disk) = match self.disks.iter().position(|disk| *disk == key) {
            Some(pos) => (pos, false),
            None => (self.disks.len(), true),
        };
        let letter = u8::try_from(letter)
            .ok()
            .filter(|&n| n < 26)
            .map(|n| (b'A' + n) as char)
            .ok_or(FsError::TooManyDisks)?;
        let id = format!("{}{}{}", self.operator_id, self.correlative, letter);
        let raw_id =
            Name::<MOUNT_ID_LEN>::new(&id).map_err(|_| FsError::MountIdTooLong(id.clone()))?;

        if let Some(slot) = mbr.slots_mut()[index].partition_mut() {
            slot.mount(self.correlative, raw_id);
        }
        write_mbr(&image, &mbr)?;

        if new_disk {
            self.disks.push(key);
        }
        self.correlative += 1;
        self.entries.push(MountEntry {
            id: id.clone(),
            path: path.to_owned(),
            name: name.to_owned(),
        });
        log::info!("mounted {name:?} of {path:?} as {id}");

        Ok(id)
    }

    /// 逐项重新读取 MBR，单项出错不影响其他项
    pub fn mounted(&self) -> impl Iterator<Item = (&MountEntry, Result<Partition>)> {
        self.entries
            .iter()
            .map(|entry| (entry, Self::reload(entry)))
    }

    /// 已挂载分区所在的磁盘与其最新的槽位
    pub fn resolve(&self, id: &str) -> Result<(DiskImage, Partition)> {
        let entry = self
            .entry(id)
            .ok_or_else(|| FsError::NotMounted(id.to_owned()))?;
        let partition = Self::reload(entry)?;
        let image = DiskImage::open(&entry.path)?;
        Ok((image, partition))
    }

    fn reload(entry: &MountEntry) -> Result<Partition> {
        let image = DiskImage::open(&entry.path)?;
        let mbr = read_mbr(&image)?;
        let (_, partition) = mbr.partition_by_id(&entry.id).ok_or_else(|| {
            FsError::Corrupted(format!(
                "{:?} no longer records mount id {}",
                entry.path, entry.id
            ))
        })?;
        if !partition.name.matches(&entry.name) {
            return Err(FsError::Corrupted(format!(
                "mount id {} now names partition {:?}, expected {:?}",
                entry.id, partition.name, entry.name
            )));
        }

        Ok(partition.clone())
    }
}

/// 同一磁盘的不同写法映射到同一字母
fn disk_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_owned())
}
