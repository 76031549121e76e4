/* mia-fs 的整体架构，自上而下 */

// 目录树层：路径解析、创建目录与文件、读取文件
pub mod tree;

// 格式化：在已挂载的分区上建立文件系统
pub mod mkfs;
pub use mkfs::{mkfs, FormatKind};

// 卷层：已格式化的分区，负责索引节点与数据块的分配
mod volume;
pub use volume::Volume;

// 位图层
pub mod bitmap;

// 挂载表：进程内的挂载登记
mod mount;
pub use mount::{MountEntry, MountTable};

// 分区表层：MBR 槽位与 EBR 链表
pub mod partition;
pub use partition::{fdisk, FdiskRequest, PartitionType};

// 磁盘层：虚拟磁盘的创建与删除
pub mod disk;
pub use disk::{mkdisk, rmdisk, SizeUnit};

// 磁盘数据结构层
pub mod layout;

mod config;
pub use config::*;

mod error;
pub use error::{FsError, ParseValueError, Result};

pub use disk_image::{DiskImage, ImageError};

/// 当前 Unix 时间（秒）
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// 打开已挂载且已格式化的分区
pub fn open_volume(table: &MountTable, id: &str) -> Result<Volume> {
    let (image, partition) = table.resolve(id)?;
    Volume::open(image, &partition)
}
