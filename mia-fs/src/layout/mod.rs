//! # 磁盘数据结构层
//!
//! 磁盘布局：MBR | 分区 ... (扩展分区内部为 EBR 链表)
//!
//! 分区(格式化后)的布局：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域
//!
//! Every record has an explicit little-endian codec and a fixed `SIZE`.
//! `-1` on the wire is "no pointer"; in memory it is [`Link::Absent`] or
//! [`Slot::Empty`].

mod link;
pub use link::{BlockId, InodeId, Link};

mod name;
pub use name::{Name, NameError};

mod mbr;
pub use mbr::{Fit, Mbr, MountStatus, PartKind, Partition, Slot};

mod ebr;
pub use ebr::Ebr;

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{Access, Inode, InodeKind, Permissions, SINGLE_INDIRECT};

/// 数据块：目录块、文件块、索引块大小一致
mod block;
pub use block::{FileBlock, FolderBlock, FolderEntry, PointerBlock};
