//! 磁盘布局常量

/// 目录块、文件块、索引块的统一大小
pub const BLOCK_SIZE: u64 = 64;

/// 索引节点中直接索引的个数
pub const DIRECT_COUNT: usize = 12;
/// 一个索引块能容纳的指针个数
pub const POINTER_COUNT: usize = 16;
/// 一个目录块能容纳的目录项个数
pub const FOLDER_ENTRIES: usize = 4;

/// 目录项名称的最大字节数
pub const NAME_LEN: usize = 12;
/// 分区名称的最大字节数
pub const PART_NAME_LEN: usize = 16;
/// 挂载 id 的最大字节数
pub const MOUNT_ID_LEN: usize = 8;

/// 每个索引节点配套的数据块数
pub const BLOCKS_PER_INODE: u32 = 3;

pub const EXT2: i32 = 2;
pub const MAGIC: i32 = 0xEF53;

/// 文件最多占用的数据块：直接索引加一级间接索引
pub const MAX_FILE_BLOCKS: usize = DIRECT_COUNT + POINTER_COUNT;

/// 格式化时创建的用户表
pub const USERS_FILE: &str = "users.txt";
pub const USERS_CONTENT: &str = "1,G,root\n1,U,root,root,123\n";

/// 挂载 id 的前缀
pub const DEFAULT_OPERATOR_ID: &str = "34";
