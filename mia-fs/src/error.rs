use std::path::PathBuf;

use disk_image::ImageError;
use thiserror::Error;

use crate::layout::NameError;

#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Parse(#[from] ParseValueError),

    /* 分区表 */
    #[error("a partition named {0:?} already exists")]
    PartitionExists(String),

    #[error("partition {name:?} not found in {path:?}")]
    PartitionNotFound { path: PathBuf, name: String },

    #[error("all 4 partition slots are in use")]
    NoFreeSlot,

    #[error("the disk already has an extended partition")]
    ExtendedExists,

    #[error("the disk has no extended partition")]
    NoExtended,

    #[error("no free region of {requested} bytes")]
    NoSpace { requested: u64 },

    #[error("invalid size: {0}")]
    InvalidSize(String),

    /* 挂载 */
    #[error("no partition is mounted as {0:?}")]
    NotMounted(String),

    #[error("partition {0:?} is already mounted")]
    AlreadyMounted(String),

    #[error("mount id {0:?} does not fit in {max} bytes", max = crate::MOUNT_ID_LEN)]
    MountIdTooLong(String),

    #[error("no disk letters left")]
    TooManyDisks,

    /* 文件系统 */
    #[error("no free {0} left")]
    Exhausted(&'static str),

    #[error("partition of {0} bytes is too small to format")]
    TooSmall(u64),

    #[error("cannot format an extended partition")]
    FormatExtended,

    #[error("partition {0:?} is not formatted: {1}")]
    NotFormatted(String, String),

    #[error("{0:?}: no such file or directory")]
    NotFound(String),

    #[error("{0:?} already exists")]
    Exists(String),

    #[error("{0:?} is not a directory")]
    NotDirectory(String),

    #[error("{0:?} is not a file")]
    NotFile(String),

    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error("directory {0:?} cannot hold more entries")]
    FolderFull(String),

    #[error("{len} bytes exceed the largest file of {max} bytes")]
    FileTooLarge { len: usize, max: usize },

    #[error("corrupted structure: {0}")]
    Corrupted(String),
}

/// 命令参数取值非法，如`-fit=XF`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} {value:?}")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseValueError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

pub type Result<T, E = FsError> = core::result::Result<T, E>;
