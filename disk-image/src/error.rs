use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("disk image {0:?} already exists")]
    AlreadyExists(PathBuf),

    #[error("disk image {0:?} does not exist")]
    NotFound(PathBuf),

    /// 磁盘大小必须为正
    #[error("invalid disk size: {0}")]
    InvalidSize(u64),

    #[error("{0:?} is not a disk image (expected the `.{ext}` extension)", ext = crate::EXTENSION)]
    BadExtension(PathBuf),

    /// 读写越过了镜像末尾，镜像长度在创建后不可变
    #[error("access [{offset}, {end}) exceeds the disk image of {len} bytes")]
    OutOfBounds { offset: u64, end: u64, len: u64 },

    #[error("malformed record: {0}")]
    Codec(#[from] binrw::Error),
}

pub type Result<T> = core::result::Result<T, ImageError>;
