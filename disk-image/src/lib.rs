//! 虚拟磁盘镜像：一个定长的普通文件，按绝对字节偏移寻址。
//!
//! Every access is scoped: open, seek, transfer, close. No handle outlives a
//! call, so whatever one command writes is visible to the next one that reads
//! the same path.

mod error;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use binrw::{BinRead, BinWrite, Endian};

pub use self::error::{ImageError, Result};

/// Extension carried by every disk image file.
pub const EXTENSION: &str = "mia";

/// Chunk used when filling large regions.
const FILL_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskImage {
    path: PathBuf,
}

impl DiskImage {
    /// Creates a zero-filled image of exactly `size` bytes.
    /// Missing parent directories are created on the way.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref();
        if size == 0 {
            return Err(ImageError::InvalidSize(size));
        }
        if path.exists() {
            return Err(ImageError::AlreadyExists(path.to_owned()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let fd = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        fd.set_len(size)?;
        log::debug!("created disk image {path:?} of {size} bytes");

        Ok(Self {
            path: path.to_owned(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ImageError::NotFound(path.to_owned()));
        }

        Ok(Self {
            path: path.to_owned(),
        })
    }

    /// Deletes a whole image. Only files carrying [`EXTENSION`] are touched.
    pub fn remove(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !has_extension(path) {
            return Err(ImageError::BadExtension(path.to_owned()));
        }
        if !path.is_file() {
            return Err(ImageError::NotFound(path.to_owned()));
        }

        fs::remove_file(path)?;
        log::debug!("removed disk image {path:?}");
        Ok(())
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ImageError::NotFound(self.path.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len() as u64)?;
        let mut file = self.open_with(OpenOptions::new().read(true))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len() as u64)?;
        let mut file = self.open_with(OpenOptions::new().write(true))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Overwrites `[offset, offset + len)` with `byte`.
    pub fn fill(&self, offset: u64, len: u64, byte: u8) -> Result<()> {
        self.check_range(offset, len)?;
        let mut file = self.open_with(OpenOptions::new().write(true))?;
        file.seek(SeekFrom::Start(offset))?;

        let chunk = [byte; FILL_CHUNK];
        let mut left = len;
        while left > 0 {
            let n = left.min(FILL_CHUNK as u64) as usize;
            file.write_all(&chunk[..n])?;
            left -= n as u64;
        }
        file.flush()?;
        Ok(())
    }

    /// Decodes a little-endian record starting at `offset`.
    pub fn read_record<T>(&self, offset: u64) -> Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        let len = self.len()?;
        if offset >= len {
            return Err(ImageError::OutOfBounds {
                offset,
                end: offset,
                len,
            });
        }

        let mut file = BufReader::new(self.open_with(OpenOptions::new().read(true))?);
        file.seek(SeekFrom::Start(offset))?;
        let record = T::read_options(&mut file, Endian::Little, ())?;
        Ok(record)
    }

    /// Encodes `record` little-endian at `offset`.
    /// The record is staged in memory first so a failing codec writes nothing.
    pub fn write_record<T>(&self, offset: u64, record: &T) -> Result<()>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut staged = Cursor::new(Vec::new());
        record.write_options(&mut staged, Endian::Little, ())?;
        self.write_at(offset, staged.get_ref())
    }
}

impl DiskImage {
    fn open_with(&self, options: &OpenOptions) -> Result<File> {
        options.open(&self.path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ImageError::NotFound(self.path.clone()),
            _ => err.into(),
        })
    }

    fn check_range(&self, offset: u64, count: u64) -> Result<()> {
        let len = self.len()?;
        let end = offset.saturating_add(count);
        if end > len {
            return Err(ImageError::OutOfBounds { offset, end, len });
        }
        Ok(())
    }
}

/// Whether `path` ends with `.mia`.
pub fn has_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == EXTENSION)
}
