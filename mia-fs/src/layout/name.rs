use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};
use thiserror::Error;

/// 定长名称，不足部分以`\0`填充
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name<const N: usize>([u8; N]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name {name:?} is longer than {max} bytes")]
    TooLong { name: String, max: usize },

    #[error("name {0:?} contains a NUL byte")]
    Nul(String),
}

impl<const N: usize> Name<N> {
    pub const CAP: usize = N;

    pub fn new(name: &str) -> Result<Self, NameError> {
        let bytes = name.as_bytes();
        if bytes.len() > N {
            return Err(NameError::TooLong {
                name: name.to_owned(),
                max: N,
            });
        }
        if bytes.contains(&0) {
            return Err(NameError::Nul(name.to_owned()));
        }

        let mut raw = [0; N];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Bytes up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..len]
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// 与未填充的字符串比较，区分大小写
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        !self.is_empty() && self.as_bytes() == name.as_bytes()
    }
}

impl<const N: usize> Default for Name<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> fmt::Debug for Name<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for Name<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl<const N: usize> BinRead for Name<N> {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        <[u8; N]>::read_options(reader, endian, ()).map(Self)
    }
}

impl<const N: usize> BinWrite for Name<N> {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        self.0.write_options(writer, endian, ())
    }
}
