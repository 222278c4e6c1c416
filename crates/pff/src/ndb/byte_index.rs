//! [IB (Byte Index)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/7d53d413-b492-4483-b624-4e2fa2a08cf3)

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

use super::header::NdbVersion;

/// Absolute file offset of a page or block.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteIndex(u64);

impl ByteIndex {
    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        let value = if version.is_ansi() {
            u64::from(f.read_u32::<LittleEndian>()?)
        } else {
            f.read_u64::<LittleEndian>()?
        };
        Ok(Self(value))
    }
}

impl From<u64> for ByteIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ByteIndex> for u64 {
    fn from(value: ByteIndex) -> Self {
        value.0
    }
}
