//! [BID (Block ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/d3155aa1-ccdd-4dee-a0a9-5363ccca5352)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{
    fmt::Debug,
    io::{self, Read},
};

use super::header::NdbVersion;

/// Block ids are 32 bits wide in ANSI files and 64 bits otherwise; both are held as `u64`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u64);

impl BlockId {
    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        let value = if version.is_ansi() {
            u64::from(f.read_u32::<LittleEndian>()?)
        } else {
            f.read_u64::<LittleEndian>()?
        };
        Ok(Self(value))
    }

    /// Internal blocks hold XBLOCK/XXBLOCK/SLBLOCK/SIBLOCK structures and are never encoded.
    pub fn is_internal(&self) -> bool {
        self.0 & 0x2 == 0x2
    }

    pub fn index(&self) -> u64 {
        self.0 >> 2
    }

    /// Bit 0 is reserved for the reader and must be ignored when searching the BBT.
    pub fn search_key(&self) -> u64 {
        self.0 & !0x1
    }

    pub fn cyclic_key(&self) -> u32 {
        self.0 as u32
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_internal() { "internal" } else { "external" };
        write!(f, "BlockId {{ {kind}: 0x{:X} }}", self.index())
    }
}

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockId> for u64 {
    fn from(value: BlockId) -> Self {
        value.0
    }
}
