//! [BREF](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/844a5ebf-488a-45fd-8fce-92a84d8e24a3)

use std::io::{self, Read};

use super::{block_id::BlockId, byte_index::ByteIndex, header::NdbVersion};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct BlockRef {
    block: BlockId,
    index: ByteIndex,
}

impl BlockRef {
    pub fn new(block: BlockId, index: ByteIndex) -> Self {
        Self { block, index }
    }

    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // bid
        let block = BlockId::read(f, version)?;
        // ib
        let index = ByteIndex::read(f, version)?;
        Ok(Self { block, index })
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn index(&self) -> ByteIndex {
        self.index
    }
}
