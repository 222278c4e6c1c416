//! ## [Node Database (NDB) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e4efaad0-1876-446e-9d34-bb921588f924)

use std::io;
use thiserror::Error;

pub mod block;
pub mod block_id;
pub mod block_ref;
pub mod byte_index;
pub mod database;
pub mod header;
pub mod node_id;
pub mod page;
pub mod recover;
pub mod source;

use block_id::BlockId;
use node_id::NodeId;
use page::PageType;

#[derive(Error, Debug)]
pub enum NdbError {
    #[error("Invalid nidType: 0x{0:02X}")]
    InvalidNodeIdType(u8),
    #[error("Invalid HEADER dwMagic: 0x{0:08X}")]
    InvalidNdbHeaderMagicValue(u32),
    #[error("Invalid HEADER dwCRCPartial: 0x{0:08X}")]
    InvalidNdbHeaderPartialCrc(u32),
    #[error("Invalid HEADER dwCRCFull: 0x{0:08X}")]
    InvalidNdbHeaderFullCrc(u32),
    #[error("Invalid HEADER wMagicClient: 0x{0:04X}")]
    InvalidNdbHeaderMagicClientValue(u16),
    #[error("Invalid HEADER wVer: 0x{0:04X}")]
    InvalidNdbVersion(u16),
    #[error("Invalid HEADER bCryptMethod: 0x{0:02X}")]
    InvalidNdbCryptMethod(u8),
    #[error("Invalid HEADER bSentinel: 0x{0:02X}")]
    InvalidNdbHeaderSentinelValue(u8),
    #[error("ROOT ibFileEof 0x{declared:X} exceeds source size 0x{actual:X}")]
    DeclaredSizeExceedsSource { declared: u64, actual: u64 },
    #[error("Read of {size} bytes at 0x{offset:X} runs past the end of the source (0x{source_size:X})")]
    ReadBeyondEnd {
        offset: u64,
        size: usize,
        source_size: u64,
    },
    #[error("Mismatch between PAGETRAILER ptype and ptypeRepeat: (0x{0:02X}, 0x{1:02X})")]
    MismatchPageTypeRepeat(u8, u8),
    #[error("Invalid PAGETRAILER ptype: 0x{0:02X}")]
    InvalidPageType(u8),
    #[error("Invalid PAGETRAILER ptype: {0:?}")]
    UnexpectedPageType(PageType),
    #[error("Invalid PAGETRAILER dwCRC: 0x{0:08X}")]
    InvalidPageCrc(u32),
    #[error("Invalid PAGETRAILER wSig: 0x{0:04X}")]
    InvalidPageSignature(u16),
    #[error("Invalid PAGETRAILER bid: {0:?}")]
    InvalidPageBlockId(BlockId),
    #[error("Invalid BTPAGE cLevel: 0x{0:02X}")]
    InvalidBTreePageLevel(u8),
    #[error("Invalid BTPAGE cEnt: {0}")]
    InvalidBTreeEntryCount(usize),
    #[error("Invalid BTPAGE cbEnt: {0}")]
    InvalidBTreeEntrySize(u8),
    #[error("Invalid NBTENTRY nid: 0x{0:016X}")]
    InvalidNodeBTreeEntryNodeId(u64),
    #[error("Node not found in NBT: {0:?}")]
    NodeNotFound(NodeId),
    #[error("Block not found in BBT: {0:?}")]
    BlockNotFound(BlockId),
    #[error("Invalid BBTENTRY cb: 0x{0:X}")]
    InvalidBlockSize(u16),
    #[error("Invalid BLOCKTRAILER cb: 0x{0:04X}, expected 0x{1:04X}")]
    MismatchBlockSize(u16, u16),
    #[error("Invalid BLOCKTRAILER bid: {0:?}")]
    InvalidBlockTrailerId(BlockId),
    #[error("Invalid BLOCKTRAILER dwCRC: 0x{0:08X}")]
    InvalidBlockCrc(u32),
    #[error("Invalid BLOCKTRAILER wSig: 0x{0:04X}")]
    InvalidBlockSignature(u16),
    #[error("Failed to inflate block {0:?}")]
    InvalidCompressedBlock(BlockId),
    #[error("Inflated block {block:?} to {actual} bytes, expected {expected}")]
    DecompressedSizeMismatch {
        block: BlockId,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid internal block btype: 0x{0:02X}")]
    InvalidInternalBlockType(u8),
    #[error("Invalid internal block cLevel: 0x{0:02X}")]
    InvalidInternalBlockLevel(u8),
    #[error("Invalid internal block cEnt: {0}")]
    InvalidInternalBlockEntryCount(u16),
    #[error("Expected an internal block: {0:?}")]
    ExpectedInternalBlock(BlockId),
    #[error("Invalid XBLOCK lcbTotal: 0x{expected:X}, blocks hold 0x{actual:X}")]
    MismatchDataTreeSize { expected: u32, actual: u64 },
    #[error("Sub-node not found: {0:?}")]
    SubNodeNotFound(NodeId),
}

impl From<NdbError> for io::Error {
    fn from(err: NdbError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type NdbResult<T> = Result<T, NdbError>;

/// Failures which mean the bytes are bad, rather than the source being unreadable.
pub fn is_invalid_data(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
    )
}
