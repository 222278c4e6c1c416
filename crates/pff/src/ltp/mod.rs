//! ## [Lists, Tables, and Properties (LTP) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4c24c7d2-5c5a-4b99-88b2-f4b84cc293ae)

use std::io;
use thiserror::Error;

pub mod heap;
pub mod prop_context;
pub mod prop_type;
pub mod prop_value;
pub mod table_context;
pub mod tree;

#[derive(Error, Debug)]
pub enum LtpError {
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] crate::ndb::NdbError),
    #[error("Codepage error: {0}")]
    Codepage(#[from] crate::codepage::CodepageError),
    #[error("Invalid HID hidIndex: 0x{0:04X}")]
    InvalidHeapIndex(u16),
    #[error("Invalid HID hidType: 0x{0:02X}")]
    InvalidHeapNodeType(u8),
    #[error("Invalid HNHDR bSig: 0x{0:02X}")]
    InvalidHeapNodeSignature(u8),
    #[error("Invalid HNHDR bClientSig: 0x{0:02X}")]
    InvalidHeapNodeTypeSignature(u8),
    #[error("Unexpected HNHDR bClientSig: {0:?}")]
    UnexpectedHeapNodeType(heap::HeapNodeType),
    #[error("Heap-on-node has no data blocks")]
    EmptyHeapNode,
    #[error("Heap block not found: {0}")]
    HeapBlockIndexNotFound(u16),
    #[error("Invalid HNPAGEHDR ibHnpm: 0x{0:04X}")]
    InvalidHeapPageMapOffset(u16),
    #[error("Invalid HNPAGEMAP rgibAlloc entry: 0x{0:04X}")]
    InvalidHeapPageAllocOffset(u16),
    #[error("Heap allocation not found: {0}")]
    HeapAllocIndexNotFound(u16),
    #[error("Invalid BTHHEADER bType: {0:?}")]
    InvalidHeapTreeNodeType(heap::HeapNodeType),
    #[error("Invalid BTHHEADER cbKey: 0x{0:02X}")]
    InvalidHeapTreeKeySize(u8),
    #[error("Invalid BTHHEADER cbEnt: 0x{0:02X}")]
    InvalidHeapTreeDataSize(u8),
    #[error("Invalid BTH record block size: 0x{0:X}")]
    InvalidHeapTreeRecordBlockSize(usize),
    #[error("Invalid property type: 0x{0:04X}")]
    InvalidPropertyType(u16),
    #[error("Invalid {prop_type:?} value size: 0x{size:X}")]
    InvalidPropertyValueSize {
        prop_type: prop_type::PropertyType,
        size: usize,
    },
    #[error("Invalid multi-valued property offset: 0x{0:X}")]
    InvalidMultiValuePropertyOffset(usize),
    #[error("Invalid multi-valued property count: 0x{0:X}")]
    InvalidMultiValuePropertyCount(usize),
    #[error("Invalid PtypString value")]
    InvalidUnicodeString,
    #[error("Invalid PtypBoolean value: 0x{0:02X}")]
    InvalidBooleanValue(u8),
    #[error("Invalid TCINFO cCols: {0}")]
    InvalidTableContextColumnCount(usize),
    #[error("Invalid TCINFO rgib: {0:?}")]
    InvalidTableContextOffsets([u16; 4]),
    #[error("Invalid TCOLDESC ibData: 0x{0:04X}")]
    InvalidTableColumnOffset(u16),
    #[error("Invalid TCOLDESC cbData: 0x{0:02X}")]
    InvalidTableColumnSize(u8),
    #[error("Table row not found: 0x{0:08X}")]
    TableRowNotFound(u32),
    #[error("Table row index out of range: {0}")]
    TableRowIndexOutOfRange(usize),
}

impl From<LtpError> for io::Error {
    fn from(err: LtpError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type LtpResult<T> = Result<T, LtpError>;
