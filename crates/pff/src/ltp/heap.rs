//! ## [HN (Heap-on-Node)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/77ce49a3-3772-4d8d-bb2c-2f7520a238a6)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{fmt::Debug, io::Cursor, rc::Rc};

use super::*;
use crate::ndb::block::DecodedBlock;

const HEAP_SIGNATURE: u8 = 0xEC;

/// [HID](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/85b9e985-ea53-447f-b70c-eb82bfbdcbc9)
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapId(u32);

impl HeapId {
    /// `index` is the 1-based allocation index within block `block_index`.
    pub fn new(index: u16, block_index: u16) -> LtpResult<Self> {
        if index == 0 || index > 0x7FF {
            return Err(LtpError::InvalidHeapIndex(index));
        }
        Ok(Self((u32::from(block_index) << 16) | (u32::from(index) << 5)))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// 0-based index into the page map of the containing block.
    pub fn index(&self) -> LtpResult<u16> {
        let id_type = (self.0 & 0x1F) as u8;
        if id_type != 0 {
            return Err(LtpError::InvalidHeapNodeType(id_type));
        }
        let index = ((self.0 >> 5) & 0x7FF) as u16;
        if index < 1 {
            return Err(LtpError::InvalidHeapIndex(index));
        }
        Ok(index - 1)
    }

    pub fn block_index(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl Debug for HeapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeapId {{ block: {}, index: {} }}",
            self.block_index(),
            (self.0 >> 5) & 0x7FF
        )
    }
}

impl From<u32> for HeapId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<HeapId> for u32 {
    fn from(value: HeapId) -> Self {
        value.0
    }
}

/// `bClientSig`
///
/// ### See also
/// [HeapNodeHeader]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HeapNodeType {
    /// `bTypeReserved1`: Reserved
    Reserved1 = 0x6C,
    /// `bTypeTC`: Table Context (TC/HN)
    Table = 0x7C,
    /// `bTypeReserved2`: Reserved
    Reserved2 = 0x8C,
    /// `bTypeReserved3`: Reserved
    Reserved3 = 0x9C,
    /// `bTypeReserved4`: Reserved
    Reserved4 = 0xA5,
    /// `bTypeReserved5`: Reserved
    Reserved5 = 0xAC,
    /// `bTypeBTH`: BTree-on-Heap (BTH)
    Tree = 0xB5,
    /// `bTypePC`: Property Context (PC/BTH)
    Properties = 0xBC,
    /// `bTypeReserved6`: Reserved
    Reserved6 = 0xCC,
}

impl TryFrom<u8> for HeapNodeType {
    type Error = LtpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x6C => Ok(Self::Reserved1),
            0x7C => Ok(Self::Table),
            0x8C => Ok(Self::Reserved2),
            0x9C => Ok(Self::Reserved3),
            0xA5 => Ok(Self::Reserved4),
            0xAC => Ok(Self::Reserved5),
            0xB5 => Ok(Self::Tree),
            0xBC => Ok(Self::Properties),
            0xCC => Ok(Self::Reserved6),
            _ => Err(LtpError::InvalidHeapNodeTypeSignature(value)),
        }
    }
}

/// [HNHDR](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/8e4ae05c-3c24-4103-b7e5-ffef6f244834)
#[derive(Clone, Copy, Debug)]
pub struct HeapNodeHeader {
    page_map_offset: u16,
    client_signature: HeapNodeType,
    user_root: HeapId,
    fill_levels: u32,
}

impl HeapNodeHeader {
    fn read(data: &[u8]) -> LtpResult<Self> {
        let mut cursor = Cursor::new(data);
        let mut read = || -> std::io::Result<(u16, u8, u8, u32, u32)> {
            Ok((
                // ibHnpm
                cursor.read_u16::<LittleEndian>()?,
                // bSig
                cursor.read_u8()?,
                // bClientSig
                cursor.read_u8()?,
                // hidUserRoot
                cursor.read_u32::<LittleEndian>()?,
                // rgbFillLevel
                cursor.read_u32::<LittleEndian>()?,
            ))
        };
        let (page_map_offset, signature, client_signature, user_root, fill_levels) =
            read().map_err(|_| LtpError::EmptyHeapNode)?;

        if signature != HEAP_SIGNATURE {
            return Err(LtpError::InvalidHeapNodeSignature(signature));
        }
        let client_signature = HeapNodeType::try_from(client_signature)?;

        Ok(Self {
            page_map_offset,
            client_signature,
            user_root: HeapId::from(user_root),
            fill_levels,
        })
    }

    pub fn page_map_offset(&self) -> u16 {
        self.page_map_offset
    }

    pub fn client_signature(&self) -> HeapNodeType {
        self.client_signature
    }

    pub fn user_root(&self) -> HeapId {
        self.user_root
    }

    /// Packed `rgbFillLevel` nibbles for the first 8 blocks.
    pub fn fill_levels(&self) -> u32 {
        self.fill_levels
    }
}

/// [HNPAGEMAP](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/291653c0-b347-4c5b-ba41-85ad780b4ba4)
#[derive(Clone, Default, Debug)]
pub struct HeapNodePageMap {
    offsets: Vec<u16>,
    free_count: u16,
}

impl HeapNodePageMap {
    fn read(data: &[u8], page_map_offset: u16) -> LtpResult<Self> {
        let start = usize::from(page_map_offset);
        if start + 4 > data.len() {
            return Err(LtpError::InvalidHeapPageMapOffset(page_map_offset));
        }
        let mut cursor = Cursor::new(&data[start..]);

        let mut read = || -> std::io::Result<(u16, u16, Vec<u16>)> {
            // cAlloc
            let alloc_count = cursor.read_u16::<LittleEndian>()?;
            // cFree
            let free_count = cursor.read_u16::<LittleEndian>()?;
            // rgibAlloc
            let offsets = (0..=alloc_count)
                .map(|_| cursor.read_u16::<LittleEndian>())
                .collect::<std::io::Result<Vec<_>>>()?;
            Ok((alloc_count, free_count, offsets))
        };
        let (_, free_count, offsets) =
            read().map_err(|_| LtpError::InvalidHeapPageMapOffset(page_map_offset))?;

        let mut last = 0;
        for &offset in offsets.iter() {
            if offset < last || usize::from(offset) > start {
                return Err(LtpError::InvalidHeapPageAllocOffset(offset));
            }
            last = offset;
        }

        Ok(Self {
            offsets,
            free_count,
        })
    }

    pub fn alloc_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn free_count(&self) -> u16 {
        self.free_count
    }

    /// Byte range of allocation `index` within the block.
    pub fn allocation(&self, index: u16) -> LtpResult<(usize, usize)> {
        let index = usize::from(index);
        if index >= self.alloc_count() {
            return Err(LtpError::HeapAllocIndexNotFound(index as u16));
        }
        Ok((
            usize::from(self.offsets[index]),
            usize::from(self.offsets[index + 1]),
        ))
    }
}

/// A heap spread over the data blocks of one node.
#[derive(Clone, Debug)]
pub struct HeapNode {
    blocks: Vec<Rc<DecodedBlock>>,
    header: HeapNodeHeader,
}

impl HeapNode {
    pub fn new(blocks: Vec<Rc<DecodedBlock>>) -> LtpResult<Self> {
        let first = blocks.first().ok_or(LtpError::EmptyHeapNode)?;
        let header = HeapNodeHeader::read(first.data())?;
        Ok(Self { blocks, header })
    }

    pub fn header(&self) -> &HeapNodeHeader {
        &self.header
    }

    /// Require the heap to carry a specific client structure.
    pub fn expect_type(&self, client_signature: HeapNodeType) -> LtpResult<()> {
        if self.header.client_signature() != client_signature {
            return Err(LtpError::UnexpectedHeapNodeType(
                self.header.client_signature(),
            ));
        }
        Ok(())
    }

    fn page_map(&self, block_index: u16) -> LtpResult<(&[u8], HeapNodePageMap)> {
        let block = self
            .blocks
            .get(usize::from(block_index))
            .ok_or(LtpError::HeapBlockIndexNotFound(block_index))?;
        let data = block.data();

        let page_map_offset = if block_index == 0 {
            self.header.page_map_offset()
        } else {
            // Both [HNPAGEHDR](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/9c34ecf8-36bc-45a1-a2df-ee35c6dc840a)
            // and [HNBITMAPHDR](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/822e2327-b29d-4ec4-91be-45637a438d40)
            // start with ibHnpm
            let mut cursor = data;
            cursor
                .read_u16::<LittleEndian>()
                .map_err(|_| LtpError::HeapBlockIndexNotFound(block_index))?
        };

        let page_map = HeapNodePageMap::read(data, page_map_offset)?;
        Ok((data, page_map))
    }

    pub fn find_entry(&self, heap_id: HeapId) -> LtpResult<&[u8]> {
        let index = heap_id.index()?;
        let (data, page_map) = self.page_map(heap_id.block_index())?;
        let (start, end) = page_map.allocation(index)?;
        Ok(&data[start..end])
    }

    /// Number of allocations in block `block_index`.
    pub fn alloc_count(&self, block_index: u16) -> LtpResult<usize> {
        self.page_map(block_index).map(|(_, page_map)| page_map.alloc_count())
    }
}
