//! ## [BTree-on-Heap (BTH)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/2dd1a95a-c8b1-4ac5-87d1-10cb8de64053)

use byteorder::{LittleEndian, ReadBytesExt};
use core::mem;

use super::{heap::*, *};

const HEAP_ID_SIZE: usize = mem::size_of::<u32>();

/// [BTHHEADER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/8e4ae05c-3c24-4103-b7e5-ffef6f244834)
#[derive(Clone, Copy, Debug)]
pub struct HeapTreeHeader {
    key_size: u8,
    entry_size: u8,
    levels: u8,
    root: HeapId,
}

impl HeapTreeHeader {
    pub fn new(key_size: u8, entry_size: u8, levels: u8, root: HeapId) -> LtpResult<Self> {
        match key_size {
            2 | 4 | 8 | 16 => {}
            invalid => {
                return Err(LtpError::InvalidHeapTreeKeySize(invalid));
            }
        }

        match entry_size {
            1..=32 => {}
            invalid => {
                return Err(LtpError::InvalidHeapTreeDataSize(invalid));
            }
        }

        Ok(Self {
            key_size,
            entry_size,
            levels,
            root,
        })
    }

    fn read(mut data: &[u8]) -> LtpResult<Self> {
        let size = data.len();
        let mut read = || -> std::io::Result<(u8, u8, u8, u8, u32)> {
            Ok((
                // bType
                data.read_u8()?,
                // cbKey
                data.read_u8()?,
                // cbEnt
                data.read_u8()?,
                // bIdxLevels
                data.read_u8()?,
                // hidRoot
                data.read_u32::<LittleEndian>()?,
            ))
        };
        let (heap_type, key_size, entry_size, levels, root) =
            read().map_err(|_| LtpError::InvalidHeapTreeRecordBlockSize(size))?;

        let heap_type = HeapNodeType::try_from(heap_type)?;
        if heap_type != HeapNodeType::Tree {
            return Err(LtpError::InvalidHeapTreeNodeType(heap_type));
        }

        Self::new(key_size, entry_size, levels, HeapId::from(root))
    }

    pub fn key_size(&self) -> u8 {
        self.key_size
    }

    pub fn entry_size(&self) -> u8 {
        self.entry_size
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    pub fn root(&self) -> HeapId {
        self.root
    }
}

/// [Leaf BTH (Data) Records](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/660db569-c8f7-4516-82ad-44709b1c667f)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapTreeLeafEntry {
    key: Vec<u8>,
    data: Vec<u8>,
}

impl HeapTreeLeafEntry {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Little-endian value of a key of up to 4 bytes.
    pub fn key_u32(&self) -> u32 {
        self.key
            .iter()
            .take(mem::size_of::<u32>())
            .rev()
            .fold(0, |value, byte| (value << 8) | u32::from(*byte))
    }
}

/// A BTH rooted at one allocation of a [HeapNode].
#[derive(Clone, Debug)]
pub struct HeapTree {
    heap: HeapNode,
    header: HeapTreeHeader,
}

impl HeapTree {
    pub fn new(heap: HeapNode, user_root: HeapId) -> LtpResult<Self> {
        let header = HeapTreeHeader::read(heap.find_entry(user_root)?)?;
        Ok(Self { heap, header })
    }

    pub fn heap(&self) -> &HeapNode {
        &self.heap
    }

    pub fn header(&self) -> &HeapTreeHeader {
        &self.header
    }

    /// Require specific record dimensions before the records are interpreted.
    pub fn expect_sizes(&self, key_size: u8, entry_size: u8) -> LtpResult<()> {
        if self.header.key_size() != key_size {
            return Err(LtpError::InvalidHeapTreeKeySize(self.header.key_size()));
        }
        if self.header.entry_size() != entry_size {
            return Err(LtpError::InvalidHeapTreeDataSize(self.header.entry_size()));
        }
        Ok(())
    }

    /// All leaf records in key order.
    pub fn entries(&self) -> LtpResult<Vec<HeapTreeLeafEntry>> {
        if self.header.root().is_empty() {
            return Ok(Default::default());
        }

        let key_size = usize::from(self.header.key_size());
        let entry_size = usize::from(self.header.entry_size());

        let mut next_level = vec![self.header.root()];
        for _ in 0..self.header.levels() {
            let mut children = Vec::new();
            for heap_id in mem::take(&mut next_level) {
                let records = self.heap.find_entry(heap_id)?;
                for record in split_records(records, key_size + HEAP_ID_SIZE)? {
                    let mut cursor = &record[key_size..];
                    let child = cursor
                        .read_u32::<LittleEndian>()
                        .map_err(|_| LtpError::InvalidHeapTreeRecordBlockSize(record.len()))?;
                    children.push(HeapId::from(child));
                }
            }
            next_level = children;
        }

        let mut results = Vec::new();
        for heap_id in next_level {
            let records = self.heap.find_entry(heap_id)?;
            for record in split_records(records, key_size + entry_size)? {
                let (key, data) = record.split_at(key_size);
                results.push(HeapTreeLeafEntry {
                    key: key.to_vec(),
                    data: data.to_vec(),
                });
            }
        }

        Ok(results)
    }

    /// Exact match on a key of the header's key size.
    pub fn find(&self, key: &[u8]) -> LtpResult<Option<HeapTreeLeafEntry>> {
        Ok(self.entries()?.into_iter().find(|entry| entry.key() == key))
    }
}

impl From<HeapTree> for HeapNode {
    fn from(value: HeapTree) -> Self {
        value.heap
    }
}

fn split_records(records: &[u8], record_size: usize) -> LtpResult<std::slice::Chunks<'_, u8>> {
    if records.len() % record_size != 0 {
        return Err(LtpError::InvalidHeapTreeRecordBlockSize(records.len()));
    }
    Ok(records.chunks(record_size))
}
