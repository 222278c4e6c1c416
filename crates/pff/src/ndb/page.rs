//! [Pages](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5774b4f2-cdc4-453e-996a-8c8230116930)

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use super::{block_id::BlockId, block_ref::BlockRef, header::NdbVersion, node_id::NodeId, *};
use crate::{block_sig::compute_sig, crc::compute_crc};

/// `ptype`
///
/// ### See also
/// [PageTrailer]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PageType {
    /// `ptypeBBT`: Block BTree page
    BlockBTree = 0x80,
    /// `ptypeNBT`: Node BTree page
    NodeBTree = 0x81,
    /// `ptypeFMap`: Free Map page
    FreeMap = 0x82,
    /// `ptypePMap`: Allocation Page Map page
    AllocationPageMap = 0x83,
    /// `ptypeAMap`: Allocation Map page
    AllocationMap = 0x84,
    /// `ptypeFPMap`: Free Page Map page
    FreePageMap = 0x85,
    /// `ptypeDL`: Density List page
    DensityList = 0x86,
}

impl TryFrom<u8> for PageType {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x80 => Ok(PageType::BlockBTree),
            0x81 => Ok(PageType::NodeBTree),
            0x82 => Ok(PageType::FreeMap),
            0x83 => Ok(PageType::AllocationPageMap),
            0x84 => Ok(PageType::AllocationMap),
            0x85 => Ok(PageType::FreePageMap),
            0x86 => Ok(PageType::DensityList),
            _ => Err(NdbError::InvalidPageType(value)),
        }
    }
}

/// [PAGETRAILER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/f4ccb38a-930a-4db4-98df-a69c195926ba)
#[derive(Clone, Copy, Debug)]
pub struct PageTrailer {
    page_type: PageType,
    signature: u16,
    crc: u32,
    block: BlockId,
}

impl PageTrailer {
    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // ptype, ptypeRepeat
        let mut page_type = [0_u8; 2];
        f.read_exact(&mut page_type)?;
        if page_type[0] != page_type[1] {
            return Err(NdbError::MismatchPageTypeRepeat(page_type[0], page_type[1]).into());
        }
        let page_type = PageType::try_from(page_type[0])?;

        // wSig
        let signature = f.read_u16::<LittleEndian>()?;

        let (crc, block) = if version.is_ansi() {
            // bid
            let block = BlockId::read(f, version)?;
            // dwCRC
            let crc = f.read_u32::<LittleEndian>()?;
            (crc, block)
        } else {
            // dwCRC
            let crc = f.read_u32::<LittleEndian>()?;
            // bid
            let block = BlockId::read(f, version)?;
            (crc, block)
        };

        Ok(Self {
            page_type,
            signature,
            crc,
            block,
        })
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    pub fn signature(&self) -> u16 {
        self.signature
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn block_id(&self) -> BlockId {
        self.block
    }
}

/// [BTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/bc8052a3-f300-4022-be31-f0f408fffca0):
/// key of the first entry in the child page and a reference to it.
#[derive(Clone, Copy, Debug)]
pub struct IntermediateEntry {
    key: u64,
    child: BlockRef,
}

impl IntermediateEntry {
    pub fn new(key: u64, child: BlockRef) -> Self {
        Self { key, child }
    }

    pub fn size(version: NdbVersion) -> usize {
        3 * version.id_size()
    }

    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // btkey
        let key = if version.is_ansi() {
            u64::from(f.read_u32::<LittleEndian>()?)
        } else {
            f.read_u64::<LittleEndian>()?
        };
        // BREF
        let child = BlockRef::read(f, version)?;
        Ok(Self { key, child })
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn child(&self) -> BlockRef {
        self.child
    }
}

/// [NBTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/53a4b926-8ac4-45c9-9c6d-8358d951dbcd)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeBTreeEntry {
    node: NodeId,
    data: BlockId,
    sub_node: Option<BlockId>,
    parent: NodeId,
}

impl NodeBTreeEntry {
    pub fn new(node: NodeId, data: BlockId, sub_node: Option<BlockId>, parent: NodeId) -> Self {
        Self {
            node,
            data,
            sub_node,
            parent,
        }
    }

    pub fn size(version: NdbVersion) -> usize {
        if version.is_ansi() {
            16
        } else {
            32
        }
    }

    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // nid
        let node = NodeId::read(f, version)?;
        // bidData
        let data = BlockId::read(f, version)?;
        // bidSub
        let sub_node = BlockId::read(f, version)?;
        let sub_node = if sub_node.is_empty() {
            None
        } else {
            Some(sub_node)
        };
        // nidParent
        let parent = NodeId::from(f.read_u32::<LittleEndian>()?);
        if !version.is_ansi() {
            // dwPadding
            f.read_u32::<LittleEndian>()?;
        }

        Ok(Self {
            node,
            data,
            sub_node,
            parent,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn data(&self) -> BlockId {
        self.data
    }

    pub fn sub_node(&self) -> Option<BlockId> {
        self.sub_node
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }
}

/// [BBTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/53a4b926-8ac4-45c9-9c6d-8358d951dbcd)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockBTreeEntry {
    block: BlockRef,
    size: u16,
    ref_count: u16,
}

impl BlockBTreeEntry {
    pub fn new(block: BlockRef, size: u16, ref_count: u16) -> Self {
        Self {
            block,
            size,
            ref_count,
        }
    }

    pub fn size_of(version: NdbVersion) -> usize {
        if version.is_ansi() {
            12
        } else {
            24
        }
    }

    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // BREF
        let block = BlockRef::read(f, version)?;
        // cb
        let size = f.read_u16::<LittleEndian>()?;
        // cRef
        let ref_count = f.read_u16::<LittleEndian>()?;
        if !version.is_ansi() {
            // dwPadding
            f.read_u32::<LittleEndian>()?;
        }

        Ok(Self {
            block,
            size,
            ref_count,
        })
    }

    pub fn block(&self) -> BlockRef {
        self.block
    }

    /// Stored size of the block data, excluding the trailer and alignment.
    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn ref_count(&self) -> u16 {
        self.ref_count
    }
}

#[derive(Clone, Debug)]
pub enum BTreeEntries {
    Intermediate(Vec<IntermediateEntry>),
    Nodes(Vec<NodeBTreeEntry>),
    Blocks(Vec<BlockBTreeEntry>),
}

/// [BTPAGE](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4f0cd8e7-c2d0-4975-90a4-d417cfca77f8)
#[derive(Clone, Debug)]
pub struct BTreePage {
    level: u8,
    entries: BTreeEntries,
    /// NBTENTRY records left in the unused slots of a leaf NBT page.
    remnants: Vec<NodeBTreeEntry>,
    trailer: PageTrailer,
}

impl BTreePage {
    /// Parse and validate a page read from `location`.
    pub fn read(
        data: &[u8],
        version: NdbVersion,
        page_type: PageType,
        location: BlockRef,
    ) -> io::Result<Self> {
        if data.len() < version.page_size() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        let mut cursor = Cursor::new(data);
        cursor.seek(SeekFrom::Start(version.page_entries_size() as u64))?;
        let (entry_count, max_entries, entry_size, level) = if version == NdbVersion::Unicode4k {
            // cEnt
            let entry_count = usize::from(cursor.read_u16::<LittleEndian>()?);
            // cEntMax
            let max_entries = usize::from(cursor.read_u16::<LittleEndian>()?);
            // cbEnt
            let entry_size = cursor.read_u8()?;
            // cLevel
            let level = cursor.read_u8()?;
            (entry_count, max_entries, entry_size, level)
        } else {
            // cEnt
            let entry_count = usize::from(cursor.read_u8()?);
            // cEntMax
            let max_entries = usize::from(cursor.read_u8()?);
            // cbEnt
            let entry_size = cursor.read_u8()?;
            // cLevel
            let level = cursor.read_u8()?;
            (entry_count, max_entries, entry_size, level)
        };

        // pageTrailer
        cursor.seek(SeekFrom::Start(version.page_crc_size() as u64))?;
        let trailer = PageTrailer::read(&mut cursor, version)?;
        if trailer.page_type() != page_type {
            return Err(NdbError::UnexpectedPageType(trailer.page_type()).into());
        }

        let crc = compute_crc(0, &data[..version.page_crc_size()]);
        if crc != trailer.crc() {
            return Err(NdbError::InvalidPageCrc(crc).into());
        }

        if !version.is_ansi() {
            let signature = compute_sig(
                u64::from(location.index()),
                u64::from(location.block()),
            );
            if signature != trailer.signature() {
                return Err(NdbError::InvalidPageSignature(signature).into());
            }
        }

        if trailer.block_id() != location.block() {
            return Err(NdbError::InvalidPageBlockId(trailer.block_id()).into());
        }

        if level > 8 {
            return Err(NdbError::InvalidBTreePageLevel(level).into());
        }

        let expected_size = match (level, page_type) {
            (0, PageType::NodeBTree) => NodeBTreeEntry::size(version),
            (0, _) => BlockBTreeEntry::size_of(version),
            _ => IntermediateEntry::size(version),
        };
        let stride = usize::from(entry_size);
        if stride < expected_size {
            return Err(NdbError::InvalidBTreeEntrySize(entry_size).into());
        }
        if entry_count * stride > version.page_entries_size() {
            return Err(NdbError::InvalidBTreeEntryCount(entry_count).into());
        }

        // rgentries
        let entries = match (level, page_type) {
            (0, PageType::NodeBTree) => BTreeEntries::Nodes(read_entries(
                data,
                entry_count,
                stride,
                |f| NodeBTreeEntry::read(f, version),
            )?),
            (0, _) => BTreeEntries::Blocks(read_entries(data, entry_count, stride, |f| {
                BlockBTreeEntry::read(f, version)
            })?),
            _ => BTreeEntries::Intermediate(read_entries(data, entry_count, stride, |f| {
                IntermediateEntry::read(f, version)
            })?),
        };

        let remnants = match &entries {
            BTreeEntries::Nodes(_) => {
                let slots = max_entries.min(version.page_entries_size() / stride);
                read_remnants(data, entry_count..slots, stride, version)
            }
            _ => Vec::new(),
        };

        Ok(Self {
            level,
            entries,
            remnants,
            trailer,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn entries(&self) -> &BTreeEntries {
        &self.entries
    }

    /// Entries past `cEnt` which still parse. Deleting from a leaf page only lowers `cEnt`, so
    /// these are often nodes removed from the tree.
    pub fn remnants(&self) -> &[NodeBTreeEntry] {
        &self.remnants
    }

    pub fn trailer(&self) -> &PageTrailer {
        &self.trailer
    }

    /// Child page covering `key`: the last entry whose key is not greater than it.
    pub fn find_child(&self, key: u64) -> Option<BlockRef> {
        let BTreeEntries::Intermediate(entries) = &self.entries else {
            return None;
        };
        entries
            .iter()
            .take_while(|entry| entry.key() <= key)
            .last()
            .map(IntermediateEntry::child)
    }
}

fn read_entries<T>(
    data: &[u8],
    count: usize,
    stride: usize,
    read: impl Fn(&mut dyn Read) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    (0..count)
        .map(|index| {
            let start = index * stride;
            let mut entry = &data[start..start + stride];
            read(&mut entry)
        })
        .collect()
}

fn read_remnants(
    data: &[u8],
    slots: std::ops::Range<usize>,
    stride: usize,
    version: NdbVersion,
) -> Vec<NodeBTreeEntry> {
    slots
        .filter_map(|index| {
            let start = index * stride;
            let mut entry = &data[start..start + stride];
            NodeBTreeEntry::read(&mut entry, version).ok()
        })
        .filter(|entry| u32::from(entry.node()) != 0)
        .collect()
}
