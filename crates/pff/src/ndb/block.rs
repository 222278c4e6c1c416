//! [Blocks](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/a9c1981d-d1ea-457c-b39e-dc7fb0eb95d4)

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::io::{self, Cursor, Read};
use tracing::trace;

use super::{
    block_id::BlockId,
    header::{NdbCryptMethod, NdbVersion},
    node_id::NodeId,
    page::BlockBTreeEntry,
    *,
};
use crate::{block_sig::compute_sig, crc::compute_crc, encode};

/// [BLOCKTRAILER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/a14943ef-70c2-403f-898c-5bc3747117e1)
#[derive(Clone, Copy, Debug)]
pub struct BlockTrailer {
    size: u16,
    signature: u16,
    crc: u32,
    block: BlockId,
    /// Only present in 4k-page files; 0 elsewhere.
    inflated_size: u16,
}

impl BlockTrailer {
    pub fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // cb
        let size = f.read_u16::<LittleEndian>()?;
        // wSig
        let signature = f.read_u16::<LittleEndian>()?;

        let (crc, block, inflated_size) = match version {
            NdbVersion::Ansi => {
                // bid
                let block = BlockId::read(f, version)?;
                // dwCRC
                let crc = f.read_u32::<LittleEndian>()?;
                (crc, block, 0)
            }
            NdbVersion::Unicode => {
                // dwCRC
                let crc = f.read_u32::<LittleEndian>()?;
                // bid
                let block = BlockId::read(f, version)?;
                (crc, block, 0)
            }
            NdbVersion::Unicode4k => {
                // dwCRC
                let crc = f.read_u32::<LittleEndian>()?;
                // bid
                let block = BlockId::read(f, version)?;
                // wUnknown
                f.read_u16::<LittleEndian>()?;
                // cbInflated
                let inflated_size = f.read_u16::<LittleEndian>()?;
                // dwUnknown
                f.read_u32::<LittleEndian>()?;
                (crc, block, inflated_size)
            }
        };

        Ok(Self {
            size,
            signature,
            crc,
            block,
            inflated_size,
        })
    }

    pub fn size(&self) -> u16 {
        self.size
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

    pub fn inflated_size(&self) -> u16 {
        self.inflated_size
    }

    fn is_compressed(&self) -> bool {
        self.inflated_size != 0 && self.inflated_size != self.size
    }
}

/// A block read from disk and validated against its BBT entry, before decoding.
#[derive(Clone, Debug)]
pub struct RawBlock {
    data: Vec<u8>,
    trailer: BlockTrailer,
}

impl RawBlock {
    /// Parse the on-disk footprint of `entry`: data, padding and trailer.
    pub fn read(buffer: &[u8], version: NdbVersion, entry: &BlockBTreeEntry) -> io::Result<Self> {
        let size = usize::from(entry.size());
        let footprint = version.block_size(size);
        if size == 0 || footprint > version.max_block_size() || buffer.len() < footprint {
            return Err(NdbError::InvalidBlockSize(entry.size()).into());
        }

        let trailer_offset = footprint - version.block_trailer_size();
        let mut cursor = Cursor::new(&buffer[trailer_offset..footprint]);
        let trailer = BlockTrailer::read(&mut cursor, version)?;

        if trailer.size() != entry.size() {
            return Err(NdbError::MismatchBlockSize(trailer.size(), entry.size()).into());
        }

        let location = entry.block();
        if trailer.block_id().search_key() != location.block().search_key() {
            return Err(NdbError::InvalidBlockTrailerId(trailer.block_id()).into());
        }

        let data = buffer[..size].to_vec();
        if trailer.crc() != 0 {
            let crc = compute_crc(0, &data);
            if crc != trailer.crc() {
                return Err(NdbError::InvalidBlockCrc(crc).into());
            }
        }

        let signature = compute_sig(
            u64::from(location.index()),
            u64::from(location.block()),
        );
        if signature != trailer.signature() {
            return Err(NdbError::InvalidBlockSignature(signature).into());
        }

        Ok(Self { data, trailer })
    }

    pub fn trailer(&self) -> &BlockTrailer {
        &self.trailer
    }

    /// Decrypt external blocks, then inflate them if the trailer says they are compressed.
    /// Internal blocks are returned as stored.
    pub fn decode(self, crypt_method: NdbCryptMethod) -> NdbResult<DecodedBlock> {
        let Self { mut data, trailer } = self;
        let block = trailer.block_id();

        if block.is_internal() {
            return Ok(DecodedBlock {
                data,
                stored_size: trailer.size(),
                encrypted: false,
                compressed: false,
            });
        }

        let encrypted = crypt_method != NdbCryptMethod::None;
        encode::decode_block(crypt_method, block, &mut data);

        let compressed = trailer.is_compressed();
        if compressed {
            data = inflate(block, &data, usize::from(trailer.inflated_size()))?;
        }

        trace!(?block, size = data.len(), encrypted, compressed, "decoded block");

        Ok(DecodedBlock {
            data,
            stored_size: trailer.size(),
            encrypted,
            compressed,
        })
    }
}

/// Output stops one byte past `expected`, enough to report the mismatch.
fn inflate(block: BlockId, data: &[u8], expected: usize) -> NdbResult<Vec<u8>> {
    let mut output = Vec::with_capacity(expected + 1);
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|_| NdbError::InvalidCompressedBlock(block))?;
    if output.len() != expected {
        return Err(NdbError::DecompressedSizeMismatch {
            block,
            expected,
            actual: output.len(),
        });
    }
    Ok(output)
}

/// Block contents after decryption and decompression.
#[derive(Clone, Debug, Default)]
pub struct DecodedBlock {
    data: Vec<u8>,
    stored_size: u16,
    encrypted: bool,
    compressed: bool,
}

impl DecodedBlock {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn stored_size(&self) -> u16 {
        self.stored_size
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}

impl From<Vec<u8>> for DecodedBlock {
    fn from(data: Vec<u8>) -> Self {
        Self {
            stored_size: u16::try_from(data.len()).unwrap_or(u16::MAX),
            data,
            encrypted: false,
            compressed: false,
        }
    }
}

/// `btype`
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InternalBlockType {
    /// XBLOCK or XXBLOCK
    DataTree = 0x01,
    /// SLBLOCK or SIBLOCK
    SubNodeTree = 0x02,
}

impl TryFrom<u8> for InternalBlockType {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(InternalBlockType::DataTree),
            0x02 => Ok(InternalBlockType::SubNodeTree),
            _ => Err(NdbError::InvalidInternalBlockType(value)),
        }
    }
}

/// `XBLOCK`
/// or `XXBLOCK`
#[derive(Clone, Debug)]
pub struct DataTreeBlock {
    level: u8,
    total_size: u32,
    entries: Vec<BlockId>,
}

impl DataTreeBlock {
    pub fn read(data: &[u8], version: NdbVersion) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        // btype
        let block_type = InternalBlockType::try_from(cursor.read_u8()?)?;
        if block_type != InternalBlockType::DataTree {
            return Err(NdbError::InvalidInternalBlockType(block_type as u8).into());
        }

        // cLevel
        let level = cursor.read_u8()?;
        if !(1..=2).contains(&level) {
            return Err(NdbError::InvalidInternalBlockLevel(level).into());
        }

        // cEnt
        let entry_count = cursor.read_u16::<LittleEndian>()?;
        if 8 + usize::from(entry_count) * version.id_size() > data.len() {
            return Err(NdbError::InvalidInternalBlockEntryCount(entry_count).into());
        }

        // lcbTotal
        let total_size = cursor.read_u32::<LittleEndian>()?;

        // rgbid
        let entries = (0..entry_count)
            .map(|_| BlockId::read(&mut cursor, version))
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            level,
            total_size,
            entries,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    pub fn entries(&self) -> &[BlockId] {
        &self.entries
    }
}

/// `SLENTRY`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafSubNodeEntry {
    node: NodeId,
    data: BlockId,
    sub_node: Option<BlockId>,
}

impl LeafSubNodeEntry {
    pub fn new(node: NodeId, data: BlockId, sub_node: Option<BlockId>) -> Self {
        Self {
            node,
            data,
            sub_node,
        }
    }

    fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
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

        Ok(Self {
            node,
            data,
            sub_node,
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
}

/// `SIENTRY`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntermediateSubNodeEntry {
    node: NodeId,
    block: BlockId,
}

impl IntermediateSubNodeEntry {
    fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        // nid
        let node = NodeId::read(f, version)?;
        // bid
        let block = BlockId::read(f, version)?;
        Ok(Self { node, block })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn block(&self) -> BlockId {
        self.block
    }
}

/// `SLBLOCK`
/// or `SIBLOCK`
#[derive(Clone, Debug)]
pub enum SubNodeTreeBlock {
    Leaf(Vec<LeafSubNodeEntry>),
    Intermediate(Vec<IntermediateSubNodeEntry>),
}

impl SubNodeTreeBlock {
    pub fn read(data: &[u8], version: NdbVersion) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        // btype
        let block_type = InternalBlockType::try_from(cursor.read_u8()?)?;
        if block_type != InternalBlockType::SubNodeTree {
            return Err(NdbError::InvalidInternalBlockType(block_type as u8).into());
        }

        // cLevel
        let level = cursor.read_u8()?;

        // cEnt
        let entry_count = cursor.read_u16::<LittleEndian>()?;

        let header_size = if version.is_ansi() {
            4
        } else {
            // dwPadding
            cursor.read_u32::<LittleEndian>()?;
            8
        };

        let entry_size = match level {
            0 => 3 * version.id_size(),
            1 => 2 * version.id_size(),
            _ => return Err(NdbError::InvalidInternalBlockLevel(level).into()),
        };
        if header_size + usize::from(entry_count) * entry_size > data.len() {
            return Err(NdbError::InvalidInternalBlockEntryCount(entry_count).into());
        }

        // rgentries
        if level == 0 {
            let entries = (0..entry_count)
                .map(|_| LeafSubNodeEntry::read(&mut cursor, version))
                .collect::<io::Result<Vec<_>>>()?;
            Ok(Self::Leaf(entries))
        } else {
            let entries = (0..entry_count)
                .map(|_| IntermediateSubNodeEntry::read(&mut cursor, version))
                .collect::<io::Result<Vec<_>>>()?;
            Ok(Self::Intermediate(entries))
        }
    }
}
