//! [HEADER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/c9876f5a-664b-46a3-9887-ba63f113abf5)

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::debug;

use super::{block_id::BlockId, block_ref::BlockRef, *};
use crate::crc::compute_crc;

/// `dwMagic`
///
/// ### See also
/// [Header]
const HEADER_MAGIC: u32 = u32::from_be_bytes(*b"NDB!");

const NDB_SENTINEL: u8 = 0x80;

/// Bytes read from offset 0; large enough for the 64-bit header.
pub const HEADER_SIZE: usize = 564;

/// On-disk layout family, selected from `wVer`.
///
/// ### See also
/// [Header]
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub enum NdbVersion {
    /// 32-bit ids and offsets, 512-byte pages.
    Ansi,
    /// 64-bit ids and offsets, 512-byte pages.
    #[default]
    Unicode,
    /// 64-bit ids and offsets, 4096-byte pages and optionally compressed blocks.
    Unicode4k,
}

impl TryFrom<u16> for NdbVersion {
    type Error = NdbError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x000E..=0x000F => Ok(NdbVersion::Ansi),
            0x0015..=0x0023 => Ok(NdbVersion::Unicode),
            0x0024.. => Ok(NdbVersion::Unicode4k),
            _ => Err(NdbError::InvalidNdbVersion(value)),
        }
    }
}

impl NdbVersion {
    pub fn is_ansi(self) -> bool {
        self == NdbVersion::Ansi
    }

    /// Width of a BID, IB or NBT key.
    pub fn id_size(self) -> usize {
        if self.is_ansi() {
            4
        } else {
            8
        }
    }

    pub fn page_size(self) -> usize {
        match self {
            NdbVersion::Ansi | NdbVersion::Unicode => 512,
            NdbVersion::Unicode4k => 4096,
        }
    }

    /// Size of the `rgEntries` area of a BTPAGE.
    pub fn page_entries_size(self) -> usize {
        match self {
            NdbVersion::Ansi => 496,
            NdbVersion::Unicode => 488,
            NdbVersion::Unicode4k => 4056,
        }
    }

    /// Bytes covered by the page trailer `dwCRC`: everything before the trailer.
    pub fn page_crc_size(self) -> usize {
        match self {
            NdbVersion::Ansi => 500,
            NdbVersion::Unicode => 496,
            NdbVersion::Unicode4k => 4072,
        }
    }

    pub fn block_trailer_size(self) -> usize {
        match self {
            NdbVersion::Ansi => 12,
            NdbVersion::Unicode => 16,
            NdbVersion::Unicode4k => 24,
        }
    }

    pub fn block_alignment(self) -> usize {
        match self {
            NdbVersion::Ansi | NdbVersion::Unicode => 64,
            NdbVersion::Unicode4k => 512,
        }
    }

    pub fn max_block_size(self) -> usize {
        match self {
            NdbVersion::Ansi | NdbVersion::Unicode => 8192,
            NdbVersion::Unicode4k => 65536,
        }
    }

    /// On-disk footprint of a block holding `size` bytes of data: data plus trailer, rounded up
    /// to the block alignment.
    pub fn block_size(self, size: usize) -> usize {
        let alignment = self.block_alignment();
        let total = size + self.block_trailer_size();
        total.div_ceil(alignment) * alignment
    }
}

/// `bCryptMethod`
///
/// ### See also
/// [Header]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub enum NdbCryptMethod {
    /// `NDB_CRYPT_NONE`: Data blocks are not encoded
    #[default]
    None = 0x00,
    /// `NDB_CRYPT_PERMUTE`: Encoded with the [Permutation algorithm](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5faf4800-645d-49d1-9457-2ac40eb467bd)
    Permute = 0x01,
    /// `NDB_CRYPT_CYCLIC`: Encoded with the [Cyclic algorithm](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/9979fc01-0a3e-496f-900f-a6a867951f23)
    Cyclic = 0x02,
}

impl TryFrom<u8> for NdbCryptMethod {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(NdbCryptMethod::None),
            0x01 => Ok(NdbCryptMethod::Permute),
            0x02 => Ok(NdbCryptMethod::Cyclic),
            _ => Err(NdbError::InvalidNdbCryptMethod(value)),
        }
    }
}

/// `wMagicClient`
///
/// ### See also
/// [Header]
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ContentType {
    /// Personal storage table (`.pst`)
    PersonalStorage = u16::from_be_bytes(*b"MS"),
    /// Offline storage table (`.ost`)
    OfflineStorage = u16::from_be_bytes(*b"OS"),
    /// Personal address book (`.pab`)
    PersonalAddressBook = u16::from_be_bytes(*b"AB"),
}

impl TryFrom<u16> for ContentType {
    type Error = NdbError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x4D53 => Ok(ContentType::PersonalStorage),
            0x4F53 => Ok(ContentType::OfflineStorage),
            0x4142 => Ok(ContentType::PersonalAddressBook),
            _ => Err(NdbError::InvalidNdbHeaderMagicClientValue(value)),
        }
    }
}

/// [ROOT](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/32ce8c94-4757-46c8-a169-3fd21abee584)
#[derive(Clone, Copy, Default, Debug)]
pub struct Root {
    file_eof_index: u64,
    amap_last_index: u64,
    amap_free_size: u64,
    pmap_free_size: u64,
    node_btree: BlockRef,
    block_btree: BlockRef,
    amap_is_valid: bool,
}

impl Root {
    fn read(f: &mut dyn Read, version: NdbVersion) -> io::Result<Self> {
        let read_size = |f: &mut dyn Read| -> io::Result<u64> {
            if version.is_ansi() {
                Ok(u64::from(f.read_u32::<LittleEndian>()?))
            } else {
                f.read_u64::<LittleEndian>()
            }
        };

        // dwReserved
        f.read_u32::<LittleEndian>()?;
        // ibFileEof
        let file_eof_index = read_size(f)?;
        // ibAMapLast
        let amap_last_index = read_size(f)?;
        // cbAMapFree
        let amap_free_size = read_size(f)?;
        // cbPMapFree
        let pmap_free_size = read_size(f)?;
        // BREFNBT
        let node_btree = BlockRef::read(f, version)?;
        // BREFBBT
        let block_btree = BlockRef::read(f, version)?;
        // fAMapValid
        let amap_is_valid = f.read_u8()? != 0;
        // bReserved, wReserved
        f.read_u8()?;
        f.read_u16::<LittleEndian>()?;

        Ok(Self {
            file_eof_index,
            amap_last_index,
            amap_free_size,
            pmap_free_size,
            node_btree,
            block_btree,
            amap_is_valid,
        })
    }

    /// Declared size of the file.
    pub fn file_eof_index(&self) -> u64 {
        self.file_eof_index
    }

    pub fn amap_last_index(&self) -> u64 {
        self.amap_last_index
    }

    pub fn amap_free_size(&self) -> u64 {
        self.amap_free_size
    }

    pub fn pmap_free_size(&self) -> u64 {
        self.pmap_free_size
    }

    pub fn node_btree(&self) -> &BlockRef {
        &self.node_btree
    }

    pub fn block_btree(&self) -> &BlockRef {
        &self.block_btree
    }

    pub fn amap_is_valid(&self) -> bool {
        self.amap_is_valid
    }
}

#[derive(Clone, Debug)]
pub struct Header {
    version: NdbVersion,
    raw_version: u16,
    client_version: u16,
    content_type: ContentType,
    crypt_method: NdbCryptMethod,
    next_block: BlockId,
    next_page: BlockId,
    unique: u32,
    root: Root,
}

impl Header {
    pub fn read<R: Read + Seek>(f: &mut R) -> io::Result<Self> {
        f.seek(SeekFrom::Start(0))?;
        let mut buffer = [0_u8; HEADER_SIZE];
        f.read_exact(&mut buffer)?;
        Self::parse(&buffer)
    }

    pub fn parse(buffer: &[u8; HEADER_SIZE]) -> io::Result<Self> {
        let mut cursor = Cursor::new(&buffer[..]);

        // dwMagic
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != HEADER_MAGIC {
            return Err(NdbError::InvalidNdbHeaderMagicValue(magic).into());
        }

        // dwCRCPartial
        let crc_partial = cursor.read_u32::<LittleEndian>()?;
        if crc_partial != compute_crc(0, &buffer[8..479]) {
            return Err(NdbError::InvalidNdbHeaderPartialCrc(crc_partial).into());
        }

        // wMagicClient
        let content_type = ContentType::try_from(cursor.read_u16::<LittleEndian>()?)?;

        // wVer
        let raw_version = cursor.read_u16::<LittleEndian>()?;
        let version = match NdbVersion::try_from(raw_version) {
            Ok(version) => version,
            Err(err) => Self::detect_version(buffer).ok_or(err)?,
        };

        // wVerClient
        let client_version = cursor.read_u16::<LittleEndian>()?;

        // bPlatformCreate, bPlatformAccess, dwReserved1, dwReserved2
        cursor.seek(SeekFrom::Current(10))?;

        let (next_block, next_page, unique, root, sentinel, crypt_method) = if version.is_ansi()
        {
            // bidNextB
            let next_block = BlockId::read(&mut cursor, version)?;
            // bidNextP
            let next_page = BlockId::read(&mut cursor, version)?;
            // dwUnique
            let unique = cursor.read_u32::<LittleEndian>()?;
            // rgnid
            cursor.seek(SeekFrom::Current(128))?;
            // root
            let root = Root::read(&mut cursor, version)?;
            // rgbFM, rgbFP
            cursor.seek(SeekFrom::Current(256))?;
            // bSentinel
            let sentinel = cursor.read_u8()?;
            // bCryptMethod
            let crypt_method = cursor.read_u8()?;
            (next_block, next_page, unique, root, sentinel, crypt_method)
        } else {
            // bidUnused
            cursor.seek(SeekFrom::Current(8))?;
            // bidNextP
            let next_page = BlockId::read(&mut cursor, version)?;
            // dwUnique
            let unique = cursor.read_u32::<LittleEndian>()?;
            // rgnid, qwUnused
            cursor.seek(SeekFrom::Current(136))?;
            // root
            let root = Root::read(&mut cursor, version)?;
            // dwAlign, rgbFM, rgbFP
            cursor.seek(SeekFrom::Current(260))?;
            // bSentinel
            let sentinel = cursor.read_u8()?;
            // bCryptMethod
            let crypt_method = cursor.read_u8()?;
            // rgbReserved
            cursor.read_u16::<LittleEndian>()?;
            // bidNextB
            let next_block = BlockId::read(&mut cursor, version)?;
            // dwCRCFull
            let crc_full = cursor.read_u32::<LittleEndian>()?;
            if crc_full != compute_crc(0, &buffer[8..524]) {
                return Err(NdbError::InvalidNdbHeaderFullCrc(crc_full).into());
            }
            (next_block, next_page, unique, root, sentinel, crypt_method)
        };

        if sentinel != NDB_SENTINEL {
            return Err(NdbError::InvalidNdbHeaderSentinelValue(sentinel).into());
        }
        let crypt_method = NdbCryptMethod::try_from(crypt_method)?;

        debug!(
            ?version,
            raw_version,
            ?content_type,
            ?crypt_method,
            "parsed file header"
        );

        Ok(Self {
            version,
            raw_version,
            client_version,
            content_type,
            crypt_method,
            next_block,
            next_page,
            unique,
            root,
        })
    }

    /// Versions between the ANSI and Unicode ranges are told apart by where the sentinel sits.
    fn detect_version(buffer: &[u8; HEADER_SIZE]) -> Option<NdbVersion> {
        match (buffer[460] == NDB_SENTINEL, buffer[512] == NDB_SENTINEL) {
            (true, false) => Some(NdbVersion::Ansi),
            (false, true) => Some(NdbVersion::Unicode),
            _ => None,
        }
    }

    pub fn version(&self) -> NdbVersion {
        self.version
    }

    /// `wVer` exactly as stored.
    pub fn raw_version(&self) -> u16 {
        self.raw_version
    }

    pub fn client_version(&self) -> u16 {
        self.client_version
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn crypt_method(&self) -> NdbCryptMethod {
        self.crypt_method
    }

    pub fn next_block(&self) -> BlockId {
        self.next_block
    }

    pub fn next_page(&self) -> BlockId {
        self.next_page
    }

    pub fn unique(&self) -> u32 {
        self.unique
    }

    pub fn root(&self) -> &Root {
        &self.root
    }
}
