//! Writers for synthetic files, the inverse of the readers in [ndb](crate::ndb),
//! [ltp](crate::ltp) and [messaging](crate::messaging). Only the unit tests use them.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{write::ZlibEncoder, Compression};
use std::{
    collections::BTreeMap,
    io::{self, Write},
    rc::Rc,
};

use crate::{
    block_sig::compute_sig,
    crc::compute_crc,
    encode,
    ltp::{
        heap::{HeapId, HeapNodeType},
        prop_type::PropertyType,
        prop_value::{GuidValue, ObjectValue, PropertyValue, String8Value},
        table_context::{LTP_ROW_ID_PROP_ID, LTP_ROW_VERSION_PROP_ID},
    },
    messaging::{
        named_prop::{NamedPropertyName, PS_MAPI, PS_PUBLIC_STRINGS},
        tags::*,
    },
    ndb::{
        block::{DecodedBlock, LeafSubNodeEntry},
        block_id::BlockId,
        block_ref::BlockRef,
        byte_index::ByteIndex,
        header::{ContentType, NdbCryptMethod, NdbVersion, HEADER_SIZE},
        node_id::{
            NodeId, NodeIdType, NID_ATTACHMENT_TABLE, NID_MESSAGE_STORE, NID_NAME_TO_ID_MAP,
            NID_RECIPIENT_TABLE, NID_ROOT_FOLDER,
        },
        page::{BlockBTreeEntry, IntermediateEntry, NodeBTreeEntry, PageType},
    },
};

/// Largest payload a data block holds in every format.
const MAX_DATA_BLOCK_SIZE: usize = 8176;

/// Larger values and row matrices move to sub-nodes.
const MAX_HEAP_ALLOCATION: usize = 2048;

const DEFAULT_HEAP_BLOCK_CAPACITY: usize = 3580;

/// Keeps b-trees deep enough to exercise intermediate pages with a few dozen nodes.
const MAX_PAGE_ENTRIES: usize = 12;

/// Blocks start after the header and the first allocation maps.
const FIRST_BLOCK_OFFSET: u64 = 0x4400;

fn write_id(f: &mut dyn Write, version: NdbVersion, value: u64) -> io::Result<()> {
    if version.is_ansi() {
        f.write_u32::<LittleEndian>(value as u32)
    } else {
        f.write_u64::<LittleEndian>(value)
    }
}

fn write_block_ref(f: &mut dyn Write, version: NdbVersion, block_ref: BlockRef) -> io::Result<()> {
    // bid
    write_id(f, version, u64::from(block_ref.block()))?;
    // ib
    write_id(f, version, u64::from(block_ref.index()))
}

/// How [encode_block] stores a payload.
#[derive(Clone, Copy, Debug)]
pub struct BlockOptions {
    version: NdbVersion,
    crypt_method: NdbCryptMethod,
    compress: bool,
    inflated_size: Option<u16>,
    crc: bool,
}

impl BlockOptions {
    pub fn new(version: NdbVersion, crypt_method: NdbCryptMethod) -> Self {
        Self {
            version,
            crypt_method,
            compress: false,
            inflated_size: None,
            crc: true,
        }
    }

    /// Deflate the payload and record its size in `cbInflated`. Only 4k files read it.
    pub fn with_compression(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Override `cbInflated`.
    pub fn with_inflated_size(mut self, size: u16) -> Self {
        self.inflated_size = Some(size);
        self
    }

    /// Store a zero `dwCRC`, which readers skip.
    pub fn without_crc(mut self) -> Self {
        self.crc = false;
        self
    }
}

/// The on-disk footprint of a block: stored data, zero padding and trailer.
pub fn encode_block(options: &BlockOptions, block: BlockId, offset: u64, payload: &[u8]) -> Vec<u8> {
    write_block(options, block, offset, payload).expect("encode block")
}

fn write_block(
    options: &BlockOptions,
    block: BlockId,
    offset: u64,
    payload: &[u8],
) -> io::Result<Vec<u8>> {
    let version = options.version;
    let mut data = payload.to_vec();
    let mut inflated_size = 0;
    if !block.is_internal() {
        if options.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(payload)?;
            data = encoder.finish()?;
            inflated_size = payload.len() as u16;
        } else if version == NdbVersion::Unicode4k {
            inflated_size = payload.len() as u16;
        }
        encode::encode_block(options.crypt_method, block, &mut data);
    }
    if let Some(size) = options.inflated_size {
        inflated_size = size;
    }

    let size = data.len() as u16;
    let crc = if options.crc { compute_crc(0, &data) } else { 0 };
    let signature = compute_sig(offset, u64::from(block));

    let footprint = version.block_size(data.len());
    data.resize(footprint - version.block_trailer_size(), 0);

    // cb
    data.write_u16::<LittleEndian>(size)?;
    // wSig
    data.write_u16::<LittleEndian>(signature)?;
    match version {
        NdbVersion::Ansi => {
            // bid
            write_id(&mut data, version, u64::from(block))?;
            // dwCRC
            data.write_u32::<LittleEndian>(crc)?;
        }
        NdbVersion::Unicode => {
            // dwCRC
            data.write_u32::<LittleEndian>(crc)?;
            // bid
            write_id(&mut data, version, u64::from(block))?;
        }
        NdbVersion::Unicode4k => {
            // dwCRC
            data.write_u32::<LittleEndian>(crc)?;
            // bid
            write_id(&mut data, version, u64::from(block))?;
            // wUnknown
            data.write_u16::<LittleEndian>(0)?;
            // cbInflated
            data.write_u16::<LittleEndian>(inflated_size)?;
            // dwUnknown
            data.write_u32::<LittleEndian>(0)?;
        }
    }
    Ok(data)
}

/// An `XBLOCK` (`level` 1) or `XXBLOCK` (`level` 2) payload.
pub fn encode_data_tree(
    version: NdbVersion,
    level: u8,
    total_size: u32,
    blocks: &[BlockId],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + blocks.len() * version.id_size());
    // btype
    data.push(0x01);
    // cLevel
    data.push(level);
    // cEnt
    data.extend_from_slice(&(blocks.len() as u16).to_le_bytes());
    // lcbTotal
    data.extend_from_slice(&total_size.to_le_bytes());
    // rgbid
    for block in blocks {
        write_id(&mut data, version, u64::from(*block)).expect("write to Vec");
    }
    data
}

/// A leaf `SLBLOCK` payload.
pub fn encode_sub_node_tree(version: NdbVersion, entries: &[LeafSubNodeEntry]) -> Vec<u8> {
    let mut data = Vec::new();
    // btype
    data.push(0x02);
    // cLevel
    data.push(0);
    // cEnt
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    if !version.is_ansi() {
        // dwPadding
        data.extend_from_slice(&[0; 4]);
    }
    for entry in entries {
        let sub_node = entry.sub_node().map(u64::from).unwrap_or_default();
        write_id(&mut data, version, u64::from(u32::from(entry.node()))).expect("write to Vec");
        write_id(&mut data, version, u64::from(entry.data())).expect("write to Vec");
        write_id(&mut data, version, sub_node).expect("write to Vec");
    }
    data
}

/// Entries for one b-tree page.
#[derive(Clone, Copy, Debug)]
pub enum TestPage<'a> {
    Nodes(&'a [NodeBTreeEntry]),
    /// Live entries, then stale ones in the slots past `cEnt`.
    NodesWithRemnants(&'a [NodeBTreeEntry], &'a [NodeBTreeEntry]),
    Blocks(&'a [BlockBTreeEntry]),
    Intermediate(PageType, u8, &'a [IntermediateEntry]),
}

/// A complete b-tree page with its trailer, as stored at `location`.
pub fn encode_btree_page(version: NdbVersion, location: BlockRef, page: TestPage) -> Vec<u8> {
    write_btree_page(version, location, page).expect("encode page")
}

fn write_btree_page(version: NdbVersion, location: BlockRef, page: TestPage) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(version.page_size());
    let (page_type, level, entry_size, count) = match page {
        TestPage::Nodes(entries) => {
            for entry in entries {
                write_node_entry(&mut data, version, entry)?;
            }
            let size = NodeBTreeEntry::size(version);
            (PageType::NodeBTree, 0, size, entries.len())
        }
        TestPage::NodesWithRemnants(entries, remnants) => {
            let size = NodeBTreeEntry::size(version);
            assert!(
                (entries.len() + remnants.len()) * size <= version.page_entries_size(),
                "remnants overflow the page"
            );
            for entry in entries.iter().chain(remnants) {
                write_node_entry(&mut data, version, entry)?;
            }
            (PageType::NodeBTree, 0, size, entries.len())
        }
        TestPage::Blocks(entries) => {
            for entry in entries {
                write_block_entry(&mut data, version, entry)?;
            }
            let size = BlockBTreeEntry::size_of(version);
            (PageType::BlockBTree, 0, size, entries.len())
        }
        TestPage::Intermediate(page_type, level, entries) => {
            for entry in entries {
                // btkey
                write_id(&mut data, version, entry.key())?;
                write_block_ref(&mut data, version, entry.child())?;
            }
            let size = IntermediateEntry::size(version);
            (page_type, level, size, entries.len())
        }
    };

    data.resize(version.page_entries_size(), 0);
    let max_entries = version.page_entries_size() / entry_size;
    if version == NdbVersion::Unicode4k {
        // cEnt
        data.write_u16::<LittleEndian>(count as u16)?;
        // cEntMax
        data.write_u16::<LittleEndian>(max_entries as u16)?;
    } else {
        // cEnt
        data.write_u8(count as u8)?;
        // cEntMax
        data.write_u8(max_entries as u8)?;
    }
    // cbEnt
    data.write_u8(entry_size as u8)?;
    // cLevel
    data.write_u8(level)?;

    data.resize(version.page_crc_size(), 0);
    let crc = compute_crc(0, &data);
    let signature = compute_sig(u64::from(location.index()), u64::from(location.block()));

    // ptype
    data.write_u8(page_type as u8)?;
    // ptypeRepeat
    data.write_u8(page_type as u8)?;
    // wSig
    data.write_u16::<LittleEndian>(signature)?;
    if version.is_ansi() {
        // bid
        write_id(&mut data, version, u64::from(location.block()))?;
        // dwCRC
        data.write_u32::<LittleEndian>(crc)?;
    } else {
        // dwCRC
        data.write_u32::<LittleEndian>(crc)?;
        // bid
        write_id(&mut data, version, u64::from(location.block()))?;
    }
    data.resize(version.page_size(), 0);
    Ok(data)
}

fn write_node_entry(f: &mut dyn Write, version: NdbVersion, entry: &NodeBTreeEntry) -> io::Result<()> {
    // nid
    write_id(f, version, u64::from(u32::from(entry.node())))?;
    // bidData
    write_id(f, version, u64::from(entry.data()))?;
    // bidSub
    write_id(f, version, entry.sub_node().map(u64::from).unwrap_or_default())?;
    // nidParent
    f.write_u32::<LittleEndian>(u32::from(entry.parent()))?;
    if !version.is_ansi() {
        // dwPadding
        f.write_u32::<LittleEndian>(0)?;
    }
    Ok(())
}

fn write_block_entry(
    f: &mut dyn Write,
    version: NdbVersion,
    entry: &BlockBTreeEntry,
) -> io::Result<()> {
    write_block_ref(f, version, entry.block())?;
    // cb
    f.write_u16::<LittleEndian>(entry.size())?;
    // cRef
    f.write_u16::<LittleEndian>(entry.ref_count())?;
    if !version.is_ansi() {
        // dwPadding
        f.write_u32::<LittleEndian>(0)?;
    }
    Ok(())
}

fn heap_block_header_size(block_index: usize) -> usize {
    match block_index {
        0 => 12,
        index if index >= 8 && (index - 8) % 128 == 0 => 66,
        _ => 2,
    }
}

fn heap_page_map_size(allocations: usize) -> usize {
    4 + 2 * (allocations + 1)
}

/// Lays allocations out in heap-on-node blocks, starting a new block when one fills up.
#[derive(Clone, Debug)]
pub struct HeapBuilder {
    client_signature: HeapNodeType,
    block_capacity: usize,
    blocks: Vec<Vec<Vec<u8>>>,
    user_root: HeapId,
}

impl HeapBuilder {
    pub fn new(client_signature: HeapNodeType) -> Self {
        Self {
            client_signature,
            block_capacity: DEFAULT_HEAP_BLOCK_CAPACITY,
            blocks: vec![vec![]],
            user_root: HeapId::default(),
        }
    }

    pub fn with_block_capacity(mut self, capacity: usize) -> Self {
        self.block_capacity = capacity;
        self
    }

    pub fn allocate(&mut self, data: &[u8]) -> HeapId {
        let block_index = self.blocks.len() - 1;
        let current = &self.blocks[block_index];
        let used = heap_block_header_size(block_index)
            + current.iter().map(Vec::len).sum::<usize>()
            + heap_page_map_size(current.len() + 1)
            + 1;
        if !current.is_empty() && used + data.len() > self.block_capacity {
            self.blocks.push(vec![]);
        }

        let block_index = self.blocks.len() - 1;
        let allocations = &mut self.blocks[block_index];
        allocations.push(data.to_vec());
        HeapId::new(allocations.len() as u16, block_index as u16).expect("heap allocation index")
    }

    pub fn set_user_root(&mut self, user_root: HeapId) {
        self.user_root = user_root;
    }

    pub fn build_blocks(self) -> Vec<Rc<DecodedBlock>> {
        self.build_raw()
            .into_iter()
            .map(|data| Rc::new(DecodedBlock::from(data)))
            .collect()
    }

    pub fn build_raw(self) -> Vec<Vec<u8>> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, allocations)| {
                self.write_heap_block(index, allocations)
                    .expect("encode heap block")
            })
            .collect()
    }

    fn write_heap_block(&self, index: usize, allocations: &[Vec<u8>]) -> io::Result<Vec<u8>> {
        let header_size = heap_block_header_size(index);
        let mut data = vec![0_u8; header_size];
        let mut offsets = Vec::with_capacity(allocations.len() + 1);
        for allocation in allocations {
            offsets.push(data.len() as u16);
            data.extend_from_slice(allocation);
        }
        offsets.push(data.len() as u16);
        if data.len() % 2 != 0 {
            data.push(0);
        }
        let page_map = data.len() as u16;

        // cAlloc
        data.write_u16::<LittleEndian>(allocations.len() as u16)?;
        // cFree
        data.write_u16::<LittleEndian>(0)?;
        // rgibAlloc
        for offset in offsets {
            data.write_u16::<LittleEndian>(offset)?;
        }

        let mut header = Vec::with_capacity(header_size);
        // ibHnpm
        header.write_u16::<LittleEndian>(page_map)?;
        if index == 0 {
            // bSig
            header.write_u8(0xEC)?;
            // bClientSig
            header.write_u8(self.client_signature as u8)?;
            // hidUserRoot
            header.write_u32::<LittleEndian>(u32::from(self.user_root))?;
            // rgbFillLevel
            header.write_u32::<LittleEndian>(0)?;
        }
        data[..header.len()].copy_from_slice(&header);
        Ok(data)
    }
}

/// A `BTHHEADER` allocation.
pub fn encode_heap_tree_header(key_size: u8, entry_size: u8, levels: u8, root: HeapId) -> Vec<u8> {
    let mut data = vec![HeapNodeType::Tree as u8, key_size, entry_size, levels];
    data.extend_from_slice(&u32::from(root).to_le_bytes());
    data
}

fn encode_unicode(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// `ulCount`, then offsets from the start of the value, then the items.
fn encode_multiple_variable(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(items.len() as u32).to_le_bytes());
    let mut offset = 4 * (items.len() + 1);
    for item in &items {
        data.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += item.len();
    }
    for item in items {
        data.extend(item);
    }
    data
}

fn encode_value(value: &PropertyValue) -> Vec<u8> {
    match value {
        PropertyValue::Null => vec![],
        PropertyValue::Integer16(value) => value.to_le_bytes().to_vec(),
        PropertyValue::Integer32(value) | PropertyValue::ErrorCode(value) => {
            value.to_le_bytes().to_vec()
        }
        PropertyValue::Floating32(value) => value.to_le_bytes().to_vec(),
        PropertyValue::Floating64(value) | PropertyValue::FloatingTime(value) => {
            value.to_le_bytes().to_vec()
        }
        PropertyValue::Currency(value)
        | PropertyValue::Integer64(value)
        | PropertyValue::Time(value) => value.to_le_bytes().to_vec(),
        PropertyValue::Boolean(value) => vec![u8::from(*value)],
        PropertyValue::String8(value) => value.as_bytes().to_vec(),
        PropertyValue::Unicode(value) => encode_unicode(value),
        PropertyValue::Guid(value) => value.to_bytes().to_vec(),
        PropertyValue::Binary(value) => value.clone(),
        PropertyValue::Object(value) => {
            let mut data = u32::from(value.node()).to_le_bytes().to_vec();
            data.extend_from_slice(&value.size().to_le_bytes());
            data
        }
        PropertyValue::MultipleInteger16(values) => {
            values.iter().flat_map(|value| value.to_le_bytes()).collect()
        }
        PropertyValue::MultipleInteger32(values) => {
            values.iter().flat_map(|value| value.to_le_bytes()).collect()
        }
        PropertyValue::MultipleFloating32(values) => {
            values.iter().flat_map(|value| value.to_le_bytes()).collect()
        }
        PropertyValue::MultipleFloating64(values)
        | PropertyValue::MultipleFloatingTime(values) => {
            values.iter().flat_map(|value| value.to_le_bytes()).collect()
        }
        PropertyValue::MultipleCurrency(values)
        | PropertyValue::MultipleInteger64(values)
        | PropertyValue::MultipleTime(values) => {
            values.iter().flat_map(|value| value.to_le_bytes()).collect()
        }
        PropertyValue::MultipleGuid(values) => {
            values.iter().flat_map(GuidValue::to_bytes).collect()
        }
        PropertyValue::MultipleString8(values) => encode_multiple_variable(
            values.iter().map(|value| value.as_bytes().to_vec()).collect(),
        ),
        PropertyValue::MultipleUnicode(values) => {
            encode_multiple_variable(values.iter().map(|value| encode_unicode(value)).collect())
        }
        PropertyValue::MultipleBinary(values) => encode_multiple_variable(values.clone()),
    }
}

/// A heap plus the sub-nodes holding values too large for it.
struct ValueWriter {
    heap: HeapBuilder,
    sub_nodes: Vec<TestNode>,
}

impl ValueWriter {
    fn new(client_signature: HeapNodeType) -> Self {
        Self {
            heap: HeapBuilder::new(client_signature),
            sub_nodes: Vec::new(),
        }
    }

    /// HNID of the stored value.
    fn store(&mut self, data: &[u8]) -> u32 {
        if data.len() <= MAX_HEAP_ALLOCATION {
            return u32::from(self.heap.allocate(data));
        }
        self.store_chunks(TestNode::split(data))
    }

    fn store_chunks(&mut self, chunks: Vec<Vec<u8>>) -> u32 {
        let id = NodeId::new(
            NodeIdType::ListsTablesProperties,
            self.sub_nodes.len() as u32 + 1,
        );
        self.sub_nodes
            .push(TestNode::chunked(id, NodeId::default(), chunks));
        u32::from(id)
    }

    fn finish(mut self, user_root: HeapId) -> (Vec<Vec<u8>>, Vec<TestNode>) {
        self.heap.set_user_root(user_root);
        (self.heap.build_raw(), self.sub_nodes)
    }
}

/// Writes a property context node.
#[derive(Clone, Default, Debug)]
pub struct PropertyContextBuilder {
    properties: BTreeMap<u16, PropertyValue>,
}

impl PropertyContextBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, prop_id: u16, value: PropertyValue) -> Self {
        self.properties.insert(prop_id, value);
        self
    }

    pub fn build_node(&self, id: NodeId, parent: NodeId) -> TestNode {
        let mut writer = ValueWriter::new(HeapNodeType::Properties);
        let mut records = Vec::with_capacity(self.properties.len() * 8);
        for (prop_id, value) in &self.properties {
            let prop_type = value.prop_type();
            let data = encode_value(value);
            let value_hnid = if prop_type.is_inline() {
                let mut inline = [0_u8; 4];
                inline[..data.len()].copy_from_slice(&data);
                u32::from_le_bytes(inline)
            } else {
                writer.store(&data)
            };
            records.extend_from_slice(&prop_id.to_le_bytes());
            records.extend_from_slice(&u16::from(prop_type).to_le_bytes());
            records.extend_from_slice(&value_hnid.to_le_bytes());
        }

        let leaf = if records.is_empty() {
            HeapId::default()
        } else {
            writer.heap.allocate(&records)
        };
        let header = writer
            .heap
            .allocate(&encode_heap_tree_header(2, 6, 0, leaf));
        let (chunks, sub_nodes) = writer.finish(header);
        TestNode {
            id,
            parent,
            chunks,
            ansi_chunks: None,
            sub_nodes,
        }
    }
}

struct ColumnLayout {
    prop_id: u16,
    prop_type: PropertyType,
    offset: u16,
    size: u8,
    bit: u8,
    in_row: bool,
}

/// Writes a table context node. The row id and row version columns are always present.
#[derive(Clone, Debug)]
pub struct TableContextBuilder {
    columns: Vec<(u16, PropertyType)>,
    rows: Vec<(u32, Vec<(u16, PropertyValue)>)>,
}

impl TableContextBuilder {
    pub fn new(columns: &[(u16, PropertyType)]) -> Self {
        let mut all = vec![
            (LTP_ROW_ID_PROP_ID, PropertyType::Integer32),
            (LTP_ROW_VERSION_PROP_ID, PropertyType::Integer32),
        ];
        all.extend(columns.iter().copied().filter(|(prop_id, _)| {
            *prop_id != LTP_ROW_ID_PROP_ID && *prop_id != LTP_ROW_VERSION_PROP_ID
        }));
        Self {
            columns: all,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row_id: u32, values: Vec<(u16, PropertyValue)>) -> Self {
        self.rows.push((row_id, values));
        self
    }

    /// The row index records differ in width between ANSI and Unicode files, so both
    /// encodings are kept and [PstBuilder] picks one.
    pub fn build_node(&self, id: NodeId, parent: NodeId) -> TestNode {
        let (chunks, sub_nodes) = self.encode(4).expect("encode table");
        let (ansi_chunks, _) = self.encode(2).expect("encode table");
        TestNode {
            id,
            parent,
            chunks,
            ansi_chunks: Some(ansi_chunks),
            sub_nodes,
        }
    }

    /// Row id and version first, then groups of 8, 4, 2 and 1-byte cells, then the bitmap.
    fn layout(&self) -> (Vec<ColumnLayout>, [u16; 4]) {
        let cell = |prop_type: PropertyType| match prop_type.fixed_size() {
            Some(size) if !matches!(prop_type, PropertyType::Guid | PropertyType::Object) => {
                (size, true)
            }
            _ => (4, false),
        };

        let mut columns = Vec::with_capacity(self.columns.len());
        let mut offset = 0;
        let mut ends = [0; 4];
        for (group, group_size) in [4, 8, 4, 2, 1].into_iter().enumerate() {
            for (bit, (prop_id, prop_type)) in self.columns.iter().enumerate() {
                let (size, in_row) = cell(*prop_type);
                // Row id and row version lead every row.
                let leading = bit < 2;
                if (group == 0) != leading || size != group_size {
                    continue;
                }
                columns.push(ColumnLayout {
                    prop_id: *prop_id,
                    prop_type: *prop_type,
                    offset,
                    size: size as u8,
                    bit: bit as u8,
                    in_row,
                });
                offset += size as u16;
            }
            match group {
                2 => ends[0] = offset,
                3 => ends[1] = offset,
                4 => ends[2] = offset,
                _ => {}
            }
        }
        for (bit, (prop_id, prop_type)) in self.columns.iter().enumerate() {
            if cell(*prop_type).0 == 0 {
                columns.push(ColumnLayout {
                    prop_id: *prop_id,
                    prop_type: *prop_type,
                    offset: ends[2],
                    size: 0,
                    bit: bit as u8,
                    in_row: true,
                });
            }
        }
        ends[3] = ends[2] + self.columns.len().div_ceil(8) as u16;
        (columns, ends)
    }

    fn encode(&self, row_index_size: usize) -> io::Result<(Vec<Vec<u8>>, Vec<TestNode>)> {
        let (mut columns, ends) = self.layout();
        let row_size = usize::from(ends[3]);
        let bitmap = usize::from(ends[2]);
        let mut writer = ValueWriter::new(HeapNodeType::Table);

        let mut matrix = Vec::with_capacity(row_size * self.rows.len());
        for (row_id, values) in &self.rows {
            let mut row = vec![0_u8; row_size];
            let cells = [
                (LTP_ROW_ID_PROP_ID, PropertyValue::Integer32(*row_id as i32)),
                (LTP_ROW_VERSION_PROP_ID, PropertyValue::Integer32(1)),
            ];
            for (prop_id, value) in cells.iter().chain(values.iter()) {
                let column = columns
                    .iter()
                    .find(|column| column.prop_id == *prop_id)
                    .expect("value for a declared column");
                let data = encode_value(value);
                let cell = if column.in_row {
                    data
                } else {
                    writer.store(&data).to_le_bytes().to_vec()
                };
                let start = usize::from(column.offset);
                row[start..start + cell.len()].copy_from_slice(&cell);
                row[bitmap + usize::from(column.bit / 8)] |= 0x80 >> (column.bit % 8);
            }
            matrix.extend(row);
        }

        let rows = if matrix.is_empty() {
            0
        } else if matrix.len() <= MAX_HEAP_ALLOCATION {
            u32::from(writer.heap.allocate(&matrix))
        } else {
            let rows_per_block = MAX_DATA_BLOCK_SIZE / row_size;
            writer.store_chunks(
                matrix
                    .chunks(rows_per_block * row_size)
                    .map(<[u8]>::to_vec)
                    .collect(),
            )
        };

        let mut index = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, (row_id, _))| (*row_id, position))
            .collect::<Vec<_>>();
        index.sort();
        let mut records = Vec::with_capacity(index.len() * (4 + row_index_size));
        for (row_id, position) in index {
            // dwRowID
            records.write_u32::<LittleEndian>(row_id)?;
            // dwRowIndex
            if row_index_size == 2 {
                records.write_u16::<LittleEndian>(position as u16)?;
            } else {
                records.write_u32::<LittleEndian>(position as u32)?;
            }
        }
        let leaf = if records.is_empty() {
            HeapId::default()
        } else {
            writer.heap.allocate(&records)
        };
        let row_index = writer.heap.allocate(&encode_heap_tree_header(
            4,
            row_index_size as u8,
            0,
            leaf,
        ));

        columns.sort_by_key(|column| column.prop_id);
        let mut info = Vec::with_capacity(22 + 8 * columns.len());
        // bType
        info.write_u8(HeapNodeType::Table as u8)?;
        // cCols
        info.write_u8(columns.len() as u8)?;
        // rgib
        for end in ends {
            info.write_u16::<LittleEndian>(end)?;
        }
        // hidRowIndex
        info.write_u32::<LittleEndian>(u32::from(row_index))?;
        // hnidRows
        info.write_u32::<LittleEndian>(rows)?;
        // hidIndex
        info.write_u32::<LittleEndian>(0)?;
        for column in &columns {
            // tag
            info.write_u16::<LittleEndian>(u16::from(column.prop_type))?;
            info.write_u16::<LittleEndian>(column.prop_id)?;
            // ibData
            info.write_u16::<LittleEndian>(column.offset)?;
            // cbData
            info.write_u8(column.size)?;
            // iBit
            info.write_u8(column.bit)?;
        }
        let root = writer.heap.allocate(&info);
        Ok(writer.finish(root))
    }
}

/// A node or sub-node with its data already split into blocks.
#[derive(Clone, Debug)]
pub struct TestNode {
    id: NodeId,
    parent: NodeId,
    chunks: Vec<Vec<u8>>,
    ansi_chunks: Option<Vec<Vec<u8>>>,
    sub_nodes: Vec<TestNode>,
}

impl TestNode {
    /// Empty `data` gets no data block.
    pub fn raw(id: NodeId, parent: NodeId, data: Vec<u8>) -> Self {
        Self::chunked(id, parent, Self::split(&data))
    }

    fn chunked(id: NodeId, parent: NodeId, chunks: Vec<Vec<u8>>) -> Self {
        Self {
            id,
            parent,
            chunks,
            ansi_chunks: None,
            sub_nodes: Vec::new(),
        }
    }

    fn split(data: &[u8]) -> Vec<Vec<u8>> {
        data.chunks(MAX_DATA_BLOCK_SIZE).map(<[u8]>::to_vec).collect()
    }

    pub fn with_sub_node(mut self, node: TestNode) -> Self {
        self.sub_nodes.push(node);
        self
    }

    fn chunks(&self, version: NdbVersion) -> &[Vec<u8>] {
        match &self.ansi_chunks {
            Some(chunks) if version.is_ansi() => chunks,
            _ => &self.chunks,
        }
    }
}

/// Assembles a whole file: header, blocks, then both b-trees.
#[derive(Clone, Debug)]
pub struct PstBuilder {
    version: NdbVersion,
    crypt_method: NdbCryptMethod,
    file_eof_slack: u64,
    nodes: Vec<TestNode>,
    deleted_nodes: Vec<TestNode>,
}

impl Default for PstBuilder {
    fn default() -> Self {
        Self::new(NdbVersion::default(), NdbCryptMethod::default())
    }
}

impl PstBuilder {
    /// Starts with the fixture store, folders and message.
    pub fn new(version: NdbVersion, crypt_method: NdbCryptMethod) -> Self {
        Self {
            version,
            crypt_method,
            file_eof_slack: 0,
            nodes: fixture_nodes(),
            deleted_nodes: Vec::new(),
        }
    }

    pub fn without_messaging(mut self) -> Self {
        self.nodes.clear();
        self
    }

    /// Declare an `ibFileEof` this many bytes past the end of the data.
    pub fn with_file_eof_slack(mut self, slack: u64) -> Self {
        self.file_eof_slack = slack;
        self
    }

    pub fn add_node(&mut self, node: TestNode) {
        self.nodes.push(node);
    }

    /// Write the node's blocks but leave them out of the BBT, and leave its NBT entry past
    /// `cEnt` in the last leaf page, the way a deletion does.
    pub fn add_deleted_node(&mut self, node: TestNode) {
        self.deleted_nodes.push(node);
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_file().into_data()
    }

    pub fn build_file(&self) -> TestFile {
        let mut writer = FileWriter::new(self.version, self.crypt_method);
        let mut entries = self
            .nodes
            .iter()
            .map(|node| writer.write_node(node))
            .collect::<Vec<_>>();
        entries.sort_by_key(NodeBTreeEntry::node);

        let live_blocks = writer.blocks.len();
        let mut deleted = self
            .deleted_nodes
            .iter()
            .map(|node| writer.write_node(node))
            .collect::<Vec<_>>();
        deleted.sort_by_key(NodeBTreeEntry::node);

        let locations = writer
            .blocks
            .iter()
            .map(|entry| {
                let location = (u64::from(entry.block().index()), entry.size());
                (entry.block().block(), location)
            })
            .collect::<BTreeMap<_, _>>();
        let data_blocks = entries
            .iter()
            .chain(&deleted)
            .filter_map(|entry| Some((entry.node(), *locations.get(&entry.data())?)))
            .collect();
        let sub_node_blocks = entries
            .iter()
            .chain(&deleted)
            .filter_map(|entry| Some((entry.node(), *locations.get(&entry.sub_node()?)?)))
            .collect();
        writer.blocks.truncate(live_blocks);

        let data = writer
            .finish(&entries, &deleted, self.file_eof_slack)
            .expect("encode file");
        TestFile {
            version: self.version,
            data,
            data_blocks,
            sub_node_blocks,
        }
    }
}

/// Output of [PstBuilder::build_file].
#[derive(Debug)]
pub struct TestFile {
    version: NdbVersion,
    data: Vec<u8>,
    data_blocks: BTreeMap<NodeId, (u64, u16)>,
    sub_node_blocks: BTreeMap<NodeId, (u64, u16)>,
}

impl TestFile {
    /// File offset of the block `bidData` names for `node`.
    pub fn data_block_offset(&self, node: NodeId) -> Option<u64> {
        self.data_blocks.get(&node).map(|(offset, _)| *offset)
    }

    /// File offset of the block `bidSub` names for `node`.
    pub fn sub_node_block_offset(&self, node: NodeId) -> Option<u64> {
        self.sub_node_blocks.get(&node).map(|(offset, _)| *offset)
    }

    /// Rewrite the stored bytes of the block `bidData` names for `node`, then fix up its
    /// `dwCRC` so only the edit is wrong.
    pub fn patch_data_block(&mut self, node: NodeId, edit: impl FnOnce(&mut [u8])) {
        let (offset, size) = self.data_blocks[&node];
        let start = offset as usize;
        let end = start + usize::from(size);
        edit(&mut self.data[start..end]);

        let crc = compute_crc(0, &self.data[start..end]);
        let trailer = start + self.version.block_size(usize::from(size))
            - self.version.block_trailer_size();
        // dwCRC follows bid in ANSI trailers and wSig elsewhere.
        let crc_offset = trailer + if self.version.is_ansi() { 8 } else { 4 };
        self.data[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

struct FileWriter {
    version: NdbVersion,
    crypt_method: NdbCryptMethod,
    data: Vec<u8>,
    next_block: u64,
    next_page: u64,
    blocks: Vec<BlockBTreeEntry>,
}

impl FileWriter {
    fn new(version: NdbVersion, crypt_method: NdbCryptMethod) -> Self {
        Self {
            version,
            crypt_method,
            data: vec![0; FIRST_BLOCK_OFFSET as usize],
            next_block: 1,
            next_page: 1,
            blocks: Vec::new(),
        }
    }

    fn write_block(&mut self, payload: &[u8], internal: bool) -> BlockId {
        let block = BlockId::from(self.next_block << 2 | if internal { 0x02 } else { 0 });
        self.next_block += 1;

        let offset = self.data.len() as u64;
        let options = BlockOptions::new(self.version, self.crypt_method);
        let stored = encode_block(&options, block, offset, payload);
        let trailer = stored.len() - self.version.block_trailer_size();
        let size = u16::from_le_bytes([stored[trailer], stored[trailer + 1]]);
        self.data.extend(stored);

        let location = BlockRef::new(block, ByteIndex::from(offset));
        self.blocks.push(BlockBTreeEntry::new(location, size, 1));
        block
    }

    fn write_data(&mut self, chunks: &[Vec<u8>]) -> BlockId {
        match chunks {
            [] => BlockId::default(),
            [single] => self.write_block(single, false),
            _ => {
                let version = self.version;
                let leaves = chunks
                    .iter()
                    .map(|chunk| self.write_block(chunk, false))
                    .collect::<Vec<_>>();
                let total = chunks.iter().map(Vec::len).sum::<usize>() as u32;
                let per_block = (MAX_DATA_BLOCK_SIZE - 8) / version.id_size();
                if leaves.len() <= per_block {
                    return self.write_block(&encode_data_tree(version, 1, total, &leaves), true);
                }

                let children = chunks
                    .chunks(per_block)
                    .zip(leaves.chunks(per_block))
                    .map(|(data, blocks)| {
                        let size = data.iter().map(Vec::len).sum::<usize>() as u32;
                        self.write_block(&encode_data_tree(version, 1, size, blocks), true)
                    })
                    .collect::<Vec<_>>();
                self.write_block(&encode_data_tree(version, 2, total, &children), true)
            }
        }
    }

    fn write_sub_nodes(&mut self, nodes: &[TestNode]) -> BlockId {
        let mut entries = Vec::with_capacity(nodes.len());
        for node in nodes {
            let data = self.write_data(node.chunks(self.version));
            let sub_node = if node.sub_nodes.is_empty() {
                None
            } else {
                Some(self.write_sub_nodes(&node.sub_nodes))
            };
            entries.push(LeafSubNodeEntry::new(node.id, data, sub_node));
        }
        entries.sort_by_key(LeafSubNodeEntry::node);
        self.write_block(&encode_sub_node_tree(self.version, &entries), true)
    }

    fn write_node(&mut self, node: &TestNode) -> NodeBTreeEntry {
        let data = self.write_data(node.chunks(self.version));
        let sub_node = if node.sub_nodes.is_empty() {
            None
        } else {
            Some(self.write_sub_nodes(&node.sub_nodes))
        };
        NodeBTreeEntry::new(node.id, data, sub_node, node.parent)
    }

    fn write_page(&mut self, page: TestPage) -> BlockRef {
        let page_size = self.version.page_size();
        let start = self.data.len().div_ceil(page_size) * page_size;
        self.data.resize(start, 0);

        let block = BlockId::from(self.next_page);
        self.next_page += 1;
        let location = BlockRef::new(block, ByteIndex::from(start as u64));
        self.data
            .extend(encode_btree_page(self.version, location, page));
        location
    }

    fn write_intermediate_levels(
        &mut self,
        page_type: PageType,
        mut level: Vec<(u64, BlockRef)>,
    ) -> BlockRef {
        let mut depth = 0;
        while level.len() > 1 {
            depth += 1;
            let children = level
                .iter()
                .map(|(key, child)| IntermediateEntry::new(*key, *child))
                .collect::<Vec<_>>();
            level = children
                .chunks(MAX_PAGE_ENTRIES)
                .map(|chunk| {
                    let page = TestPage::Intermediate(page_type, depth, chunk);
                    (chunk[0].key(), self.write_page(page))
                })
                .collect();
        }
        level[0].1
    }

    fn write_node_btree(
        &mut self,
        entries: &[NodeBTreeEntry],
        remnants: &[NodeBTreeEntry],
    ) -> BlockRef {
        if entries.is_empty() {
            return self.write_page(TestPage::NodesWithRemnants(&[], remnants));
        }
        let chunks = entries.chunks(MAX_PAGE_ENTRIES).collect::<Vec<_>>();
        let last = chunks.len() - 1;
        let leaves = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let key = u64::from(u32::from(chunk[0].node()));
                let page = if index == last {
                    TestPage::NodesWithRemnants(chunk, remnants)
                } else {
                    TestPage::Nodes(chunk)
                };
                (key, self.write_page(page))
            })
            .collect();
        self.write_intermediate_levels(PageType::NodeBTree, leaves)
    }

    fn write_block_btree(&mut self) -> BlockRef {
        let mut entries = std::mem::take(&mut self.blocks);
        entries.sort_by_key(|entry| entry.block().block().search_key());
        if entries.is_empty() {
            return self.write_page(TestPage::Blocks(&[]));
        }
        let leaves = entries
            .chunks(MAX_PAGE_ENTRIES)
            .map(|chunk| {
                let key = chunk[0].block().block().search_key();
                (key, self.write_page(TestPage::Blocks(chunk)))
            })
            .collect();
        self.write_intermediate_levels(PageType::BlockBTree, leaves)
    }

    fn finish(
        mut self,
        nodes: &[NodeBTreeEntry],
        remnants: &[NodeBTreeEntry],
        file_eof_slack: u64,
    ) -> io::Result<Vec<u8>> {
        let node_btree = self.write_node_btree(nodes, remnants);
        let block_btree = self.write_block_btree();
        let file_eof = self.data.len() as u64 + file_eof_slack;

        let header = self.encode_header(node_btree, block_btree, file_eof)?;
        self.data[..header.len()].copy_from_slice(&header);
        Ok(self.data)
    }

    fn write_root(
        &self,
        f: &mut dyn Write,
        file_eof: u64,
        node_btree: BlockRef,
        block_btree: BlockRef,
    ) -> io::Result<()> {
        let version = self.version;
        // dwReserved
        f.write_u32::<LittleEndian>(0)?;
        // ibFileEof
        write_id(f, version, file_eof)?;
        // ibAMapLast
        write_id(f, version, FIRST_BLOCK_OFFSET - 0x200)?;
        // cbAMapFree
        write_id(f, version, 0)?;
        // cbPMapFree
        write_id(f, version, 0)?;
        // BREFNBT
        write_block_ref(f, version, node_btree)?;
        // BREFBBT
        write_block_ref(f, version, block_btree)?;
        // fAMapValid
        f.write_u8(0x02)?;
        // bReserved
        f.write_u8(0)?;
        // wReserved
        f.write_u16::<LittleEndian>(0)
    }

    fn encode_header(
        &self,
        node_btree: BlockRef,
        block_btree: BlockRef,
        file_eof: u64,
    ) -> io::Result<Vec<u8>> {
        let version = self.version;
        let raw_version: u16 = match version {
            NdbVersion::Ansi => 14,
            NdbVersion::Unicode => 23,
            NdbVersion::Unicode4k => 36,
        };
        let next_block = self.next_block << 2;

        let mut f = Vec::with_capacity(HEADER_SIZE);
        // dwMagic
        f.write_u32::<LittleEndian>(u32::from_be_bytes(*b"NDB!"))?;
        // dwCRCPartial
        f.write_u32::<LittleEndian>(0)?;
        // wMagicClient
        f.write_u16::<LittleEndian>(ContentType::PersonalStorage as u16)?;
        // wVer
        f.write_u16::<LittleEndian>(raw_version)?;
        // wVerClient
        f.write_u16::<LittleEndian>(19)?;
        // bPlatformCreate
        f.write_u8(0x01)?;
        // bPlatformAccess
        f.write_u8(0x01)?;
        // dwReserved1, dwReserved2
        f.write_all(&[0; 8])?;

        if version.is_ansi() {
            // bidNextB
            write_id(&mut f, version, next_block)?;
            // bidNextP
            write_id(&mut f, version, self.next_page)?;
            // dwUnique
            f.write_u32::<LittleEndian>(1)?;
            // rgnid
            f.write_all(&[0; 128])?;
            self.write_root(&mut f, file_eof, node_btree, block_btree)?;
            // rgbFM, rgbFP
            f.write_all(&[0xFF; 256])?;
            // bSentinel
            f.write_u8(0x80)?;
            // bCryptMethod
            f.write_u8(self.crypt_method as u8)?;
        } else {
            // bidUnused
            f.write_u64::<LittleEndian>(0)?;
            // bidNextP
            write_id(&mut f, version, self.next_page)?;
            // dwUnique
            f.write_u32::<LittleEndian>(1)?;
            // rgnid, qwUnused
            f.write_all(&[0; 136])?;
            self.write_root(&mut f, file_eof, node_btree, block_btree)?;
            // dwAlign
            f.write_u32::<LittleEndian>(0)?;
            // rgbFM, rgbFP
            f.write_all(&[0xFF; 256])?;
            // bSentinel
            f.write_u8(0x80)?;
            // bCryptMethod
            f.write_u8(self.crypt_method as u8)?;
            // rgbReserved
            f.write_u16::<LittleEndian>(0)?;
            // bidNextB
            write_id(&mut f, version, next_block)?;
        }
        f.resize(HEADER_SIZE, 0);

        let partial = compute_crc(0, &f[8..479]);
        f[4..8].copy_from_slice(&partial.to_le_bytes());
        if !version.is_ansi() {
            let full = compute_crc(0, &f[8..524]);
            f[524..528].copy_from_slice(&full.to_le_bytes());
        }
        Ok(f)
    }
}

/// One record for [encode_name_to_id_streams].
#[derive(Clone, Debug)]
pub struct TestNamedProperty {
    guid: GuidValue,
    name: NamedPropertyName,
}

impl TestNamedProperty {
    pub fn number(guid: GuidValue, id: u32) -> Self {
        Self {
            guid,
            name: NamedPropertyName::Number(id),
        }
    }

    pub fn string(guid: GuidValue, name: &str) -> Self {
        Self {
            guid,
            name: NamedPropertyName::String(name.to_string()),
        }
    }
}

/// The GUID, entry and string streams of the name-to-id map. Record `n` maps to property id
/// `0x8000 + n`.
pub fn encode_name_to_id_streams(properties: &[TestNamedProperty]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut guids: Vec<GuidValue> = Vec::new();
    let mut entries = Vec::with_capacity(properties.len() * 8);
    let mut strings = Vec::new();

    for (index, property) in properties.iter().enumerate() {
        let guid_index = if property.guid == PS_MAPI {
            1
        } else if property.guid == PS_PUBLIC_STRINGS {
            2
        } else {
            let position = match guids.iter().position(|guid| *guid == property.guid) {
                Some(position) => position,
                None => {
                    guids.push(property.guid);
                    guids.len() - 1
                }
            };
            position as u16 + 3
        };

        let (property_id, is_string) = match &property.name {
            NamedPropertyName::Number(id) => (*id, 0),
            NamedPropertyName::String(name) => {
                let offset = strings.len() as u32;
                let name = name
                    .encode_utf16()
                    .flat_map(u16::to_le_bytes)
                    .collect::<Vec<_>>();
                strings.extend_from_slice(&(name.len() as u32).to_le_bytes());
                strings.extend(name);
                strings.resize(strings.len().next_multiple_of(4), 0);
                (offset, 1)
            }
        };

        // dwPropertyID
        entries.extend_from_slice(&property_id.to_le_bytes());
        // wGuid
        entries.extend_from_slice(&(guid_index << 1 | is_string).to_le_bytes());
        // wPropIdx
        entries.extend_from_slice(&(index as u16).to_le_bytes());
    }

    let guids = guids.iter().flat_map(GuidValue::to_bytes).collect();
    (guids, entries, strings)
}

pub const FIXTURE_STORE_NAME: &str = "Fixture Personal Folders";
pub const FIXTURE_RECORD_KEY: [u8; 16] = [
    0x3D, 0x8A, 0x10, 0x5C, 0x91, 0x02, 0x4E, 0x77, 0xB4, 0x1F, 0x6A, 0x23, 0xC8, 0x59, 0x0E, 0xD1,
];
pub const FIXTURE_TOP_FOLDER: NodeId = NodeId::new(NodeIdType::NormalFolder, 0x401);
pub const FIXTURE_INBOX: NodeId = NodeId::new(NodeIdType::NormalFolder, 0x402);
pub const FIXTURE_MESSAGE: NodeId = NodeId::new(NodeIdType::NormalMessage, 0x10001);
/// Parented to a folder that does not exist.
pub const FIXTURE_ORPHAN: NodeId = NodeId::new(NodeIdType::NormalMessage, 0x10002);
pub const FIXTURE_ATTACHMENT: NodeId = NodeId::new(NodeIdType::Attachment, 0x401);
pub const FIXTURE_ATTACHMENT_DATA: &[u8] = b"Meeting notes\r\n- ship the reader\r\n";
pub const FIXTURE_RTF_BODY: &[u8] = br"{\rtf1\ansi\deff0 Hello from the fixture.\par}";
pub const FIXTURE_HTML_BODY: &[u8] = b"<html><body><p>Hello from the fixture.</p></body></html>";
/// 2023-12-01 12:00:00 UTC
pub const FIXTURE_DELIVERY_TIME: i64 = 133_459_920_000_000_000;

/// Only in files which add [forwarded_message].
pub const FIXTURE_FORWARD: NodeId = NodeId::new(NodeIdType::NormalMessage, 0x10003);
pub const FIXTURE_FORWARD_ATTACHMENT: NodeId = NodeId::new(NodeIdType::Attachment, 0x402);
/// Sub-node of [FIXTURE_FORWARD_ATTACHMENT] holding the embedded message.
pub const FIXTURE_EMBEDDED_MESSAGE: NodeId = NodeId::new(NodeIdType::NormalMessage, 0x20001);
pub const FIXTURE_EMBEDDED_SUBJECT: &str = "Itinerary";

const MISSING_FOLDER: NodeId = NodeId::new(NodeIdType::NormalFolder, 0x999);

/// Uncompressed (`MELA`) framing for `PidTagRtfCompressed`.
fn stored_rtf(rtf: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(rtf.len() + 16);
    // COMPSIZE
    data.extend_from_slice(&(rtf.len() as u32 + 12).to_le_bytes());
    // RAWSIZE
    data.extend_from_slice(&(rtf.len() as u32).to_le_bytes());
    // COMPTYPE
    data.extend_from_slice(b"MELA");
    // CRC
    data.extend_from_slice(&0_u32.to_le_bytes());
    data.extend_from_slice(rtf);
    data
}

fn hierarchy_table(folder: NodeId, sub_folders: &[NodeId]) -> TestNode {
    sub_folders
        .iter()
        .fold(
            TableContextBuilder::new(&[
                (PID_TAG_DISPLAY_NAME, PropertyType::Unicode),
                (PID_TAG_CONTENT_COUNT, PropertyType::Integer32),
                (PID_TAG_CONTENT_UNREAD_COUNT, PropertyType::Integer32),
                (PID_TAG_SUBFOLDERS, PropertyType::Boolean),
            ]),
            |table, sub_folder| table.with_row(u32::from(*sub_folder), vec![]),
        )
        .build_node(folder.with_type(NodeIdType::HierarchyTable), NodeId::default())
}

/// Store, name-to-id map, root folder, `Top of Personal Folders` with an `Inbox` holding one
/// message with a recipient and an attachment, plus one orphaned message.
fn fixture_nodes() -> Vec<TestNode> {
    let mut ipm_sub_tree = vec![0; 4];
    ipm_sub_tree.extend_from_slice(&FIXTURE_RECORD_KEY);
    ipm_sub_tree.extend_from_slice(&u32::from(FIXTURE_TOP_FOLDER).to_le_bytes());
    let store = PropertyContextBuilder::new()
        .with(
            PID_TAG_DISPLAY_NAME,
            PropertyValue::Unicode(FIXTURE_STORE_NAME.into()),
        )
        .with(
            PID_TAG_RECORD_KEY,
            PropertyValue::Binary(FIXTURE_RECORD_KEY.to_vec()),
        )
        .with(PID_TAG_IPM_SUB_TREE_ENTRY_ID, PropertyValue::Binary(ipm_sub_tree))
        .build_node(NID_MESSAGE_STORE, NodeId::default());

    let (guids, entries, strings) = encode_name_to_id_streams(&[
        TestNamedProperty::string(PS_PUBLIC_STRINGS, "Keywords"),
        TestNamedProperty::number(PS_MAPI, 0x8101),
    ]);
    let name_to_id_map = PropertyContextBuilder::new()
        // PidTagNameidBucketCount
        .with(0x0001, PropertyValue::Integer32(251))
        // PidTagNameidStreamGuid
        .with(0x0002, PropertyValue::Binary(guids))
        // PidTagNameidStreamEntry
        .with(0x0003, PropertyValue::Binary(entries))
        // PidTagNameidStreamString
        .with(0x0004, PropertyValue::Binary(strings))
        .build_node(NID_NAME_TO_ID_MAP, NodeId::default());

    let root_folder = PropertyContextBuilder::new()
        .with(PID_TAG_DISPLAY_NAME, PropertyValue::Unicode(String::new()))
        .with(PID_TAG_SUBFOLDERS, PropertyValue::Boolean(true))
        .with(PID_TAG_CONTENT_COUNT, PropertyValue::Integer32(0))
        .build_node(NID_ROOT_FOLDER, NID_ROOT_FOLDER);

    let top_folder = PropertyContextBuilder::new()
        .with(
            PID_TAG_DISPLAY_NAME,
            PropertyValue::String8(String8Value::new(b"Caf\xE9".to_vec())),
        )
        .with(PID_TAG_SUBFOLDERS, PropertyValue::Boolean(true))
        .with(PID_TAG_CONTENT_COUNT, PropertyValue::Integer32(0))
        .with(PID_TAG_CONTENT_UNREAD_COUNT, PropertyValue::Integer32(0))
        .build_node(FIXTURE_TOP_FOLDER, NID_ROOT_FOLDER);

    let inbox = PropertyContextBuilder::new()
        .with(PID_TAG_DISPLAY_NAME, PropertyValue::Unicode("Inbox".into()))
        .with(PID_TAG_SUBFOLDERS, PropertyValue::Boolean(false))
        .with(PID_TAG_CONTENT_COUNT, PropertyValue::Integer32(1))
        .with(PID_TAG_CONTENT_UNREAD_COUNT, PropertyValue::Integer32(1))
        .with(
            PID_TAG_CONTAINER_CLASS,
            PropertyValue::Unicode("IPF.Note".into()),
        )
        .build_node(FIXTURE_INBOX, FIXTURE_TOP_FOLDER);

    let contents_table = TableContextBuilder::new(&[
        (PID_TAG_MESSAGE_CLASS, PropertyType::Unicode),
        (PID_TAG_SUBJECT, PropertyType::Unicode),
        (PID_TAG_SENDER_NAME, PropertyType::Unicode),
        (PID_TAG_MESSAGE_DELIVERY_TIME, PropertyType::Time),
        (PID_TAG_MESSAGE_FLAGS, PropertyType::Integer32),
    ])
    .with_row(
        u32::from(FIXTURE_MESSAGE),
        vec![
            (PID_TAG_MESSAGE_CLASS, PropertyValue::Unicode("IPM.Note".into())),
            (PID_TAG_SUBJECT, PropertyValue::Unicode("\u{1}\u{4}RE: Status".into())),
            (PID_TAG_SENDER_NAME, PropertyValue::Unicode("Bob".into())),
            (
                PID_TAG_MESSAGE_DELIVERY_TIME,
                PropertyValue::Time(FIXTURE_DELIVERY_TIME),
            ),
            (PID_TAG_MESSAGE_FLAGS, PropertyValue::Integer32(0)),
        ],
    )
    .build_node(
        FIXTURE_INBOX.with_type(NodeIdType::ContentsTable),
        NodeId::default(),
    );

    let recipients = TableContextBuilder::new(&[
        (PID_TAG_DISPLAY_NAME, PropertyType::Unicode),
        (PID_TAG_RECIPIENT_TYPE, PropertyType::Integer32),
        (PID_TAG_EMAIL_ADDRESS, PropertyType::Unicode),
    ])
    .with_row(
        0,
        vec![
            (PID_TAG_DISPLAY_NAME, PropertyValue::Unicode("Alice".into())),
            (PID_TAG_RECIPIENT_TYPE, PropertyValue::Integer32(1)),
            (
                PID_TAG_EMAIL_ADDRESS,
                PropertyValue::Unicode("alice@example.com".into()),
            ),
        ],
    )
    .build_node(NID_RECIPIENT_TABLE, NodeId::default());

    let attachments = TableContextBuilder::new(&[
        (PID_TAG_ATTACH_METHOD, PropertyType::Integer32),
        (PID_TAG_ATTACHMENT_SIZE, PropertyType::Integer32),
        (PID_TAG_ATTACH_LONG_FILENAME, PropertyType::Unicode),
    ])
    .with_row(
        u32::from(FIXTURE_ATTACHMENT),
        vec![
            (PID_TAG_ATTACH_METHOD, PropertyValue::Integer32(1)),
            (
                PID_TAG_ATTACHMENT_SIZE,
                PropertyValue::Integer32(FIXTURE_ATTACHMENT_DATA.len() as i32),
            ),
            (
                PID_TAG_ATTACH_LONG_FILENAME,
                PropertyValue::Unicode("notes.txt".into()),
            ),
        ],
    )
    .build_node(NID_ATTACHMENT_TABLE, NodeId::default());

    let attachment = PropertyContextBuilder::new()
        .with(PID_TAG_ATTACH_METHOD, PropertyValue::Integer32(1))
        .with(
            PID_TAG_ATTACHMENT_SIZE,
            PropertyValue::Integer32(FIXTURE_ATTACHMENT_DATA.len() as i32),
        )
        .with(
            PID_TAG_ATTACH_LONG_FILENAME,
            PropertyValue::Unicode("notes.txt".into()),
        )
        .with(
            PID_TAG_ATTACH_FILENAME,
            PropertyValue::Unicode("NOTES.TXT".into()),
        )
        .with(
            PID_TAG_ATTACH_MIME_TAG,
            PropertyValue::Unicode("text/plain".into()),
        )
        .with(
            PID_TAG_ATTACH_DATA_BINARY,
            PropertyValue::Binary(FIXTURE_ATTACHMENT_DATA.to_vec()),
        )
        .build_node(FIXTURE_ATTACHMENT, NodeId::default());

    let message = PropertyContextBuilder::new()
        .with(PID_TAG_MESSAGE_CLASS, PropertyValue::Unicode("IPM.Note".into()))
        .with(PID_TAG_SUBJECT, PropertyValue::Unicode("\u{1}\u{4}RE: Status".into()))
        .with(PID_TAG_CONVERSATION_TOPIC, PropertyValue::Unicode("Status".into()))
        .with(PID_TAG_SENDER_NAME, PropertyValue::Unicode("Bob".into()))
        .with(
            PID_TAG_MESSAGE_DELIVERY_TIME,
            PropertyValue::Time(FIXTURE_DELIVERY_TIME),
        )
        .with(PID_TAG_MESSAGE_FLAGS, PropertyValue::Integer32(0))
        .with(
            PID_TAG_BODY,
            PropertyValue::Unicode("Hello from the fixture.".into()),
        )
        .with(
            PID_TAG_RTF_COMPRESSED,
            PropertyValue::Binary(stored_rtf(FIXTURE_RTF_BODY)),
        )
        .with(
            PID_TAG_BODY_HTML,
            PropertyValue::Binary(FIXTURE_HTML_BODY.to_vec()),
        )
        .build_node(FIXTURE_MESSAGE, FIXTURE_INBOX)
        .with_sub_node(recipients)
        .with_sub_node(attachments)
        .with_sub_node(attachment);

    let orphan = PropertyContextBuilder::new()
        .with(PID_TAG_MESSAGE_CLASS, PropertyValue::Unicode("IPM.Note".into()))
        .with(PID_TAG_SUBJECT, PropertyValue::Unicode("Lost and found".into()))
        .build_node(FIXTURE_ORPHAN, MISSING_FOLDER);

    vec![
        store,
        name_to_id_map,
        root_folder,
        hierarchy_table(NID_ROOT_FOLDER, &[FIXTURE_TOP_FOLDER]),
        top_folder,
        hierarchy_table(FIXTURE_TOP_FOLDER, &[FIXTURE_INBOX]),
        inbox,
        contents_table,
        message,
        orphan,
    ]
}

/// `FW: Itinerary`: one attachment embedding a message which has one recipient.
pub fn forwarded_message(parent: NodeId) -> TestNode {
    let recipients = TableContextBuilder::new(&[(PID_TAG_DISPLAY_NAME, PropertyType::Unicode)])
        .with_row(
            0,
            vec![(PID_TAG_DISPLAY_NAME, PropertyValue::Unicode("Carol".into()))],
        )
        .build_node(NID_RECIPIENT_TABLE, NodeId::default());
    let embedded = PropertyContextBuilder::new()
        .with(PID_TAG_MESSAGE_CLASS, PropertyValue::Unicode("IPM.Note".into()))
        .with(
            PID_TAG_SUBJECT,
            PropertyValue::Unicode(FIXTURE_EMBEDDED_SUBJECT.into()),
        )
        .build_node(FIXTURE_EMBEDDED_MESSAGE, NodeId::default())
        .with_sub_node(recipients);

    let attachment = PropertyContextBuilder::new()
        .with(PID_TAG_ATTACH_METHOD, PropertyValue::Integer32(5))
        .with(
            PID_TAG_ATTACH_LONG_FILENAME,
            PropertyValue::Unicode(FIXTURE_EMBEDDED_SUBJECT.into()),
        )
        .with(
            PID_TAG_ATTACH_DATA_OBJECT,
            PropertyValue::Object(ObjectValue::new(FIXTURE_EMBEDDED_MESSAGE, 0)),
        )
        .build_node(FIXTURE_FORWARD_ATTACHMENT, NodeId::default())
        .with_sub_node(embedded);
    let attachments = TableContextBuilder::new(&[(PID_TAG_ATTACH_METHOD, PropertyType::Integer32)])
        .with_row(
            u32::from(FIXTURE_FORWARD_ATTACHMENT),
            vec![(PID_TAG_ATTACH_METHOD, PropertyValue::Integer32(5))],
        )
        .build_node(NID_ATTACHMENT_TABLE, NodeId::default());

    PropertyContextBuilder::new()
        .with(PID_TAG_MESSAGE_CLASS, PropertyValue::Unicode("IPM.Note".into()))
        .with(PID_TAG_SUBJECT, PropertyValue::Unicode("FW: Itinerary".into()))
        .build_node(FIXTURE_FORWARD, parent)
        .with_sub_node(attachments)
        .with_sub_node(attachment)
}
