//! ## [Table Context (TC)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5e48be0d-a75a-4918-a277-50408ff96740)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{collections::BTreeMap, io};
use tracing::trace;

use super::{heap::*, prop_type::*, prop_value::*, tree::*, *};
use crate::ndb::{
    database::{Node, NodeDatabase},
    node_id::NodeId,
};

pub const LTP_ROW_ID_PROP_ID: u16 = 0x67F2;
pub const LTP_ROW_VERSION_PROP_ID: u16 = 0x67F3;

pub const fn existence_bitmap_size(column_count: usize) -> usize {
    column_count.div_ceil(8)
}

/// Bits are numbered from the most significant bit of each byte.
pub fn check_existence_bitmap(column: usize, existence_bitmap: &[u8]) -> LtpResult<bool> {
    if column >= existence_bitmap.len() * 8 {
        return Err(LtpError::InvalidTableContextColumnCount(column));
    }
    Ok(existence_bitmap[column / 8] & (1_u8 << (7 - (column % 8))) != 0)
}

/// [TCOLDESC](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3a2f63cf-bb40-4559-910c-e55ec43d9cbb)
#[derive(Clone, Copy, Debug)]
pub struct TableColumnDescriptor {
    prop_type: PropertyType,
    prop_id: u16,
    offset: u16,
    size: u8,
    existence_bitmap_index: u8,
}

impl TableColumnDescriptor {
    fn read(f: &mut dyn io::Read) -> io::Result<Self> {
        // tag
        let prop_type = PropertyType::try_from(f.read_u16::<LittleEndian>()?)?;
        let prop_id = f.read_u16::<LittleEndian>()?;
        // ibData
        let offset = f.read_u16::<LittleEndian>()?;
        // cbData
        let size = f.read_u8()?;
        // iBit
        let existence_bitmap_index = f.read_u8()?;

        Ok(Self {
            prop_type,
            prop_id,
            offset,
            size,
            existence_bitmap_index,
        })
    }

    pub fn prop_type(&self) -> PropertyType {
        self.prop_type
    }

    pub fn prop_id(&self) -> u16 {
        self.prop_id
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn existence_bitmap_index(&self) -> u8 {
        self.existence_bitmap_index
    }

    /// Fixed-size values up to 8 bytes live in the row; everything else is an HNID.
    fn is_stored_in_row(&self) -> bool {
        !matches!(self.prop_type, PropertyType::Guid | PropertyType::Object)
            && self.prop_type.fixed_size().is_some()
    }
}

/// [TCINFO](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/45b3a0c5-d6d6-4e02-aebf-13766ff693f0)
#[derive(Clone, Debug)]
pub struct TableContextInfo {
    offsets: [u16; 4],
    row_index: HeapId,
    rows: u32,
    columns: Vec<TableColumnDescriptor>,
}

impl TableContextInfo {
    fn read(data: &[u8]) -> io::Result<Self> {
        let mut f = data;

        // bType
        let signature = HeapNodeType::try_from(f.read_u8()?)?;
        if signature != HeapNodeType::Table {
            return Err(LtpError::UnexpectedHeapNodeType(signature).into());
        }

        // cCols
        let column_count = usize::from(f.read_u8()?);

        // rgib
        let mut offsets = [0_u16; 4];
        for offset in offsets.iter_mut() {
            *offset = f.read_u16::<LittleEndian>()?;
        }

        // hidRowIndex
        let row_index = HeapId::from(f.read_u32::<LittleEndian>()?);

        // hnidRows
        let rows = f.read_u32::<LittleEndian>()?;

        // hidIndex
        let _deprecated_index = f.read_u32::<LittleEndian>()?;

        // rgTCOLDESC
        let columns = (0..column_count)
            .map(|_| TableColumnDescriptor::read(&mut f))
            .collect::<io::Result<Vec<_>>>()?;

        let [end_4byte, end_2byte, end_1byte, end_bitmap] = offsets;
        if end_4byte > end_2byte
            || end_2byte > end_1byte
            || end_1byte > end_bitmap
            || usize::from(end_bitmap - end_1byte) < existence_bitmap_size(column_count)
        {
            return Err(LtpError::InvalidTableContextOffsets(offsets).into());
        }

        for column in columns.iter() {
            if column.is_stored_in_row() {
                if Some(usize::from(column.size())) != column.prop_type().fixed_size() {
                    return Err(LtpError::InvalidTableColumnSize(column.size()).into());
                }
            } else if column.size() != 4 {
                return Err(LtpError::InvalidTableColumnSize(column.size()).into());
            }

            if usize::from(column.offset()) + usize::from(column.size()) > usize::from(end_1byte) {
                return Err(LtpError::InvalidTableColumnOffset(column.offset()).into());
            }

            if usize::from(column.existence_bitmap_index()) >= usize::from(end_bitmap - end_1byte) * 8
            {
                return Err(LtpError::InvalidTableContextColumnCount(usize::from(
                    column.existence_bitmap_index(),
                ))
                .into());
            }
        }

        Ok(Self {
            offsets,
            row_index,
            rows,
            columns,
        })
    }

    pub fn columns(&self) -> &[TableColumnDescriptor] {
        &self.columns
    }

    pub fn end_1byte_values(&self) -> u16 {
        self.offsets[2]
    }

    /// Size of one row.
    pub fn end_existence_bitmap(&self) -> u16 {
        self.offsets[3]
    }

    pub fn find_column(&self, prop_id: u16) -> Option<&TableColumnDescriptor> {
        self.columns.iter().find(|column| column.prop_id() == prop_id)
    }
}

/// One fixed-size row of the row matrix.
#[derive(Clone, Debug)]
pub struct TableRow {
    data: Vec<u8>,
}

impl TableRow {
    /// `dwRowID`, the first 4 bytes of every row.
    pub fn id(&self) -> u32 {
        let mut cursor = self.data.as_slice();
        cursor.read_u32::<LittleEndian>().unwrap_or_default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A table stored in one node: column schema, row index and row matrix.
#[derive(Debug)]
pub struct TableContext {
    node: Node,
    heap: HeapNode,
    info: TableContextInfo,
    row_index: BTreeMap<u32, usize>,
    rows: Vec<TableRow>,
}

impl TableContext {
    pub fn new(database: &NodeDatabase, node: Node) -> io::Result<Self> {
        let heap = HeapNode::new(node.blocks().to_vec())?;
        heap.expect_type(HeapNodeType::Table)?;

        let info = TableContextInfo::read(heap.find_entry(heap.header().user_root())?)?;
        let row_size = usize::from(info.end_existence_bitmap());

        let row_blocks = match PropertyValueRecord::from_hnid(info.rows) {
            PropertyValueRecord::Heap(heap_id) if heap_id.is_empty() => vec![],
            PropertyValueRecord::Heap(heap_id) => vec![heap.find_entry(heap_id)?.to_vec()],
            PropertyValueRecord::Node(sub_node) => node
                .read_sub_node(database, sub_node)?
                .blocks()
                .iter()
                .map(|block| block.data().to_vec())
                .collect(),
            PropertyValueRecord::Small(_) => vec![],
        };

        let rows = if row_size == 0 {
            Vec::new()
        } else {
            row_blocks
                .iter()
                .flat_map(|block| block.chunks_exact(row_size))
                .map(|data| TableRow {
                    data: data.to_vec(),
                })
                .collect::<Vec<_>>()
        };

        let row_index = if info.row_index.is_empty() {
            Default::default()
        } else {
            let tree = HeapTree::new(heap.clone(), info.row_index)?;
            tree.expect_sizes(4, if database.version().is_ansi() { 2 } else { 4 })?;
            tree.entries()?
                .iter()
                .map(|entry| (entry.key_u32(), read_row_index(entry.data())))
                .collect()
        };

        trace!(
            node = ?node.id(),
            columns = info.columns().len(),
            rows = rows.len(),
            "table context"
        );

        Ok(Self {
            node,
            heap,
            info,
            row_index,
            rows,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn info(&self) -> &TableContextInfo {
        &self.info
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &TableRow> {
        self.rows.iter()
    }

    pub fn row(&self, index: usize) -> LtpResult<&TableRow> {
        self.rows
            .get(index)
            .ok_or(LtpError::TableRowIndexOutOfRange(index))
    }

    /// Look up a row through the row index BTH.
    pub fn find_row(&self, id: u32) -> LtpResult<&TableRow> {
        let index = self
            .row_index
            .get(&id)
            .copied()
            .ok_or(LtpError::TableRowNotFound(id))?;
        self.row(index)
    }

    /// `None` when the table has no such column or the row's existence bit is clear.
    pub fn read_column(
        &self,
        database: &NodeDatabase,
        row: &TableRow,
        prop_id: u16,
    ) -> io::Result<Option<PropertyValue>> {
        let Some(column) = self.info.find_column(prop_id) else {
            return Ok(None);
        };

        let data = row.data();
        let bitmap = &data[usize::from(self.info.end_1byte_values())..];
        if !check_existence_bitmap(usize::from(column.existence_bitmap_index()), bitmap)? {
            return Ok(None);
        }

        let start = usize::from(column.offset());
        let value = &data[start..start + usize::from(column.size())];

        if column.is_stored_in_row() {
            return Ok(Some(PropertyValue::read(value, column.prop_type())?));
        }

        let mut cursor = value;
        let hnid = cursor.read_u32::<LittleEndian>()?;
        PropertyValueRecord::from_hnid(hnid)
            .read_value(column.prop_type(), &self.heap, &self.node, database)
            .map(Some)
    }

    /// Every present column of `row`.
    pub fn row_values(
        &self,
        database: &NodeDatabase,
        row: &TableRow,
    ) -> io::Result<BTreeMap<u16, PropertyValue>> {
        let mut values = BTreeMap::new();
        for column in self.info.columns() {
            if let Some(value) = self.read_column(database, row, column.prop_id())? {
                values.insert(column.prop_id(), value);
            }
        }
        Ok(values)
    }

    /// Row ids of a hierarchy or contents table are the node ids of the listed objects.
    pub fn row_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rows.iter().map(|row| NodeId::from(row.id()))
    }
}

/// `dwRowIndex` is 2 bytes in ANSI files and 4 bytes otherwise.
fn read_row_index(data: &[u8]) -> usize {
    data.iter()
        .rev()
        .fold(0_usize, |value, byte| (value << 8) | usize::from(*byte))
}
