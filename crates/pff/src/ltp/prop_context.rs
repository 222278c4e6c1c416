//! ## [Property Context (PC)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/294c83c6-ff92-42f5-b6b6-876c29fa9737)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{collections::BTreeMap, io};
use tracing::trace;

use super::{heap::*, prop_type::*, prop_value::*, tree::*, *};
use crate::ndb::database::{Node, NodeDatabase};

/// [PC BTH Record](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/7daab6f5-ce65-437e-80d5-1b1be4088bd3)
#[derive(Clone, Copy, Debug)]
pub struct PropertyTreeRecord {
    prop_id: u16,
    prop_type: PropertyType,
    value: PropertyValueRecord,
}

impl PropertyTreeRecord {
    fn read(entry: &HeapTreeLeafEntry) -> LtpResult<Self> {
        // wPropId
        let prop_id = entry.key_u32() as u16;

        let mut data = entry.data();
        let mut read = || -> io::Result<(u16, u32)> {
            Ok((
                // wPropType
                data.read_u16::<LittleEndian>()?,
                // dwValueHnid
                data.read_u32::<LittleEndian>()?,
            ))
        };
        let (prop_type, value) = read().map_err(|_| LtpError::InvalidHeapTreeDataSize(6))?;
        let prop_type = PropertyType::try_from(prop_type)?;

        let value = if prop_type.is_inline() {
            PropertyValueRecord::Small(value)
        } else if prop_type.fixed_size().is_some() {
            PropertyValueRecord::Heap(HeapId::from(value))
        } else {
            PropertyValueRecord::from_hnid(value)
        };

        Ok(Self {
            prop_id,
            prop_type,
            value,
        })
    }

    pub fn prop_id(&self) -> u16 {
        self.prop_id
    }

    pub fn prop_type(&self) -> PropertyType {
        self.prop_type
    }

    pub fn value(&self) -> PropertyValueRecord {
        self.value
    }
}

/// The property records of one node, decoded on demand.
#[derive(Debug)]
pub struct PropertyContext {
    node: Node,
    heap: HeapNode,
    records: BTreeMap<u16, PropertyTreeRecord>,
}

impl PropertyContext {
    pub fn new(node: Node) -> LtpResult<Self> {
        let heap = HeapNode::new(node.blocks().to_vec())?;
        heap.expect_type(HeapNodeType::Properties)?;

        let user_root = heap.header().user_root();
        let tree = HeapTree::new(heap, user_root)?;
        tree.expect_sizes(2, 6)?;
        let records = tree
            .entries()?
            .iter()
            .map(|entry| PropertyTreeRecord::read(entry).map(|record| (record.prop_id(), record)))
            .collect::<LtpResult<BTreeMap<_, _>>>()?;
        trace!(node = ?node.id(), count = records.len(), "property context");

        Ok(Self {
            node,
            heap: tree.into(),
            records,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn records(&self) -> impl Iterator<Item = &PropertyTreeRecord> {
        self.records.values()
    }

    pub fn contains(&self, prop_id: u16) -> bool {
        self.records.contains_key(&prop_id)
    }

    pub fn value(&self, database: &NodeDatabase, prop_id: u16) -> io::Result<Option<PropertyValue>> {
        self.records
            .get(&prop_id)
            .map(|record| self.read_record(database, record))
            .transpose()
    }

    /// Decode every record.
    pub fn properties(&self, database: &NodeDatabase) -> io::Result<BTreeMap<u16, PropertyValue>> {
        self.records
            .values()
            .map(|record| {
                self.read_record(database, record)
                    .map(|value| (record.prop_id(), value))
            })
            .collect()
    }

    fn read_record(
        &self,
        database: &NodeDatabase,
        record: &PropertyTreeRecord,
    ) -> io::Result<PropertyValue> {
        record
            .value()
            .read_value(record.prop_type(), &self.heap, &self.node, database)
    }
}
