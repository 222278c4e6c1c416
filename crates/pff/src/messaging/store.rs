//! ## [Message Store](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/aa0539bd-e7bf-4cec-8bde-0b87c2a86baf)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{
    fmt::Debug,
    io::{self, Read},
};

use super::{tags::*, *};
use crate::ndb::node_id::NID_MESSAGE_STORE;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StoreRecordKey {
    record_key: [u8; 16],
}

impl StoreRecordKey {
    pub fn new(record_key: [u8; 16]) -> Self {
        Self { record_key }
    }

    pub fn record_key(&self) -> &[u8; 16] {
        &self.record_key
    }

    fn read(f: &mut dyn Read) -> io::Result<Self> {
        let mut record_key = [0; 16];
        f.read_exact(&mut record_key)?;
        Ok(Self::new(record_key))
    }
}

impl Debug for StoreRecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self
            .record_key
            .iter()
            .map(|ch| format!("{ch:02X}"))
            .collect::<Vec<_>>()
            .join("-");
        write!(f, "{value}")
    }
}

impl TryFrom<&[u8]> for StoreRecordKey {
    type Error = MessagingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let record_key = value
            .try_into()
            .map_err(|_| MessagingError::InvalidStoreRecordKeySize(value.len()))?;
        Ok(Self::new(record_key))
    }
}

/// `EntryID`:
/// `rgbFlags`, the provider `uid` and the target `nid`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EntryId {
    flags: u32,
    record_key: StoreRecordKey,
    node_id: NodeId,
}

impl EntryId {
    pub const SIZE: usize = 24;

    pub fn new(flags: u32, record_key: StoreRecordKey, node_id: NodeId) -> Self {
        Self {
            flags,
            record_key,
            node_id,
        }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn record_key(&self) -> &StoreRecordKey {
        &self.record_key
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl TryFrom<&[u8]> for EntryId {
    type Error = io::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != Self::SIZE {
            return Err(MessagingError::InvalidEntryIdSize(value.len()).into());
        }
        let mut f = value;

        // rgbFlags
        let flags = f.read_u32::<LittleEndian>()?;

        // uid
        let record_key = StoreRecordKey::read(&mut f)?;

        // nid
        let node_id = NodeId::from(f.read_u32::<LittleEndian>()?);

        Ok(Self::new(flags, record_key, node_id))
    }
}

/// The store's property context.
#[derive(Debug)]
pub struct MessageStore {
    properties: PropertyContext,
}

impl MessageStore {
    pub fn read(database: &NodeDatabase) -> io::Result<Self> {
        let node = database.read_node(NID_MESSAGE_STORE)?;
        Ok(Self {
            properties: PropertyContext::new(node)?,
        })
    }

    pub fn properties(&self) -> &PropertyContext {
        &self.properties
    }

    pub fn display_name(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_DISPLAY_NAME, codepage)
    }

    pub fn record_key(&self, database: &NodeDatabase) -> io::Result<Option<StoreRecordKey>> {
        read_binary(database, &self.properties, PID_TAG_RECORD_KEY)?
            .map(|value| StoreRecordKey::try_from(value.as_slice()).map_err(io::Error::from))
            .transpose()
    }

    pub fn ipm_sub_tree_entry_id(&self, database: &NodeDatabase) -> io::Result<Option<EntryId>> {
        read_binary(database, &self.properties, PID_TAG_IPM_SUB_TREE_ENTRY_ID)?
            .map(|value| EntryId::try_from(value.as_slice()))
            .transpose()
    }

    pub fn ipm_wastebasket_entry_id(
        &self,
        database: &NodeDatabase,
    ) -> io::Result<Option<EntryId>> {
        read_binary(database, &self.properties, PID_TAG_IPM_WASTEBASKET_ENTRY_ID)?
            .map(|value| EntryId::try_from(value.as_slice()))
            .transpose()
    }

    /// An entry id names an object in this store when its provider uid is the store's record key.
    pub fn matches_record_key(&self, database: &NodeDatabase, entry_id: &EntryId) -> io::Result<bool> {
        Ok(self.record_key(database)? == Some(*entry_id.record_key()))
    }
}
