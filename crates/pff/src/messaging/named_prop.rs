//! ## [Named Property Lookup Map](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e17e195d-0454-4b9b-b398-c9127a26a678)

use byteorder::{LittleEndian, ReadBytesExt};
use std::{collections::BTreeMap, fmt::Display, io};
use tracing::debug;

use super::*;
use crate::{ltp::prop_value::GuidValue, ndb::node_id::NID_NAME_TO_ID_MAP};

pub const PS_MAPI: GuidValue = GuidValue::new(
    0x00020328,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

pub const PS_PUBLIC_STRINGS: GuidValue = GuidValue::new(
    0x00020329,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

const PID_TAG_NAMEID_BUCKET_COUNT: u16 = 0x0001;
const PID_TAG_NAMEID_STREAM_GUID: u16 = 0x0002;
const PID_TAG_NAMEID_STREAM_ENTRY: u16 = 0x0003;
const PID_TAG_NAMEID_STREAM_STRING: u16 = 0x0004;

const NAMEID_SIZE: usize = 8;
const GUID_SIZE: usize = 16;

/// Named properties get ids from this value upwards.
pub const FIRST_NAMED_PROP_ID: u16 = 0x8000;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum NamedPropertyName {
    Number(u32),
    String(String),
}

impl Display for NamedPropertyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(id) => write!(f, "0x{id:08X}"),
            Self::String(name) => write!(f, "{name}"),
        }
    }
}

/// One resolved [NAMEID](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e17e195d-0454-4b9b-b398-c9127a26a678) record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NamedProperty {
    prop_id: u16,
    guid: GuidValue,
    name: NamedPropertyName,
}

impl NamedProperty {
    pub fn prop_id(&self) -> u16 {
        self.prop_id
    }

    pub fn guid(&self) -> &GuidValue {
        &self.guid
    }

    pub fn name(&self) -> &NamedPropertyName {
        &self.name
    }
}

/// Maps `(GUID, name)` pairs to property ids and back.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct NameToIdMap {
    bucket_count: Option<i32>,
    entries: Vec<NamedProperty>,
    by_prop_id: BTreeMap<u16, usize>,
    by_name: BTreeMap<(GuidKey, NamedPropertyName), u16>,
}

type GuidKey = [u8; GUID_SIZE];

impl NameToIdMap {
    pub fn read(database: &NodeDatabase) -> io::Result<Self> {
        let node = database.read_node(NID_NAME_TO_ID_MAP)?;
        let properties = PropertyContext::new(node)?;

        let bucket_count = read_i32(database, &properties, PID_TAG_NAMEID_BUCKET_COUNT)?;
        let guids = read_binary(database, &properties, PID_TAG_NAMEID_STREAM_GUID)?
            .unwrap_or_default();
        let entries = read_binary(database, &properties, PID_TAG_NAMEID_STREAM_ENTRY)?
            .ok_or(MessagingError::NamedPropertyMapStreamNotFound(
                PID_TAG_NAMEID_STREAM_ENTRY,
            ))?;
        let strings = read_binary(database, &properties, PID_TAG_NAMEID_STREAM_STRING)?
            .unwrap_or_default();

        let map = Self::parse(bucket_count, &guids, &entries, &strings)?;
        debug!(entries = map.len(), "name-to-id map");
        Ok(map)
    }

    fn parse(
        bucket_count: Option<i32>,
        guids: &[u8],
        entries: &[u8],
        strings: &[u8],
    ) -> MessagingResult<Self> {
        if guids.len() % GUID_SIZE != 0 {
            return Err(MessagingError::InvalidNamedPropertyMapStreamSize(
                PID_TAG_NAMEID_STREAM_GUID,
                guids.len(),
            ));
        }
        if entries.len() % NAMEID_SIZE != 0 {
            return Err(MessagingError::InvalidNamedPropertyMapStreamSize(
                PID_TAG_NAMEID_STREAM_ENTRY,
                entries.len(),
            ));
        }

        let guids = guids
            .chunks_exact(GUID_SIZE)
            .map(|mut chunk| GuidValue::read(&mut chunk))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|_| {
                MessagingError::InvalidNamedPropertyMapStreamSize(
                    PID_TAG_NAMEID_STREAM_GUID,
                    guids.len(),
                )
            })?;

        let mut map = Self {
            bucket_count,
            ..Default::default()
        };

        for mut record in entries.chunks_exact(NAMEID_SIZE) {
            let mut read = || -> io::Result<(u32, u16, u16)> {
                Ok((
                    // dwPropertyID
                    record.read_u32::<LittleEndian>()?,
                    // wGuid
                    record.read_u16::<LittleEndian>()?,
                    // wPropIdx
                    record.read_u16::<LittleEndian>()?,
                ))
            };
            let (property_id, guid_index, prop_index) = read().map_err(|_| {
                MessagingError::InvalidNamedPropertyMapStreamSize(
                    PID_TAG_NAMEID_STREAM_ENTRY,
                    entries.len(),
                )
            })?;

            if prop_index >= FIRST_NAMED_PROP_ID {
                return Err(MessagingError::NamedPropertyMapPropertyIndexOutOfBounds(
                    prop_index,
                ));
            }
            let prop_id = FIRST_NAMED_PROP_ID + prop_index;

            let guid = match guid_index >> 1 {
                0 => GuidValue::default(),
                1 => PS_MAPI,
                2 => PS_PUBLIC_STRINGS,
                index => *guids
                    .get(usize::from(index - 3))
                    .ok_or(MessagingError::NamedPropertyMapGuidIndexOutOfBounds(index))?,
            };

            let name = if guid_index & 0x0001 == 0 {
                NamedPropertyName::Number(property_id)
            } else {
                NamedPropertyName::String(read_string_entry(strings, property_id)?)
            };

            map.by_name.insert((guid.to_bytes(), name.clone()), prop_id);
            map.by_prop_id.insert(prop_id, map.entries.len());
            map.entries.push(NamedProperty {
                prop_id,
                guid,
                name,
            });
        }

        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `PidTagNameidBucketCount`
    pub fn bucket_count(&self) -> Option<i32> {
        self.bucket_count
    }

    pub fn entries(&self) -> &[NamedProperty] {
        &self.entries
    }

    pub fn find(&self, prop_id: u16) -> Option<&NamedProperty> {
        self.by_prop_id
            .get(&prop_id)
            .and_then(|index| self.entries.get(*index))
    }

    pub fn lookup(&self, guid: &GuidValue, name: &NamedPropertyName) -> Option<u16> {
        self.by_name.get(&(guid.to_bytes(), name.clone())).copied()
    }
}

/// String stream entries are a `u32` byte count followed by UTF-16LE text.
fn read_string_entry(strings: &[u8], offset: u32) -> MessagingResult<String> {
    let out_of_bounds = || MessagingError::NamedPropertyMapStringEntryOutOfBounds(offset);

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let mut cursor = strings.get(start..).ok_or_else(out_of_bounds)?;
    let size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| out_of_bounds())? as usize;
    if size % 2 != 0 {
        return Err(out_of_bounds());
    }
    let buffer = cursor.get(..size).ok_or_else(out_of_bounds)?;
    let units = buffer
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    Ok(String::from_utf16_lossy(&units))
}
