//! ## [Messaging Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3f1bc553-d15d-4dcf-9b80-fbf1dd6c7e79)

use std::io;
use thiserror::Error;

use crate::{
    codepage::Codepage,
    ltp::{prop_context::PropertyContext, prop_type::PropertyType, prop_value::PropertyValue},
    ndb::{database::NodeDatabase, node_id::NodeId},
};

pub mod attachment;
pub mod folder;
pub mod item_tree;
pub mod message;
pub mod named_prop;
pub mod store;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] crate::ndb::NdbError),
    #[error("Lists, Tables, and Properties error: {0}")]
    ListsTablesPropertiesError(#[from] crate::ltp::LtpError),
    #[error("Compressed RTF error: {0}")]
    CompressedRtf(#[from] lzfu::Error),
    #[error("Invalid EntryID size: 0x{0:X}")]
    InvalidEntryIdSize(usize),
    #[error("Invalid PidTagRecordKey size on store: 0x{0:X}")]
    InvalidStoreRecordKeySize(usize),
    #[error("Invalid property 0x{prop_id:04X} type: {prop_type:?}")]
    UnexpectedPropertyType {
        prop_id: u16,
        prop_type: PropertyType,
    },
    #[error("Named property GUID index out of bounds: 0x{0:04X}")]
    NamedPropertyMapGuidIndexOutOfBounds(u16),
    #[error("Named property index out of bounds: 0x{0:04X}")]
    NamedPropertyMapPropertyIndexOutOfBounds(u16),
    #[error("Named property string offset out of bounds: 0x{0:08X}")]
    NamedPropertyMapStringEntryOutOfBounds(u32),
    #[error("Missing named property map stream: 0x{0:04X}")]
    NamedPropertyMapStreamNotFound(u16),
    #[error("Invalid named property map stream 0x{0:04X} size: 0x{1:X}")]
    InvalidNamedPropertyMapStreamSize(u16, usize),
    #[error("Unknown PidTagAttachMethod: 0x{0:08X}")]
    UnknownAttachmentMethod(i32),
}

impl From<MessagingError> for io::Error {
    fn from(err: MessagingError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Property identifiers the messaging objects read.
pub mod tags {
    pub const PID_TAG_MESSAGE_CLASS: u16 = 0x001A;
    pub const PID_TAG_SUBJECT: u16 = 0x0037;
    pub const PID_TAG_CLIENT_SUBMIT_TIME: u16 = 0x0039;
    pub const PID_TAG_CONVERSATION_TOPIC: u16 = 0x0070;
    pub const PID_TAG_TRANSPORT_MESSAGE_HEADERS: u16 = 0x007D;
    pub const PID_TAG_SENDER_NAME: u16 = 0x0C1A;
    pub const PID_TAG_MESSAGE_DELIVERY_TIME: u16 = 0x0E06;
    pub const PID_TAG_MESSAGE_FLAGS: u16 = 0x0E07;
    pub const PID_TAG_MESSAGE_SIZE: u16 = 0x0E08;
    pub const PID_TAG_ATTACHMENT_SIZE: u16 = 0x0E20;
    pub const PID_TAG_RECORD_KEY: u16 = 0x0FF9;
    pub const PID_TAG_BODY: u16 = 0x1000;
    pub const PID_TAG_RTF_COMPRESSED: u16 = 0x1009;
    pub const PID_TAG_BODY_HTML: u16 = 0x1013;
    pub const PID_TAG_DISPLAY_NAME: u16 = 0x3001;
    pub const PID_TAG_EMAIL_ADDRESS: u16 = 0x3003;
    pub const PID_TAG_CREATION_TIME: u16 = 0x3007;
    pub const PID_TAG_LAST_MODIFICATION_TIME: u16 = 0x3008;
    pub const PID_TAG_CONTENT_COUNT: u16 = 0x3602;
    pub const PID_TAG_CONTENT_UNREAD_COUNT: u16 = 0x3603;
    pub const PID_TAG_SUBFOLDERS: u16 = 0x360A;
    pub const PID_TAG_CONTAINER_CLASS: u16 = 0x3613;
    pub const PID_TAG_IPM_SUB_TREE_ENTRY_ID: u16 = 0x35E0;
    pub const PID_TAG_IPM_WASTEBASKET_ENTRY_ID: u16 = 0x35E3;
    pub const PID_TAG_ATTACH_DATA_BINARY: u16 = 0x3701;
    /// Same id as `PidTagAttachDataBinary`, typed `PtypObject` on embedded messages.
    pub const PID_TAG_ATTACH_DATA_OBJECT: u16 = 0x3701;
    pub const PID_TAG_ATTACH_FILENAME: u16 = 0x3704;
    pub const PID_TAG_ATTACH_METHOD: u16 = 0x3705;
    pub const PID_TAG_ATTACH_LONG_FILENAME: u16 = 0x3707;
    pub const PID_TAG_ATTACH_MIME_TAG: u16 = 0x370E;
    pub const PID_TAG_RECIPIENT_TYPE: u16 = 0x0C15;
}

/// Text of a string property in either encoding.
pub(crate) fn read_text(
    database: &NodeDatabase,
    properties: &PropertyContext,
    prop_id: u16,
    codepage: Codepage,
) -> io::Result<Option<String>> {
    let Some(value) = properties.value(database, prop_id)? else {
        return Ok(None);
    };
    match value.to_text(codepage)? {
        Some(text) => Ok(Some(text)),
        None => Err(unexpected_type(prop_id, &value).into()),
    }
}

pub(crate) fn read_i32(
    database: &NodeDatabase,
    properties: &PropertyContext,
    prop_id: u16,
) -> io::Result<Option<i32>> {
    let Some(value) = properties.value(database, prop_id)? else {
        return Ok(None);
    };
    match value.as_i32() {
        Some(value) => Ok(Some(value)),
        None => Err(unexpected_type(prop_id, &value).into()),
    }
}

pub(crate) fn read_bool(
    database: &NodeDatabase,
    properties: &PropertyContext,
    prop_id: u16,
) -> io::Result<Option<bool>> {
    let Some(value) = properties.value(database, prop_id)? else {
        return Ok(None);
    };
    match value.as_bool() {
        Some(value) => Ok(Some(value)),
        None => Err(unexpected_type(prop_id, &value).into()),
    }
}

/// `PtypTime` as 100-nanosecond intervals since January 1, 1601.
pub(crate) fn read_time(
    database: &NodeDatabase,
    properties: &PropertyContext,
    prop_id: u16,
) -> io::Result<Option<i64>> {
    match properties.value(database, prop_id)? {
        None => Ok(None),
        Some(PropertyValue::Time(value)) => Ok(Some(value)),
        Some(value) => Err(unexpected_type(prop_id, &value).into()),
    }
}

pub(crate) fn read_binary(
    database: &NodeDatabase,
    properties: &PropertyContext,
    prop_id: u16,
) -> io::Result<Option<Vec<u8>>> {
    match properties.value(database, prop_id)? {
        None => Ok(None),
        Some(PropertyValue::Binary(value)) => Ok(Some(value)),
        Some(value) => Err(unexpected_type(prop_id, &value).into()),
    }
}

pub(crate) fn unexpected_type(prop_id: u16, value: &PropertyValue) -> MessagingError {
    MessagingError::UnexpectedPropertyType {
        prop_id,
        prop_type: value.prop_type(),
    }
}
