//! ## [Attachment Objects](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/46eb4828-c6a5-420d-a137-9ee36df317c1)

use std::io;

use super::{tags::*, *};
use crate::ndb::database::Node;

/// [PidTagAttachMethod](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcmsg/252923d6-dd41-468b-9c57-d3f68051a516)
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum AttachmentMethod {
    /// `afNone`: The attachment has just been created.
    #[default]
    None = 0x00000000,
    /// `afByValue`: The `PidTagAttachDataBinary` property (section [2.2.2.7](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcmsg/42dfb62b-2ff5-4ffc-ae25-bfdd2db3d8e0))
    /// contains the attachment data.
    ByValue = 0x00000001,
    /// `afByReference`: The `PidTagAttachLongPathname` property (section [2.2.2.13](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcmsg/74b1b39e-1cb4-48ad-b28e-405a261e556c))
    /// names the attachment on a file server shared with the recipients.
    ByReference = 0x00000002,
    /// `afByReferenceOnly`: The `PidTagAttachLongPathname` property names the attachment.
    ByReferenceOnly = 0x00000004,
    /// `afEmbeddedMessage`: The attachment is an embedded message, opened with the `RopOpenEmbeddedMessage` ROP ([MS-OXCROPS](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcrops/13af6911-27e5-4aa0-bb75-637b02d4f2ef)
    /// section [2.2.6.16](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcrops/bce79473-e082-4452-822c-ab8cb055dee6)).
    EmbeddedMessage = 0x00000005,
    /// `afStorage`: The `PidTagAttachDataObject` property (section [2.2.2.8](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxcmsg/0691206f-0082-463a-a12f-58cb7cb7875f))
    /// holds application-specific data.
    Storage = 0x00000006,
    /// `afByWebReference`: The `PidTagAttachLongPathname` property names the attachment on a web
    /// service.
    ByWebReference = 0x00000007,
}

impl TryFrom<i32> for AttachmentMethod {
    type Error = MessagingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0x00000000 => Ok(Self::None),
            0x00000001 => Ok(Self::ByValue),
            0x00000002 => Ok(Self::ByReference),
            0x00000004 => Ok(Self::ByReferenceOnly),
            0x00000005 => Ok(Self::EmbeddedMessage),
            0x00000006 => Ok(Self::Storage),
            0x00000007 => Ok(Self::ByWebReference),
            _ => Err(MessagingError::UnknownAttachmentMethod(value)),
        }
    }
}

/// An attachment's property context, read from a sub-node of its message.
#[derive(Debug)]
pub struct Attachment {
    node_id: NodeId,
    properties: PropertyContext,
}

impl Attachment {
    pub fn read(database: &NodeDatabase, message: &Node, node_id: NodeId) -> io::Result<Self> {
        Self::new(message.read_sub_node(database, node_id)?)
    }

    pub fn new(node: Node) -> io::Result<Self> {
        Ok(Self {
            node_id: node.id(),
            properties: PropertyContext::new(node)?,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn properties(&self) -> &PropertyContext {
        &self.properties
    }

    pub fn method(&self, database: &NodeDatabase) -> io::Result<Option<AttachmentMethod>> {
        read_i32(database, &self.properties, PID_TAG_ATTACH_METHOD)?
            .map(|value| AttachmentMethod::try_from(value).map_err(io::Error::from))
            .transpose()
    }

    pub fn size(&self, database: &NodeDatabase) -> io::Result<Option<i32>> {
        read_i32(database, &self.properties, PID_TAG_ATTACHMENT_SIZE)
    }

    /// `PidTagAttachLongFilename`, falling back to the 8.3 `PidTagAttachFilename`.
    pub fn filename(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        match read_text(database, &self.properties, PID_TAG_ATTACH_LONG_FILENAME, codepage)? {
            Some(filename) => Ok(Some(filename)),
            None => read_text(database, &self.properties, PID_TAG_ATTACH_FILENAME, codepage),
        }
    }

    pub fn mime_type(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_ATTACH_MIME_TAG, codepage)
    }

    /// `PidTagAttachDataBinary`, present for [AttachmentMethod::ByValue]. `None` when the
    /// property holds an object instead.
    pub fn data(&self, database: &NodeDatabase) -> io::Result<Option<Vec<u8>>> {
        match self.properties.value(database, PID_TAG_ATTACH_DATA_BINARY)? {
            None | Some(PropertyValue::Object(_)) => Ok(None),
            Some(PropertyValue::Binary(value)) => Ok(Some(value)),
            Some(value) => Err(unexpected_type(PID_TAG_ATTACH_DATA_BINARY, &value).into()),
        }
    }

    /// Sub-node of this attachment holding the message of an
    /// [AttachmentMethod::EmbeddedMessage] attachment. `None` for every other method.
    pub fn embedded_message(&self, database: &NodeDatabase) -> io::Result<Option<NodeId>> {
        if self.method(database)? != Some(AttachmentMethod::EmbeddedMessage) {
            return Ok(None);
        }
        match self.properties.value(database, PID_TAG_ATTACH_DATA_OBJECT)? {
            None => Ok(None),
            Some(PropertyValue::Object(object)) => Ok(Some(object.node())),
            Some(value) => Err(unexpected_type(PID_TAG_ATTACH_DATA_OBJECT, &value).into()),
        }
    }
}
