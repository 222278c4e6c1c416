//! ## [Message Objects](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/1042af37-aaa4-4edc-bffd-90a1ede24188)

use std::io;

use super::{attachment::Attachment, tags::*, *};
use crate::{
    ltp::table_context::TableContext,
    ndb::{
        database::Node,
        node_id::{NID_ATTACHMENT_TABLE, NID_RECIPIENT_TABLE},
    },
};

/// Marks a subject whose next character is the length of its prefix, e.g. `RE: `.
const SUBJECT_PREFIX_MARKER: char = '\u{1}';

/// A message's property context. Recipients and attachments live in its sub-nodes.
#[derive(Debug)]
pub struct Message {
    node_id: NodeId,
    properties: PropertyContext,
}

impl Message {
    pub fn read(database: &NodeDatabase, node_id: NodeId) -> io::Result<Self> {
        Self::new(database.read_node(node_id)?)
    }

    /// A message whose property context is `node`: an NBT node, or the sub-node an embedded
    /// message attachment points to.
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

    pub fn message_class(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_MESSAGE_CLASS, codepage)
    }

    /// `PidTagSubject` without the prefix marker and its length character.
    pub fn subject(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        let subject = read_text(database, &self.properties, PID_TAG_SUBJECT, codepage)?;
        Ok(subject.map(|subject| match subject.strip_prefix(SUBJECT_PREFIX_MARKER) {
            Some(rest) => rest.chars().skip(1).collect(),
            None => subject,
        }))
    }

    pub fn conversation_topic(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_CONVERSATION_TOPIC, codepage)
    }

    pub fn sender_name(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_SENDER_NAME, codepage)
    }

    pub fn transport_headers(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_TRANSPORT_MESSAGE_HEADERS, codepage)
    }

    pub fn client_submit_time(&self, database: &NodeDatabase) -> io::Result<Option<i64>> {
        read_time(database, &self.properties, PID_TAG_CLIENT_SUBMIT_TIME)
    }

    pub fn delivery_time(&self, database: &NodeDatabase) -> io::Result<Option<i64>> {
        read_time(database, &self.properties, PID_TAG_MESSAGE_DELIVERY_TIME)
    }

    pub fn creation_time(&self, database: &NodeDatabase) -> io::Result<Option<i64>> {
        read_time(database, &self.properties, PID_TAG_CREATION_TIME)
    }

    pub fn modification_time(&self, database: &NodeDatabase) -> io::Result<Option<i64>> {
        read_time(database, &self.properties, PID_TAG_LAST_MODIFICATION_TIME)
    }

    pub fn message_flags(&self, database: &NodeDatabase) -> io::Result<Option<i32>> {
        read_i32(database, &self.properties, PID_TAG_MESSAGE_FLAGS)
    }

    pub fn message_size(&self, database: &NodeDatabase) -> io::Result<Option<i32>> {
        read_i32(database, &self.properties, PID_TAG_MESSAGE_SIZE)
    }

    /// Plain text body.
    pub fn body(&self, database: &NodeDatabase, codepage: Codepage) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_BODY, codepage)
    }

    /// `PidTagRtfCompressed`, decompressed.
    pub fn rtf_body(&self, database: &NodeDatabase) -> io::Result<Option<Vec<u8>>> {
        let Some(compressed) = read_binary(database, &self.properties, PID_TAG_RTF_COMPRESSED)?
        else {
            return Ok(None);
        };
        let rtf = lzfu::decompress(&compressed).map_err(MessagingError::from)?;
        Ok(Some(rtf))
    }

    /// `PidTagBodyHtml` bytes. The property is usually binary, but some writers store a string.
    pub fn html_body(&self, database: &NodeDatabase) -> io::Result<Option<Vec<u8>>> {
        match self.properties.value(database, PID_TAG_BODY_HTML)? {
            None => Ok(None),
            Some(PropertyValue::Binary(value)) => Ok(Some(value)),
            Some(PropertyValue::String8(value)) => Ok(Some(value.as_bytes().to_vec())),
            Some(PropertyValue::Unicode(value)) => Ok(Some(value.into_bytes())),
            Some(value) => Err(unexpected_type(PID_TAG_BODY_HTML, &value).into()),
        }
    }

    /// `None` when the message has no recipient table sub-node.
    pub fn recipient_table(&self, database: &NodeDatabase) -> io::Result<Option<TableContext>> {
        self.read_sub_table(database, NID_RECIPIENT_TABLE)
    }

    /// `None` when the message has no attachments.
    pub fn attachment_table(&self, database: &NodeDatabase) -> io::Result<Option<TableContext>> {
        self.read_sub_table(database, NID_ATTACHMENT_TABLE)
    }

    /// Sub-node ids of the attachments, in attachment table order.
    pub fn attachment_ids(&self, database: &NodeDatabase) -> io::Result<Vec<NodeId>> {
        Ok(self
            .attachment_table(database)?
            .map(|table| table.row_node_ids().collect())
            .unwrap_or_default())
    }

    pub fn read_attachment(&self, database: &NodeDatabase, id: NodeId) -> io::Result<Attachment> {
        Attachment::read(database, self.properties.node(), id)
    }

    fn read_sub_table(
        &self,
        database: &NodeDatabase,
        id: NodeId,
    ) -> io::Result<Option<TableContext>> {
        let node = self.properties.node();
        if node.find_sub_node(id).is_err() {
            return Ok(None);
        }
        let table = node.read_sub_node(database, id)?;
        TableContext::new(database, table).map(Some)
    }
}
