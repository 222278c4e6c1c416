//! Items: typed views over the nodes of an open file.

use std::{
    cell::Cell,
    collections::BTreeMap,
    fmt::Debug,
    io,
    rc::{Rc, Weak},
};

use crate::{
    codepage::Codepage,
    error::{PffError, PffResult},
    file::OpenFile,
    ltp::{prop_context::PropertyContext, prop_value::PropertyValue},
    messaging::{
        attachment::{Attachment, AttachmentMethod},
        folder::Folder,
        message::Message,
        read_text,
        store::MessageStore,
        tags::PID_TAG_DISPLAY_NAME,
    },
    ndb::{
        database::Node,
        node_id::{NodeId, NodeIdType, NID_MESSAGE_STORE},
        NdbError,
    },
};

/// What an [Item] represents, derived from its node id.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ItemType {
    /// The internal root and every node which is not one of the other types.
    Internal,
    MessageStore,
    /// Normal and search folders.
    Folder,
    Message,
    Attachment,
    /// Folder associated information (FAI).
    FolderAssociatedItem,
}

impl ItemType {
    fn from_node(node: NodeId) -> Self {
        if node == NID_MESSAGE_STORE {
            return Self::MessageStore;
        }
        match node.id_type() {
            Ok(NodeIdType::NormalFolder | NodeIdType::SearchFolder) => Self::Folder,
            Ok(NodeIdType::NormalMessage) => Self::Message,
            Ok(NodeIdType::AssociatedMessage) => Self::FolderAssociatedItem,
            Ok(NodeIdType::Attachment) => Self::Attachment,
            _ => Self::Internal,
        }
    }

    fn is_message(self) -> bool {
        matches!(self, Self::Message | Self::FolderAssociatedItem)
    }
}

/// Where an item's properties come from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum ItemSource {
    Root,
    Node(NodeId),
    /// A deleted node, by position in the recovered list of the open file.
    Recovered { index: usize, node: NodeId },
    /// A sub-node of a message.
    Attachment {
        message: Rc<ItemSource>,
        attachment: NodeId,
    },
    /// A sub-node of an embedded message attachment.
    EmbeddedMessage {
        attachment: Rc<ItemSource>,
        message: NodeId,
    },
}

impl ItemSource {
    /// The node holding the item's property context. `None` for the internal root.
    fn read_node(&self, file: &OpenFile) -> PffResult<Option<Node>> {
        let database = file.database();
        let node = match self {
            Self::Root => return Ok(None),
            Self::Node(node) => database.read_node(*node)?,
            Self::Recovered { index, node } => file
                .recovered()?
                .read_node(database, *index)?
                .ok_or_else(|| io::Error::from(NdbError::NodeNotFound(*node)))?,
            Self::Attachment {
                message: parent,
                attachment: id,
            }
            | Self::EmbeddedMessage {
                attachment: parent,
                message: id,
            } => {
                let parent = parent
                    .read_node(file)?
                    .ok_or_else(|| io::Error::from(NdbError::SubNodeNotFound(*id)))?;
                parent.read_sub_node(database, *id)?
            }
        };
        Ok(Some(node))
    }
}

/// One node of an open file. Items only hold a weak reference to the file, so every accessor
/// fails with [PffError::NotOpen] once the file is closed.
#[derive(Clone)]
pub struct Item {
    file: Weak<OpenFile>,
    codepage: Rc<Cell<Codepage>>,
    source: ItemSource,
    item_type: ItemType,
}

impl Item {
    pub(crate) fn new(file: Weak<OpenFile>, codepage: Rc<Cell<Codepage>>, source: ItemSource) -> Self {
        let item_type = match &source {
            ItemSource::Root => ItemType::Internal,
            ItemSource::Node(node) | ItemSource::Recovered { node, .. } => {
                ItemType::from_node(*node)
            }
            ItemSource::Attachment { .. } => ItemType::Attachment,
            ItemSource::EmbeddedMessage { .. } => ItemType::Message,
        };
        Self {
            file,
            codepage,
            source,
            item_type,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// The node id, or 0 for the internal root.
    pub fn identifier(&self) -> u32 {
        self.node_id().map(u32::from).unwrap_or_default()
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match &self.source {
            ItemSource::Root => None,
            ItemSource::Node(node)
            | ItemSource::Recovered { node, .. }
            | ItemSource::Attachment {
                attachment: node, ..
            }
            | ItemSource::EmbeddedMessage { message: node, .. } => Some(*node),
        }
    }

    /// Whether the item was found by [PffFile::recover_items](crate::file::PffFile::recover_items)
    /// rather than in the item tree.
    pub fn is_recovered(&self) -> bool {
        matches!(self.source, ItemSource::Recovered { .. })
    }

    fn file(&self) -> PffResult<Rc<OpenFile>> {
        self.file.upgrade().ok_or(PffError::NotOpen)
    }

    fn item(&self, source: ItemSource) -> Item {
        Item::new(Weak::clone(&self.file), Rc::clone(&self.codepage), source)
    }

    fn expect_type(&self, expected: ItemType) -> PffResult<()> {
        let matches = match expected {
            ItemType::Message => self.item_type.is_message(),
            _ => self.item_type == expected,
        };
        if !matches {
            return Err(PffError::UnexpectedItemType {
                expected,
                actual: self.item_type,
            });
        }
        Ok(())
    }

    /// Children in the item tree. Only the root and NBT nodes are in it.
    fn sub_item_ids(&self, file: &OpenFile) -> PffResult<Vec<NodeId>> {
        Ok(match &self.source {
            ItemSource::Root => file.item_tree()?.root_items().to_vec(),
            ItemSource::Node(node) => file.item_tree()?.children(*node).to_vec(),
            _ => vec![],
        })
    }

    /// The node behind an item of the `expected` type.
    fn typed_node(&self, file: &OpenFile, expected: ItemType) -> PffResult<Node> {
        self.expect_type(expected)?;
        self.source
            .read_node(file)?
            .ok_or(PffError::UnexpectedItemType {
                expected,
                actual: self.item_type,
            })
    }

    pub fn number_of_sub_items(&self) -> PffResult<usize> {
        let file = self.file()?;
        Ok(self.sub_item_ids(&file)?.len())
    }

    pub fn sub_item(&self, index: usize) -> PffResult<Item> {
        let file = self.file()?;
        let ids = self.sub_item_ids(&file)?;
        let node = ids
            .get(index)
            .copied()
            .ok_or(PffError::SubItemIndexOutOfRange {
                index,
                count: ids.len(),
            })?;
        Ok(self.item(ItemSource::Node(node)))
    }

    pub fn sub_items(&self) -> PffResult<Vec<Item>> {
        let file = self.file()?;
        Ok(self
            .sub_item_ids(&file)?
            .into_iter()
            .map(|node| self.item(ItemSource::Node(node)))
            .collect())
    }

    fn property_context(&self, file: &OpenFile) -> PffResult<Option<PropertyContext>> {
        let Some(node) = self.source.read_node(file)? else {
            return Ok(None);
        };
        let properties = PropertyContext::new(node).map_err(io::Error::from)?;
        Ok(Some(properties))
    }

    /// Every property of the item. Empty for the internal root.
    pub fn properties(&self) -> PffResult<BTreeMap<u16, PropertyValue>> {
        let file = self.file()?;
        let Some(properties) = self.property_context(&file)? else {
            return Ok(Default::default());
        };
        Ok(properties.properties(file.database())?)
    }

    pub fn property(&self, prop_id: u16) -> PffResult<Option<PropertyValue>> {
        let file = self.file()?;
        let Some(properties) = self.property_context(&file)? else {
            return Ok(None);
        };
        Ok(properties.value(file.database(), prop_id)?)
    }

    /// `PidTagDisplayName`, decoded with the file's ANSI codepage when stored as `PtypString8`.
    pub fn display_name(&self) -> PffResult<Option<String>> {
        let file = self.file()?;
        let Some(properties) = self.property_context(&file)? else {
            return Ok(None);
        };
        Ok(read_text(
            file.database(),
            &properties,
            PID_TAG_DISPLAY_NAME,
            self.codepage.get(),
        )?)
    }

    /// The value of a string property, decoded like [Item::display_name].
    pub fn text(&self, prop_id: u16) -> PffResult<Option<String>> {
        let file = self.file()?;
        let Some(properties) = self.property_context(&file)? else {
            return Ok(None);
        };
        Ok(read_text(file.database(), &properties, prop_id, self.codepage.get())?)
    }

    /// Entry id of the IPM subtree, read from the message store.
    pub fn ipm_sub_tree_node_id(&self) -> PffResult<Option<NodeId>> {
        self.expect_type(ItemType::MessageStore)?;
        let file = self.file()?;
        let store = MessageStore::read(file.database())?;
        Ok(store
            .ipm_sub_tree_entry_id(file.database())?
            .map(|entry_id| entry_id.node_id()))
    }

    fn folder(&self) -> PffResult<(Rc<OpenFile>, Folder)> {
        let file = self.file()?;
        let folder = Folder::new(self.typed_node(&file, ItemType::Folder)?)?;
        Ok((file, folder))
    }

    fn children_of_type(&self, item_type: ItemType) -> PffResult<Vec<NodeId>> {
        self.expect_type(ItemType::Folder)?;
        let file = self.file()?;
        Ok(self
            .sub_item_ids(&file)?
            .into_iter()
            .filter(|node| ItemType::from_node(*node) == item_type)
            .collect())
    }

    fn indexed_child(&self, item_type: ItemType, index: usize) -> PffResult<Item> {
        let ids = self.children_of_type(item_type)?;
        let node = ids
            .get(index)
            .copied()
            .ok_or(PffError::SubItemIndexOutOfRange {
                index,
                count: ids.len(),
            })?;
        Ok(self.item(ItemSource::Node(node)))
    }

    pub fn number_of_sub_folders(&self) -> PffResult<usize> {
        Ok(self.children_of_type(ItemType::Folder)?.len())
    }

    pub fn sub_folder(&self, index: usize) -> PffResult<Item> {
        self.indexed_child(ItemType::Folder, index)
    }

    pub fn number_of_sub_messages(&self) -> PffResult<usize> {
        Ok(self.children_of_type(ItemType::Message)?.len())
    }

    pub fn sub_message(&self, index: usize) -> PffResult<Item> {
        self.indexed_child(ItemType::Message, index)
    }

    pub fn content_count(&self) -> PffResult<Option<i32>> {
        let (file, folder) = self.folder()?;
        Ok(folder.content_count(file.database())?)
    }

    pub fn unread_count(&self) -> PffResult<Option<i32>> {
        let (file, folder) = self.folder()?;
        Ok(folder.unread_count(file.database())?)
    }

    pub fn has_sub_folders(&self) -> PffResult<Option<bool>> {
        let (file, folder) = self.folder()?;
        Ok(folder.has_sub_folders(file.database())?)
    }

    pub fn container_class(&self) -> PffResult<Option<String>> {
        let (file, folder) = self.folder()?;
        Ok(folder.container_class(file.database(), self.codepage.get())?)
    }

    fn message(&self) -> PffResult<(Rc<OpenFile>, Message)> {
        let file = self.file()?;
        let message = Message::new(self.typed_node(&file, ItemType::Message)?)?;
        Ok((file, message))
    }

    pub fn message_class(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.message_class(file.database(), self.codepage.get())?)
    }

    pub fn subject(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.subject(file.database(), self.codepage.get())?)
    }

    pub fn conversation_topic(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.conversation_topic(file.database(), self.codepage.get())?)
    }

    pub fn sender_name(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.sender_name(file.database(), self.codepage.get())?)
    }

    pub fn transport_headers(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.transport_headers(file.database(), self.codepage.get())?)
    }

    /// `FILETIME` value: 100-nanosecond intervals since January 1, 1601.
    pub fn client_submit_time(&self) -> PffResult<Option<i64>> {
        let (file, message) = self.message()?;
        Ok(message.client_submit_time(file.database())?)
    }

    pub fn delivery_time(&self) -> PffResult<Option<i64>> {
        let (file, message) = self.message()?;
        Ok(message.delivery_time(file.database())?)
    }

    pub fn creation_time(&self) -> PffResult<Option<i64>> {
        let (file, message) = self.message()?;
        Ok(message.creation_time(file.database())?)
    }

    pub fn modification_time(&self) -> PffResult<Option<i64>> {
        let (file, message) = self.message()?;
        Ok(message.modification_time(file.database())?)
    }

    pub fn plain_text_body(&self) -> PffResult<Option<String>> {
        let (file, message) = self.message()?;
        Ok(message.body(file.database(), self.codepage.get())?)
    }

    pub fn rtf_body(&self) -> PffResult<Option<Vec<u8>>> {
        let (file, message) = self.message()?;
        Ok(message.rtf_body(file.database())?)
    }

    pub fn html_body(&self) -> PffResult<Option<Vec<u8>>> {
        let (file, message) = self.message()?;
        Ok(message.html_body(file.database())?)
    }

    /// One map of present columns per recipient table row.
    pub fn recipients(&self) -> PffResult<Vec<BTreeMap<u16, PropertyValue>>> {
        let (file, message) = self.message()?;
        let database = file.database();
        let Some(table) = message.recipient_table(database)? else {
            return Ok(vec![]);
        };
        let mut recipients = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            recipients.push(table.row_values(database, row)?);
        }
        Ok(recipients)
    }

    pub fn number_of_attachments(&self) -> PffResult<usize> {
        let (file, message) = self.message()?;
        Ok(message.attachment_ids(file.database())?.len())
    }

    pub fn attachment(&self, index: usize) -> PffResult<Item> {
        let (file, message) = self.message()?;
        let ids = message.attachment_ids(file.database())?;
        let attachment = ids
            .get(index)
            .copied()
            .ok_or(PffError::SubItemIndexOutOfRange {
                index,
                count: ids.len(),
            })?;
        Ok(self.item(ItemSource::Attachment {
            message: Rc::new(self.source.clone()),
            attachment,
        }))
    }

    pub fn attachments(&self) -> PffResult<Vec<Item>> {
        let (file, message) = self.message()?;
        let source = Rc::new(self.source.clone());
        Ok(message
            .attachment_ids(file.database())?
            .into_iter()
            .map(|attachment| {
                self.item(ItemSource::Attachment {
                    message: Rc::clone(&source),
                    attachment,
                })
            })
            .collect())
    }

    fn attachment_object(&self) -> PffResult<(Rc<OpenFile>, Attachment)> {
        let file = self.file()?;
        let attachment = Attachment::new(self.typed_node(&file, ItemType::Attachment)?)?;
        Ok((file, attachment))
    }

    pub fn attachment_method(&self) -> PffResult<Option<AttachmentMethod>> {
        let (file, attachment) = self.attachment_object()?;
        Ok(attachment.method(file.database())?)
    }

    pub fn attachment_size(&self) -> PffResult<Option<i32>> {
        let (file, attachment) = self.attachment_object()?;
        Ok(attachment.size(file.database())?)
    }

    pub fn attachment_filename(&self) -> PffResult<Option<String>> {
        let (file, attachment) = self.attachment_object()?;
        Ok(attachment.filename(file.database(), self.codepage.get())?)
    }

    pub fn attachment_mime_type(&self) -> PffResult<Option<String>> {
        let (file, attachment) = self.attachment_object()?;
        Ok(attachment.mime_type(file.database(), self.codepage.get())?)
    }

    pub fn attachment_data(&self) -> PffResult<Option<Vec<u8>>> {
        let (file, attachment) = self.attachment_object()?;
        Ok(attachment.data(file.database())?)
    }

    /// The message inside an [AttachmentMethod::EmbeddedMessage] attachment. `None` for every
    /// other method.
    pub fn embedded_message(&self) -> PffResult<Option<Item>> {
        let (file, attachment) = self.attachment_object()?;
        let Some(message) = attachment.embedded_message(file.database())? else {
            return Ok(None);
        };
        Ok(Some(self.item(ItemSource::EmbeddedMessage {
            attachment: Rc::new(self.source.clone()),
            message,
        })))
    }
}

impl Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("item_type", &self.item_type)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
