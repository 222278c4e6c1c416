//! ## [Folders](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/dee5b9d0-5513-4c5e-94aa-8bd28a9350b2)

use std::io;
use tracing::trace;

use super::{tags::*, *};
use crate::{
    ltp::table_context::TableContext,
    ndb::{database::Node, node_id::NodeIdType},
};

/// A folder's property context. Its tables are separate nodes sharing the folder's NID index.
#[derive(Debug)]
pub struct Folder {
    node_id: NodeId,
    properties: PropertyContext,
}

impl Folder {
    pub fn read(database: &NodeDatabase, node_id: NodeId) -> io::Result<Self> {
        Self::new(database.read_node(node_id)?)
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

    pub fn display_name(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_DISPLAY_NAME, codepage)
    }

    pub fn container_class(
        &self,
        database: &NodeDatabase,
        codepage: Codepage,
    ) -> io::Result<Option<String>> {
        read_text(database, &self.properties, PID_TAG_CONTAINER_CLASS, codepage)
    }

    pub fn content_count(&self, database: &NodeDatabase) -> io::Result<Option<i32>> {
        read_i32(database, &self.properties, PID_TAG_CONTENT_COUNT)
    }

    pub fn unread_count(&self, database: &NodeDatabase) -> io::Result<Option<i32>> {
        read_i32(database, &self.properties, PID_TAG_CONTENT_UNREAD_COUNT)
    }

    pub fn has_sub_folders(&self, database: &NodeDatabase) -> io::Result<Option<bool>> {
        read_bool(database, &self.properties, PID_TAG_SUBFOLDERS)
    }

    pub fn hierarchy_table(&self, database: &NodeDatabase) -> io::Result<Option<TableContext>> {
        self.read_table(database, NodeIdType::HierarchyTable)
    }

    pub fn contents_table(&self, database: &NodeDatabase) -> io::Result<Option<TableContext>> {
        self.read_table(database, NodeIdType::ContentsTable)
    }

    pub fn associated_contents_table(
        &self,
        database: &NodeDatabase,
    ) -> io::Result<Option<TableContext>> {
        self.read_table(database, NodeIdType::AssociatedContentsTable)
    }

    fn read_table(
        &self,
        database: &NodeDatabase,
        id_type: NodeIdType,
    ) -> io::Result<Option<TableContext>> {
        let node_id = self.node_id.with_type(id_type);
        let Some(node) = database.read_node_if_present(node_id)? else {
            trace!(folder = ?self.node_id, ?id_type, "no table node");
            return Ok(None);
        };
        TableContext::new(database, node).map(Some)
    }
}
