//! Resolution of nodes and blocks through the NBT and BBT of an open file.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    io,
    rc::Rc,
};
use tracing::{debug, trace};

use super::{
    block::{DataTreeBlock, DecodedBlock, LeafSubNodeEntry, RawBlock, SubNodeTreeBlock},
    block_id::BlockId,
    block_ref::BlockRef,
    header::{Header, NdbVersion, HEADER_SIZE},
    node_id::NodeId,
    page::{BTreeEntries, BTreePage, BlockBTreeEntry, NodeBTreeEntry, PageType},
    recover::RecoveredBlocks,
    source::{ByteSource, SourceReader},
    *,
};

/// Caches live as long as the database, which is one open cycle of a file.
pub struct NodeDatabase {
    source: RefCell<SourceReader>,
    header: Header,
    pages: RefCell<BTreeMap<u64, Rc<BTreePage>>>,
    blocks: RefCell<BTreeMap<u64, Rc<DecodedBlock>>>,
}

impl NodeDatabase {
    /// Validate the header and both B-tree roots of `source`.
    pub fn open(source: Box<dyn ByteSource>) -> io::Result<Self> {
        let mut source = SourceReader::new(source)?;
        let buffer = source.read_exact_at(0, HEADER_SIZE)?;
        let mut header_bytes = [0_u8; HEADER_SIZE];
        header_bytes.copy_from_slice(&buffer);
        let header = Header::parse(&header_bytes)?;

        let version = header.version();
        let declared = header.root().file_eof_index();
        let actual = source.size();
        if declared > actual.saturating_add(version.page_size() as u64) {
            return Err(NdbError::DeclaredSizeExceedsSource { declared, actual }.into());
        }

        let database = Self {
            source: RefCell::new(source),
            header,
            pages: Default::default(),
            blocks: Default::default(),
        };

        let root = database.header.root();
        database.read_page(*root.node_btree(), PageType::NodeBTree)?;
        database.read_page(*root.block_btree(), PageType::BlockBTree)?;

        debug!(
            ?version,
            size = actual,
            declared,
            "opened node database"
        );
        Ok(database)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> NdbVersion {
        self.header.version()
    }

    /// Length of the underlying byte source.
    pub fn size(&self) -> u64 {
        self.source.borrow().size()
    }

    /// Raw bytes of the source, bypassing both b-trees.
    pub fn read_bytes(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        self.source.borrow_mut().read_exact_at(offset, size)
    }

    fn read_page(&self, location: BlockRef, page_type: PageType) -> io::Result<Rc<BTreePage>> {
        let key = u64::from(location.index());
        if let Some(page) = self.pages.borrow().get(&key) {
            return Ok(Rc::clone(page));
        }

        trace!(?page_type, offset = key, block = ?location.block(), "read page");
        let version = self.version();
        let data = self
            .source
            .borrow_mut()
            .read_exact_at(key, version.page_size())?;
        let page = Rc::new(BTreePage::read(&data, version, page_type, location)?);
        self.pages.borrow_mut().insert(key, Rc::clone(&page));
        Ok(page)
    }

    /// Descend from `root` to the leaf page which would hold `key`.
    fn find_leaf(
        &self,
        root: BlockRef,
        page_type: PageType,
        key: u64,
    ) -> io::Result<Option<Rc<BTreePage>>> {
        let mut page = self.read_page(root, page_type)?;
        while page.level() > 0 {
            let Some(child) = page.find_child(key) else {
                return Ok(None);
            };
            let child = self.read_page(child, page_type)?;
            if child.level() + 1 != page.level() {
                return Err(NdbError::InvalidBTreePageLevel(child.level()).into());
            }
            page = child;
        }
        Ok(Some(page))
    }

    /// Look up `node` in the NBT.
    pub fn find_node(&self, node: NodeId) -> io::Result<NodeBTreeEntry> {
        let root = *self.header.root().node_btree();
        let key = u64::from(u32::from(node));
        let page = self.find_leaf(root, PageType::NodeBTree, key)?;
        let entry = page.as_deref().and_then(|page| match page.entries() {
            BTreeEntries::Nodes(entries) => entries.iter().find(|entry| entry.node() == node).copied(),
            _ => None,
        });
        entry.ok_or_else(|| NdbError::NodeNotFound(node).into())
    }

    /// Look up `block` in the BBT, ignoring the reserved low bit.
    pub fn find_block(&self, block: BlockId) -> io::Result<BlockBTreeEntry> {
        let root = *self.header.root().block_btree();
        let key = block.search_key();
        let page = self.find_leaf(root, PageType::BlockBTree, key)?;
        let entry = page.as_deref().and_then(|page| match page.entries() {
            BTreeEntries::Blocks(entries) => entries
                .iter()
                .find(|entry| entry.block().block().search_key() == key)
                .copied(),
            _ => None,
        });
        entry.ok_or_else(|| NdbError::BlockNotFound(block).into())
    }

    /// Every NBT leaf entry, in key order.
    pub fn node_entries(&self) -> io::Result<Vec<NodeBTreeEntry>> {
        let entries = self
            .node_leaf_pages()?
            .iter()
            .flat_map(|page| match page.entries() {
                BTreeEntries::Nodes(nodes) => nodes.as_slice(),
                _ => &[],
            })
            .copied()
            .collect::<Vec<_>>();
        debug!(count = entries.len(), "walked node BTree");
        Ok(entries)
    }

    /// Leftover entries in the unused slots of every NBT leaf page, in page order.
    pub fn remnant_node_entries(&self) -> io::Result<Vec<NodeBTreeEntry>> {
        let remnants = self
            .node_leaf_pages()?
            .iter()
            .flat_map(|page| page.remnants())
            .copied()
            .collect::<Vec<_>>();
        debug!(count = remnants.len(), "collected NBT remnants");
        Ok(remnants)
    }

    fn node_leaf_pages(&self) -> io::Result<Vec<Rc<BTreePage>>> {
        let root = *self.header.root().node_btree();
        let mut pages = Vec::new();
        self.collect_node_leaf_pages(root, None, &mut pages)?;
        Ok(pages)
    }

    fn collect_node_leaf_pages(
        &self,
        location: BlockRef,
        expected_level: Option<u8>,
        pages: &mut Vec<Rc<BTreePage>>,
    ) -> io::Result<()> {
        let page = self.read_page(location, PageType::NodeBTree)?;
        if let Some(level) = expected_level {
            if page.level() != level {
                return Err(NdbError::InvalidBTreePageLevel(page.level()).into());
            }
        }

        match page.entries() {
            BTreeEntries::Nodes(_) => pages.push(page),
            BTreeEntries::Intermediate(children) => {
                let level = page.level() - 1;
                for child in children {
                    self.collect_node_leaf_pages(child.child(), Some(level), pages)?;
                }
            }
            BTreeEntries::Blocks(_) => {
                return Err(NdbError::UnexpectedPageType(PageType::BlockBTree).into());
            }
        }
        Ok(())
    }

    /// Read, validate and decode a single block.
    pub fn read_block(&self, block: BlockId) -> io::Result<Rc<DecodedBlock>> {
        self.read_block_from(block, None)
    }

    /// Like [NodeDatabase::read_block], but a block missing from the BBT is looked up in
    /// `recovered`. Blocks found that way bypass the cache, so they never answer a BBT lookup.
    fn read_block_from(
        &self,
        block: BlockId,
        recovered: Option<&RecoveredBlocks>,
    ) -> io::Result<Rc<DecodedBlock>> {
        let key = block.search_key();
        if let Some(decoded) = self.blocks.borrow().get(&key) {
            return Ok(Rc::clone(decoded));
        }

        let entry = match (self.find_block(block), recovered) {
            (Ok(entry), _) => entry,
            (Err(err), Some(recovered)) if is_block_not_found(&err) => {
                return self.read_recovered_block(block, recovered);
            }
            (Err(err), _) => return Err(err),
        };
        let decoded = Rc::new(self.decode_block(&entry)?);
        self.blocks.borrow_mut().insert(key, Rc::clone(&decoded));
        Ok(decoded)
    }

    /// The first scanned copy of `block` which still validates.
    fn read_recovered_block(
        &self,
        block: BlockId,
        recovered: &RecoveredBlocks,
    ) -> io::Result<Rc<DecodedBlock>> {
        for entry in recovered.candidates(block) {
            match self.decode_block(entry) {
                Ok(decoded) => return Ok(Rc::new(decoded)),
                Err(err) if is_invalid_data(&err) => {
                    trace!(?block, offset = ?entry.block().index(), "skipped scanned block: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Err(NdbError::BlockNotFound(block).into())
    }

    fn decode_block(&self, entry: &BlockBTreeEntry) -> io::Result<DecodedBlock> {
        let version = self.version();
        let offset = u64::from(entry.block().index());
        let size = version.block_size(usize::from(entry.size()));
        trace!(block = ?entry.block().block(), offset, size, "read block");

        let buffer = self.source.borrow_mut().read_exact_at(offset, size)?;
        let raw = RawBlock::read(&buffer, version, entry)?;
        Ok(raw.decode(self.header.crypt_method())?)
    }

    /// Resolve the data tree rooted at `block` into its leaf data blocks, in order.
    pub fn read_data(&self, block: BlockId) -> io::Result<Vec<Rc<DecodedBlock>>> {
        self.read_data_from(block, None)
    }

    fn read_data_from(
        &self,
        block: BlockId,
        recovered: Option<&RecoveredBlocks>,
    ) -> io::Result<Vec<Rc<DecodedBlock>>> {
        if block.is_empty() {
            return Ok(Vec::new());
        }

        let root = self.read_block_from(block, recovered)?;
        if !block.is_internal() {
            return Ok(vec![root]);
        }

        let version = self.version();
        let tree = DataTreeBlock::read(root.data(), version)?;
        let mut leaves = Vec::new();
        for entry in tree.entries() {
            if tree.level() == 1 {
                leaves.push(self.read_block_from(*entry, recovered)?);
                continue;
            }

            if !entry.is_internal() {
                return Err(NdbError::ExpectedInternalBlock(*entry).into());
            }
            let child = self.read_block_from(*entry, recovered)?;
            let child = DataTreeBlock::read(child.data(), version)?;
            if child.level() != 1 {
                return Err(NdbError::InvalidInternalBlockLevel(child.level()).into());
            }
            for leaf in child.entries() {
                leaves.push(self.read_block_from(*leaf, recovered)?);
            }
        }

        let actual = leaves
            .iter()
            .map(|leaf| leaf.data().len() as u64)
            .sum::<u64>();
        if actual != u64::from(tree.total_size()) {
            return Err(NdbError::MismatchDataTreeSize {
                expected: tree.total_size(),
                actual,
            }
            .into());
        }

        Ok(leaves)
    }

    /// Resolve the sub-node tree rooted at `block` into its leaf entries.
    pub fn read_sub_nodes(&self, block: BlockId) -> io::Result<BTreeMap<NodeId, LeafSubNodeEntry>> {
        self.read_sub_nodes_from(block, None)
    }

    fn read_sub_nodes_from(
        &self,
        block: BlockId,
        recovered: Option<&RecoveredBlocks>,
    ) -> io::Result<BTreeMap<NodeId, LeafSubNodeEntry>> {
        let mut entries = BTreeMap::new();
        self.collect_sub_nodes(block, true, recovered, &mut entries)?;
        Ok(entries)
    }

    fn collect_sub_nodes(
        &self,
        block: BlockId,
        allow_intermediate: bool,
        recovered: Option<&RecoveredBlocks>,
        entries: &mut BTreeMap<NodeId, LeafSubNodeEntry>,
    ) -> io::Result<()> {
        if !block.is_internal() {
            return Err(NdbError::ExpectedInternalBlock(block).into());
        }

        let data = self.read_block_from(block, recovered)?;
        match SubNodeTreeBlock::read(data.data(), self.version())? {
            SubNodeTreeBlock::Leaf(leaves) => {
                entries.extend(leaves.into_iter().map(|entry| (entry.node(), entry)));
            }
            SubNodeTreeBlock::Intermediate(children) => {
                if !allow_intermediate {
                    return Err(NdbError::InvalidInternalBlockLevel(1).into());
                }
                for child in children {
                    self.collect_sub_nodes(child.block(), false, recovered, entries)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a node from the NBT along with its data and sub-node trees.
    pub fn read_node(&self, node: NodeId) -> io::Result<Node> {
        let entry = self.find_node(node)?;
        self.read_node_entry(&entry)
    }

    /// Resolve the data and sub-node trees `entry` names.
    pub fn read_node_entry(&self, entry: &NodeBTreeEntry) -> io::Result<Node> {
        Node::resolve(self, entry.node(), Some(entry.parent()), entry.data(), entry.sub_node(), None)
    }

    /// Like [NodeDatabase::read_node_entry], for an entry which is no longer in the NBT. Blocks
    /// missing from the BBT come from `recovered`, here and in every sub-node of the result.
    pub fn read_recovered_node(
        &self,
        entry: &NodeBTreeEntry,
        recovered: &Rc<RecoveredBlocks>,
    ) -> io::Result<Node> {
        Node::resolve(
            self,
            entry.node(),
            Some(entry.parent()),
            entry.data(),
            entry.sub_node(),
            Some(recovered),
        )
    }

    /// Like [NodeDatabase::read_node], but `None` when the NBT has no entry for `node`.
    pub fn read_node_if_present(&self, node: NodeId) -> io::Result<Option<Node>> {
        let entry = match self.find_node(node) {
            Ok(entry) => entry,
            Err(err) if is_node_not_found(&err) => return Ok(None),
            Err(err) => return Err(err),
        };
        self.read_node_entry(&entry).map(Some)
    }

    /// Number of blocks decoded so far in this open cycle.
    pub fn cached_block_count(&self) -> usize {
        self.blocks.borrow().len()
    }
}

fn is_node_not_found(err: &io::Error) -> bool {
    matches!(
        err.get_ref().and_then(|err| err.downcast_ref::<NdbError>()),
        Some(NdbError::NodeNotFound(_))
    )
}

fn is_block_not_found(err: &io::Error) -> bool {
    matches!(
        err.get_ref().and_then(|err| err.downcast_ref::<NdbError>()),
        Some(NdbError::BlockNotFound(_))
    )
}

/// A node's data and the directory of its sub-nodes.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    blocks: Vec<Rc<DecodedBlock>>,
    sub_nodes: BTreeMap<NodeId, LeafSubNodeEntry>,
    recovered: Option<Rc<RecoveredBlocks>>,
}

impl Node {
    fn resolve(
        database: &NodeDatabase,
        id: NodeId,
        parent: Option<NodeId>,
        data: BlockId,
        sub_node: Option<BlockId>,
        recovered: Option<&Rc<RecoveredBlocks>>,
    ) -> io::Result<Self> {
        let scanned = recovered.map(Rc::as_ref);
        let blocks = database.read_data_from(data, scanned)?;
        let sub_nodes = match sub_node {
            Some(block) => database.read_sub_nodes_from(block, scanned)?,
            None => Default::default(),
        };

        Ok(Self {
            id,
            parent,
            blocks,
            sub_nodes,
            recovered: recovered.cloned(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Only set for nodes in the NBT.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn blocks(&self) -> &[Rc<DecodedBlock>] {
        &self.blocks
    }

    /// The node's data blocks concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.blocks
            .iter()
            .flat_map(|block| block.data().iter().copied())
            .collect()
    }

    pub fn sub_nodes(&self) -> impl Iterator<Item = &LeafSubNodeEntry> {
        self.sub_nodes.values()
    }

    pub fn find_sub_node(&self, id: NodeId) -> NdbResult<&LeafSubNodeEntry> {
        self.sub_nodes
            .get(&id)
            .ok_or(NdbError::SubNodeNotFound(id))
    }

    /// Resolve one of this node's sub-nodes as a node of its own.
    pub fn read_sub_node(&self, database: &NodeDatabase, id: NodeId) -> io::Result<Node> {
        let entry = *self.find_sub_node(id)?;
        Node::resolve(
            database,
            id,
            None,
            entry.data(),
            entry.sub_node(),
            self.recovered.as_ref(),
        )
    }

    /// Whether blocks of this node may come from a scan rather than the BBT.
    pub fn is_recovered(&self) -> bool {
        self.recovered.is_some()
    }
}
