//! Recovery of deleted nodes.
//!
//! Deleting a node removes it from the NBT and its blocks from the BBT, but neither is
//! overwritten until the space is reused. The NBT leaf pages keep stale `NBTENTRY` records past
//! `cEnt`, and the blocks can be found again by scanning the file for valid block trailers.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Cursor},
    rc::Rc,
};
use tracing::{debug, trace};

use super::{
    block::BlockTrailer,
    block_id::BlockId,
    block_ref::BlockRef,
    byte_index::ByteIndex,
    database::{Node, NodeDatabase},
    header::NdbVersion,
    page::{BlockBTreeEntry, NodeBTreeEntry},
    *,
};
use crate::{block_sig::compute_sig, crc::compute_crc};

/// Blocks start after the header and the first allocation maps.
const FIRST_BLOCK_OFFSET: u64 = 0x4400;

const SCAN_WINDOW: u64 = 1 << 20;

/// Every block in the file whose trailer still validates, keyed by BBT search key.
#[derive(Clone, Default, Debug)]
pub struct RecoveredBlocks {
    blocks: BTreeMap<u64, Vec<BlockBTreeEntry>>,
}

impl RecoveredBlocks {
    /// Check the trailer at every aligned block end between the first block and the end of the
    /// source.
    pub fn scan(database: &NodeDatabase) -> io::Result<Self> {
        let version = database.version();
        let alignment = version.block_alignment() as u64;
        let max_block_size = version.max_block_size() as u64;
        let size = database.size();

        let mut blocks = BTreeMap::<u64, Vec<BlockBTreeEntry>>::new();
        let mut count = 0;
        let mut end = FIRST_BLOCK_OFFSET + alignment;
        while end <= size {
            // A window starting a whole block before `end` holds every block ending inside it.
            let window_start = end.saturating_sub(max_block_size).max(FIRST_BLOCK_OFFSET);
            let window_end = (window_start + SCAN_WINDOW).min(size);
            let window = database.read_bytes(window_start, (window_end - window_start) as usize)?;

            while end <= window_end {
                if let Some(entry) = scan_trailer(&window, window_start, end, version) {
                    let key = entry.block().block().search_key();
                    blocks.entry(key).or_default().push(entry);
                    count += 1;
                }
                end += alignment;
            }
        }

        debug!(count, "scanned for blocks");
        Ok(Self { blocks })
    }

    /// Copies of `block` found by the scan, in file order.
    pub fn candidates(&self, block: BlockId) -> &[BlockBTreeEntry] {
        self.blocks
            .get(&block.search_key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// The block ending at `end`, if its trailer holds a size, id, CRC and signature which all agree
/// with the bytes in front of it.
fn scan_trailer(
    window: &[u8],
    window_start: u64,
    end: u64,
    version: NdbVersion,
) -> Option<BlockBTreeEntry> {
    let trailer_size = version.block_trailer_size() as u64;
    let trailer_start = usize::try_from(end.checked_sub(trailer_size + window_start)?).ok()?;
    let mut cursor = Cursor::new(window.get(trailer_start..)?);
    let trailer = BlockTrailer::read(&mut cursor, version).ok()?;

    let size = usize::from(trailer.size());
    let footprint = version.block_size(size);
    if size == 0 || trailer.block_id().is_empty() || footprint > version.max_block_size() {
        return None;
    }

    let start = end.checked_sub(footprint as u64)?;
    if start < window_start {
        return None;
    }
    let offset = (start - window_start) as usize;
    let data = window.get(offset..offset + size)?;
    if compute_crc(0, data) != trailer.crc() {
        return None;
    }
    if compute_sig(start, u64::from(trailer.block_id())) != trailer.signature() {
        return None;
    }

    let location = BlockRef::new(trailer.block_id(), ByteIndex::from(start));
    Some(BlockBTreeEntry::new(location, trailer.size(), 0))
}

/// Deleted nodes whose data and sub-node trees can still be read, in NBT page order.
#[derive(Clone, Debug)]
pub struct RecoveredNodes {
    entries: Vec<NodeBTreeEntry>,
    blocks: Rc<RecoveredBlocks>,
}

impl RecoveredNodes {
    pub fn recover(database: &NodeDatabase) -> io::Result<Self> {
        let live = database.node_entries()?;
        let remnants = database.remnant_node_entries()?;
        let candidates = select_candidates(&live, &remnants);
        if candidates.is_empty() {
            debug!("no deleted nodes to recover");
            return Ok(Self {
                entries: Vec::new(),
                blocks: Default::default(),
            });
        }

        let blocks = Rc::new(RecoveredBlocks::scan(database)?);
        let mut entries = Vec::with_capacity(candidates.len());
        for entry in candidates {
            match database.read_recovered_node(&entry, &blocks) {
                Ok(_) => entries.push(entry),
                Err(err) if is_invalid_data(&err) => {
                    trace!(node = ?entry.node(), "unrecoverable node: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        debug!(count = entries.len(), "recovered nodes");
        Ok(Self { entries, blocks })
    }

    pub fn entries(&self) -> &[NodeBTreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` past the end.
    pub fn read_node(&self, database: &NodeDatabase, index: usize) -> io::Result<Option<Node>> {
        let Some(entry) = self.entries.get(index) else {
            return Ok(None);
        };
        database.read_recovered_node(entry, &self.blocks).map(Some)
    }
}

/// Remnants with data which are neither still in the tree nor repeated.
fn select_candidates(
    live: &[NodeBTreeEntry],
    remnants: &[NodeBTreeEntry],
) -> Vec<NodeBTreeEntry> {
    let key = |entry: &NodeBTreeEntry| (entry.node(), entry.data(), entry.sub_node());
    let live = live.iter().map(key).collect::<BTreeSet<_>>();
    let mut seen = BTreeSet::new();
    remnants
        .iter()
        .filter(|entry| !entry.data().is_empty())
        .filter(|entry| !live.contains(&key(entry)) && seen.insert(key(entry)))
        .copied()
        .collect()
}
