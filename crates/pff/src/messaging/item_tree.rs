//! Parent/child links between the nodes of the NBT, and the orphans which have none.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    io,
};
use tracing::{debug, warn};

use super::*;
use crate::ndb::{is_invalid_data, node_id::NID_ROOT_FOLDER, page::NodeBTreeEntry};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum OrphanReason {
    MissingParent(NodeId),
    DanglingData,
    ParentCycle,
}

#[derive(Clone, Default, Debug)]
struct ItemTreeEntry {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Every NBT node hangs under the internal root, under its parent, or is an orphan.
#[derive(Clone, Default, Debug)]
pub struct ItemTree {
    root_folder: Option<NodeId>,
    root_items: Vec<NodeId>,
    entries: BTreeMap<NodeId, ItemTreeEntry>,
    orphans: Vec<NodeId>,
}

impl ItemTree {
    /// Walk the NBT and link every node to its parent. Nodes whose data or sub-node tree does
    /// not read back are orphans.
    pub fn build(database: &NodeDatabase) -> io::Result<Self> {
        let entries = database.node_entries()?;
        let mut dangling = BTreeSet::new();
        for entry in &entries {
            match check_node(database, entry) {
                Ok(()) => {}
                Err(err) if is_invalid_data(&err) => {
                    warn!(node = ?entry.node(), block = ?entry.data(), "unreadable node: {err}");
                    dangling.insert(entry.node());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Self::from_entries(&entries, &dangling))
    }

    /// Link `entries`, given in NBT order, treating the nodes in `dangling` as unreadable.
    pub fn from_entries(entries: &[NodeBTreeEntry], dangling: &BTreeSet<NodeId>) -> Self {
        let mut tree = Self::default();
        let mut reasons = BTreeMap::new();

        for entry in entries {
            tree.entries.entry(entry.node()).or_default();
        }

        for entry in entries {
            let node = entry.node();
            let parent = entry.parent();

            if dangling.contains(&node) {
                reasons.insert(node, OrphanReason::DanglingData);
                continue;
            }

            if node == NID_ROOT_FOLDER {
                tree.root_folder = Some(node);
                tree.root_items.push(node);
                continue;
            }

            if u32::from(parent) == 0 {
                tree.root_items.push(node);
                continue;
            }

            match tree.entries.get_mut(&parent) {
                Some(parent_entry) => parent_entry.children.push(node),
                None => {
                    reasons.insert(node, OrphanReason::MissingParent(parent));
                    continue;
                }
            }
            if let Some(entry) = tree.entries.get_mut(&node) {
                entry.parent = Some(parent);
            }
        }

        let mut reachable = BTreeSet::new();
        let starts = tree
            .root_items
            .iter()
            .chain(reasons.keys())
            .copied()
            .collect::<Vec<_>>();
        tree.mark_reachable(starts, &mut reachable);

        // Whatever is still unreachable hangs off a parent chain that loops. Breaking each loop
        // at the first repeated node keeps the rest of the chain attached.
        for entry in entries {
            if reachable.contains(&entry.node()) {
                continue;
            }

            let mut seen = BTreeSet::new();
            let mut current = entry.node();
            while seen.insert(current) {
                match tree.entries.get(&current).and_then(|entry| entry.parent) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }

            tree.detach(current);
            reasons.insert(current, OrphanReason::ParentCycle);
            tree.mark_reachable(vec![current], &mut reachable);
        }

        tree.orphans = entries
            .iter()
            .map(NodeBTreeEntry::node)
            .filter(|node| reasons.contains_key(node))
            .collect();
        for (node, reason) in &reasons {
            warn!(?node, ?reason, "orphan item");
        }

        debug!(
            nodes = tree.entries.len(),
            root_items = tree.root_items.len(),
            orphans = tree.orphans.len(),
            "built item tree"
        );
        tree
    }

    fn mark_reachable(&self, starts: Vec<NodeId>, reachable: &mut BTreeSet<NodeId>) {
        let mut queue = VecDeque::from(starts);
        while let Some(node) = queue.pop_front() {
            if !reachable.insert(node) {
                continue;
            }
            if let Some(entry) = self.entries.get(&node) {
                queue.extend(entry.children.iter().copied());
            }
        }
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self
            .entries
            .get_mut(&node)
            .and_then(|entry| entry.parent.take())
        else {
            return;
        };
        if let Some(parent) = self.entries.get_mut(&parent) {
            parent.children.retain(|child| *child != node);
        }
    }

    /// The self-parented root folder, if the NBT has one.
    pub fn root_folder(&self) -> Option<NodeId> {
        self.root_folder
    }

    /// Children of the internal root: the root folder and every node with parent 0.
    pub fn root_items(&self) -> &[NodeId] {
        &self.root_items
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attached children of `node`, in NBT order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.entries
            .get(&node)
            .map(|entry| entry.children.as_slice())
            .unwrap_or_default()
    }

    /// `None` for orphans and for children of the internal root.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.entries.get(&node).and_then(|entry| entry.parent)
    }

    pub fn orphans(&self) -> &[NodeId] {
        &self.orphans
    }

    pub fn orphan(&self, index: usize) -> Option<NodeId> {
        self.orphans.get(index).copied()
    }
}

fn check_node(database: &NodeDatabase, entry: &NodeBTreeEntry) -> io::Result<()> {
    database.read_data(entry.data())?;
    if let Some(sub_node) = entry.sub_node() {
        database.read_sub_nodes(sub_node)?;
    }
    Ok(())
}
