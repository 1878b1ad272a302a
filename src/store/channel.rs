//! Per-channel storage: an ordered, growable array of root nodes.

use super::geometry::{Location, ROOT_FANOUT};
use super::leaf::LeafBlock;
use super::root::RootNode;
use std::sync::Arc;

/// Storage and ingest cursors for one enabled channel.
#[derive(Debug)]
pub struct ChannelStore {
    /// External channel id (probe index).
    id: u16,
    roots: Vec<RootNode>,
    /// Physical position one past the last sample written for this channel.
    pub(crate) write_pos: u64,
    /// Physical position up to which the mipmap is current (word aligned).
    pub(crate) mipmap_pos: u64,
}

impl ChannelStore {
    pub fn new(id: u16, roots: usize) -> Self {
        Self {
            id,
            roots: (0..roots).map(|_| RootNode::new()).collect(),
            write_pos: 0,
            mipmap_pos: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn roots(&self) -> &[RootNode] {
        &self.roots
    }

    #[inline]
    pub fn root(&self, index: usize) -> Option<&RootNode> {
        self.roots.get(index)
    }

    #[inline]
    pub fn root_mut(&mut self, index: usize) -> Option<&mut RootNode> {
        self.roots.get_mut(index)
    }

    /// Root node `index`, growing the array when the cursor runs past it.
    pub fn ensure_root(&mut self, index: usize) -> &mut RootNode {
        if index >= self.roots.len() {
            self.roots.resize_with(index + 1, RootNode::new);
        }
        &mut self.roots[index]
    }

    /// Leaf buffer at `loc`, if one is allocated.
    #[inline]
    pub fn leaf(&self, loc: Location) -> Option<&Arc<LeafBlock>> {
        self.roots.get(loc.root)?.leaf(loc.slot)
    }

    /// Sample at physical `position`; positions past the stored data read low.
    #[inline]
    pub fn sample(&self, position: u64) -> bool {
        let loc = Location::of(position);
        self.roots
            .get(loc.root)
            .map(|root| root.sample(loc.slot, loc.offset))
            .unwrap_or(false)
    }

    /// Last sample value of the leaf just before `loc`'s root, if any.
    #[inline]
    pub fn prev_root_last(&self, root: usize) -> Option<bool> {
        root.checked_sub(1)
            .and_then(|r| self.roots.get(r))
            .map(|r| r.last_value(ROOT_FANOUT - 1))
    }

    /// Rotate the (fully evicted) head node to the tail so it can be refilled.
    /// Returns any buffers still attached to it.
    pub fn move_first_node_to_last(&mut self) -> Vec<Arc<LeafBlock>> {
        if self.roots.is_empty() {
            return Vec::new();
        }
        let mut head = self.roots.remove(0);
        let detached = head.reset();
        self.roots.push(head);
        detached
    }

    /// Detach every buffer and clear all root bitmaps; the node array is kept.
    pub fn reset(&mut self) -> Vec<Arc<LeafBlock>> {
        self.write_pos = 0;
        self.mipmap_pos = 0;
        self.roots.iter_mut().flat_map(RootNode::reset).collect()
    }

    pub fn live_leaves(&self) -> usize {
        self.roots.iter().map(RootNode::live_leaves).sum()
    }
}
