//! Root directory node: summary bitmaps over `ROOT_FANOUT` leaf blocks.

use super::geometry::ROOT_FANOUT;
use super::leaf::LeafBlock;
use std::sync::Arc;

/// Directory entry for 64 consecutive leaf blocks of one channel.
///
/// `tog` bit `i` means leaf `i` contains at least one internal transition.
/// `first`/`last` hold the first and last sample value of each leaf, which is
/// all that is left of a leaf once its constant buffer has been released.
#[derive(Clone)]
pub struct RootNode {
    pub tog: u64,
    pub first: u64,
    pub last: u64,
    leaf: [Option<Arc<LeafBlock>>; ROOT_FANOUT],
}

impl Default for RootNode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RootNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootNode")
            .field("tog", &format_args!("{:#018x}", self.tog))
            .field("first", &format_args!("{:#018x}", self.first))
            .field("last", &format_args!("{:#018x}", self.last))
            .field("live_leaves", &self.live_leaves())
            .finish()
    }
}

#[inline]
fn bit(slot: usize) -> u64 {
    1u64 << slot
}

impl RootNode {
    pub fn new() -> Self {
        Self {
            tog: 0,
            first: 0,
            last: 0,
            leaf: std::array::from_fn(|_| None),
        }
    }

    #[inline]
    pub fn leaf(&self, slot: usize) -> Option<&Arc<LeafBlock>> {
        self.leaf[slot].as_ref()
    }

    #[inline]
    pub fn leaf_mut(&mut self, slot: usize) -> Option<&mut Arc<LeafBlock>> {
        self.leaf[slot].as_mut()
    }

    pub fn set_leaf(&mut self, slot: usize, block: Arc<LeafBlock>) {
        debug_assert!(self.leaf[slot].is_none());
        self.leaf[slot] = Some(block);
    }

    /// Detach the buffer of `slot`, keeping its `first`/`last` bits.
    pub fn take_leaf(&mut self, slot: usize) -> Option<Arc<LeafBlock>> {
        self.tog &= !bit(slot);
        self.leaf[slot].take()
    }

    #[inline]
    pub fn has_toggles(&self, slot: usize) -> bool {
        self.tog & bit(slot) != 0
    }

    #[inline]
    pub fn first_value(&self, slot: usize) -> bool {
        self.first & bit(slot) != 0
    }

    #[inline]
    pub fn last_value(&self, slot: usize) -> bool {
        self.last & bit(slot) != 0
    }

    /// Refresh the summary bits of `slot` from its buffer.
    pub fn refresh_slot(&mut self, slot: usize) {
        let Some(block) = self.leaf[slot].as_ref() else {
            return;
        };
        let (tog, first, last) = (
            block.has_transitions(),
            block.first_sample(),
            block.last_sample(),
        );
        self.assign(slot, tog, first, last);
    }

    fn assign(&mut self, slot: usize, tog: bool, first: bool, last: bool) {
        let mask = bit(slot);
        self.tog = if tog { self.tog | mask } else { self.tog & !mask };
        self.first = if first { self.first | mask } else { self.first & !mask };
        self.last = if last { self.last | mask } else { self.last & !mask };
    }

    /// Sample value at `offset` of leaf `slot`.
    #[inline]
    pub fn sample(&self, slot: usize, offset: u64) -> bool {
        match &self.leaf[slot] {
            Some(block) => block.sample(offset),
            None => self.first_value(slot),
        }
    }

    /// Bit `s` set when the first sample of leaf `s` differs from the last
    /// sample of leaf `s - 1`. Bit 0 compares against `prev_last`, the last
    /// sample of the previous root node, and is clear when there is none.
    pub fn boundary_mask(&self, prev_last: Option<bool>) -> u64 {
        let carry = prev_last.unwrap_or(false) as u64;
        let mask = self.first ^ ((self.last << 1) | carry);
        if prev_last.is_some() {
            mask
        } else {
            mask & !1
        }
    }

    /// Drop the buffers of slots `[0, slots)` in place, clearing their summary
    /// bits. Returns the detached buffers.
    pub fn evict_below(&mut self, slots: usize) -> Vec<Arc<LeafBlock>> {
        let slots = slots.min(ROOT_FANOUT);
        let low = if slots == ROOT_FANOUT {
            u64::MAX
        } else {
            bit(slots) - 1
        };
        self.tog &= !low;
        self.first &= !low;
        self.last &= !low;
        self.leaf[..slots]
            .iter_mut()
            .filter_map(Option::take)
            .collect()
    }

    /// Detach every buffer and clear all bitmaps.
    pub fn reset(&mut self) -> Vec<Arc<LeafBlock>> {
        self.evict_below(ROOT_FANOUT)
    }

    pub fn live_leaves(&self) -> usize {
        self.leaf.iter().filter(|l| l.is_some()).count()
    }
}
