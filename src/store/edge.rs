//! Edge search over root bitmaps and leaf mipmaps.
//!
//! An edge is a logical index `i >= 1` whose sample differs from sample
//! `i - 1`. Edges come from two places:
//!
//! - inside a leaf block, found through the block's transition mipmap
//! - on a block boundary, when the first sample of a block differs from the
//!   last sample of the block before it (root `first`/`last` bitmaps)
//!
//! Per root node the candidate slots are `tog | boundary`, so runs of constant
//! blocks are skipped with one bit scan per root node.

use super::channel::ChannelStore;
use super::geometry::{granularity_level, Location, LEAF_BLOCK_SAMPLES, ROOT_FANOUT};
use super::snapshot::{LogicSnapshot, SnapshotInner};
use crate::error::Result;

/// Slots at or above `slot`.
#[inline]
fn slots_from(slot: usize) -> u64 {
    u64::MAX << slot
}

/// Slots at or below `slot`.
#[inline]
fn slots_upto(slot: usize) -> u64 {
    if slot + 1 >= ROOT_FANOUT {
        u64::MAX
    } else {
        (1u64 << (slot + 1)) - 1
    }
}

/// First edge at a physical position in `[from, to]`.
pub(crate) fn next_transition(
    channel: &ChannelStore,
    from: u64,
    to: u64,
    level: usize,
) -> Option<u64> {
    if from > to {
        return None;
    }
    let first = Location::of(from);
    let last = Location::of(to);
    for root_index in first.root..=last.root {
        let root = channel.root(root_index)?;
        let boundary = root.boundary_mask(channel.prev_root_last(root_index));
        let mut candidates = root.tog | boundary;
        if root_index == first.root {
            candidates &= slots_from(first.slot);
        }
        while candidates != 0 {
            let slot = candidates.trailing_zeros() as usize;
            candidates &= candidates - 1;
            let block_start = Location {
                root: root_index,
                slot,
                offset: 0,
            }
            .block_start();
            if block_start > to {
                return None;
            }
            if boundary & (1 << slot) != 0 && block_start >= from {
                return Some(block_start);
            }
            if root.has_toggles(slot) {
                if let Some(block) = root.leaf(slot) {
                    let lo = from.saturating_sub(block_start);
                    let hi = (to - block_start).min(LEAF_BLOCK_SAMPLES - 1);
                    if let Some(offset) = block.next_transition(lo, hi, level) {
                        return Some(block_start + offset);
                    }
                }
            }
        }
    }
    None
}

/// Last edge at a physical position in `[low, from]`.
pub(crate) fn prev_transition(
    channel: &ChannelStore,
    from: u64,
    low: u64,
    level: usize,
) -> Option<u64> {
    if from < low {
        return None;
    }
    let first = Location::of(from);
    let last = Location::of(low);
    for root_index in (last.root..=first.root).rev() {
        let Some(root) = channel.root(root_index) else {
            continue;
        };
        let boundary = root.boundary_mask(channel.prev_root_last(root_index));
        let mut candidates = root.tog | boundary;
        if root_index == first.root {
            candidates &= slots_upto(first.slot);
        }
        while candidates != 0 {
            let slot = 63 - candidates.leading_zeros() as usize;
            candidates &= !(1u64 << slot);
            let block_start = Location {
                root: root_index,
                slot,
                offset: 0,
            }
            .block_start();
            if block_start + LEAF_BLOCK_SAMPLES <= low {
                return None;
            }
            if root.has_toggles(slot) {
                if let Some(block) = root.leaf(slot) {
                    let hi = (from - block_start).min(LEAF_BLOCK_SAMPLES - 1);
                    let lo = low.saturating_sub(block_start);
                    if let Some(offset) = block.prev_transition(hi, lo, level) {
                        return Some(block_start + offset);
                    }
                }
            }
            if boundary & (1 << slot) != 0 && block_start >= low && block_start <= from {
                return Some(block_start);
            }
        }
    }
    None
}

impl SnapshotInner {
    /// Logical first edge in `[index, end]`, clamped to the written range.
    pub(crate) fn next_edge(
        &self,
        channel: u16,
        index: u64,
        end: u64,
        min_granularity: u64,
    ) -> Result<Option<u64>> {
        let store = self.channel(channel)?;
        let Some(last) = self.last_index() else {
            return Ok(None);
        };
        let from = index.max(1);
        let to = end.min(last);
        if from > to {
            return Ok(None);
        }
        let level = granularity_level(min_granularity);
        Ok(
            next_transition(store, self.physical(from), self.physical(to), level)
                .map(|p| p - self.loop_offset),
        )
    }

    /// Logical last edge in `[1, index]`, clamped to the written range.
    pub(crate) fn prev_edge(
        &self,
        channel: u16,
        index: u64,
        min_granularity: u64,
    ) -> Result<Option<u64>> {
        let store = self.channel(channel)?;
        let Some(last) = self.last_index() else {
            return Ok(None);
        };
        let from = index.min(last);
        if from < 1 {
            return Ok(None);
        }
        let level = granularity_level(min_granularity);
        Ok(
            prev_transition(store, self.physical(from), self.physical(1), level)
                .map(|p| p - self.loop_offset),
        )
    }
}

impl LogicSnapshot {
    /// Smallest edge index in `[index, end]`.
    ///
    /// `min_granularity` is the number of samples the caller cannot tell apart
    /// (samples per pixel). With a value above 1 the search may stop at a
    /// summary window and return an index inside that window, at or before the
    /// first real edge.
    pub fn next_edge(
        &self,
        channel: u16,
        index: u64,
        end: u64,
        min_granularity: u64,
    ) -> Result<Option<u64>> {
        self.lock().next_edge(channel, index, end, min_granularity)
    }

    /// Largest edge index in `[1, index]`.
    pub fn prev_edge(&self, channel: u16, index: u64, min_granularity: u64) -> Result<Option<u64>> {
        self.lock().prev_edge(channel, index, min_granularity)
    }
}
