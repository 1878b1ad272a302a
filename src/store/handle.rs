//! Reader handles into leaf storage.
//!
//! A [`LeafHandle`] keeps one leaf buffer alive independently of the store.
//! The writer never mutates a buffer that a handle can observe; it clones the
//! buffer first, so the bytes seen through a handle never change. Handles
//! should be given back through `LogicSnapshot::release` so retired buffers
//! are returned promptly.

use super::geometry::LEAF_BLOCK_SAMPLES;
use super::leaf::LeafBlock;
use std::sync::Arc;

/// Shared read access to one leaf block.
#[derive(Clone)]
pub struct LeafHandle {
    channel: u16,
    block_index: u64,
    block: Arc<LeafBlock>,
}

impl std::fmt::Debug for LeafHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafHandle")
            .field("channel", &self.channel)
            .field("block_index", &self.block_index)
            .field("filled", &self.block.filled())
            .finish()
    }
}

impl LeafHandle {
    pub(crate) fn new(channel: u16, block_index: u64, block: Arc<LeafBlock>) -> Self {
        Self {
            channel,
            block_index,
            block,
        }
    }

    /// External id of the channel the block belongs to.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Index of the block, counted from the block holding logical sample 0.
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    /// Packed samples, LSB first.
    pub fn bytes(&self) -> &[u8] {
        self.block.raw_bytes()
    }

    /// Samples written into the block when the handle was taken.
    pub fn filled(&self) -> u64 {
        self.block.filled()
    }

    /// Sample at `offset` inside the block.
    pub fn sample(&self, offset: u64) -> bool {
        offset < LEAF_BLOCK_SAMPLES && self.block.sample(offset)
    }

    pub(crate) fn into_inner(self) -> Arc<LeafBlock> {
        self.block
    }
}

/// One block of a channel as seen by a decoder.
#[derive(Debug, Clone)]
pub enum BlockView {
    /// Block with transitions, readable through a handle
    Raw(LeafHandle),
    /// Block whose buffer was released; every sample has this value
    Constant(bool),
}

/// A run of samples that lies inside one leaf block.
#[derive(Debug, Clone)]
pub enum Region {
    /// Samples `[first_bit, first_bit + len)` of `handle`'s packed bytes
    Raw {
        handle: LeafHandle,
        first_bit: u64,
        len: u64,
    },
    /// `len` samples that all equal `value`
    Constant { value: bool, len: u64 },
}

impl Region {
    /// Number of samples in the run.
    pub fn len(&self) -> u64 {
        match self {
            Region::Raw { len, .. } | Region::Constant { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample `i` of the run.
    pub fn sample(&self, i: u64) -> bool {
        match self {
            Region::Raw {
                handle, first_bit, ..
            } => handle.sample(first_bit + i),
            Region::Constant { value, .. } => *value,
        }
    }

    /// The handle backing a raw run, if any.
    pub fn into_handle(self) -> Option<LeafHandle> {
        match self {
            Region::Raw { handle, .. } => Some(handle),
            Region::Constant { .. } => None,
        }
    }
}
