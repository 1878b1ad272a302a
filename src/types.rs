//! Core data types for logicstore-rs
//!
//! This module contains the value types returned by store queries.
//!
//! # Main Types
//!
//! - [`EdgeKind`] - Direction filter for edge listings
//! - [`Edge`] - One transition with the level it switches to
//! - [`DisplayEdges`] - Pixel-quantized levels plus toggle hints for a renderer
//! - [`StoreMetrics`] - Allocation, eviction and drop counters of one snapshot

use serde::{Deserialize, Serialize};

/// Direction of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EdgeKind {
    /// Low to high
    Rising,
    /// High to low
    Falling,
    /// Either direction
    #[default]
    Any,
}

impl EdgeKind {
    /// Whether a transition to `new_level` passes this filter
    pub fn accepts(&self, new_level: bool) -> bool {
        match self {
            EdgeKind::Rising => new_level,
            EdgeKind::Falling => !new_level,
            EdgeKind::Any => true,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Rising => write!(f, "rising"),
            EdgeKind::Falling => write!(f, "falling"),
            EdgeKind::Any => write!(f, "any"),
        }
    }
}

/// A transition at logical sample `index` to level `level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub index: u64,
    pub level: bool,
}

impl Edge {
    pub fn kind(&self) -> EdgeKind {
        if self.level {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        }
    }
}

/// A pixel column holding more than one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleHint {
    /// Column index
    pub pixel: usize,
    /// Logical index of the first transition inside the column
    pub sample: u64,
}

/// Per-pixel view of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEdges {
    /// Level at the last sample of each column
    pub levels: Vec<bool>,
    /// Columns that toggle more than once, in ascending order
    pub toggles: Vec<ToggleHint>,
}

impl DisplayEdges {
    pub fn columns(&self) -> usize {
        self.levels.len()
    }

    /// Whether column `pixel` was reported as busy
    pub fn is_busy(&self, pixel: usize) -> bool {
        self.toggles.iter().any(|t| t.pixel == pixel)
    }
}

/// Counters maintained by one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetrics {
    /// Leaf buffers currently attached to a root node
    pub live_blocks: usize,
    /// Buffers waiting for reader handles to be released
    pub pending_free: usize,
    /// Zeroable buffers kept for reuse
    pub spare_blocks: usize,
    /// Buffers returned to the allocator
    pub freed_blocks: u64,
    /// Blocks removed by the loop ring
    pub evicted_blocks: u64,
    /// Constant blocks whose buffer was released
    pub compacted_blocks: u64,
    /// Leaf allocations that failed
    pub allocation_failures: u64,
    /// Samples lost to allocation failures or the non-loop budget
    pub dropped_samples: u64,
}
