//! Fixed storage geometry shared by every layer of the store.
//!
//! A leaf block holds `LEAF_BLOCK_SAMPLES` one-bit samples followed by three
//! summary levels. Each level is `LEVEL_FANOUT` times smaller than the one
//! below it:
//!
//! ```text
//! level 0  raw samples       2^21 bits   (262144 bytes)
//! level 1  per raw word      2^15 bits   (  4096 bytes)
//! level 2  per level-1 word  2^9  bits   (    64 bytes)
//! level 3  per level-2 word  2^3  bits   (     8 bytes, one padded word)
//! ```
//!
//! A root node groups `ROOT_FANOUT` leaf blocks.

/// log2 of the fan-out between two adjacent mipmap levels.
pub const LEVEL_FANOUT_POWER: u32 = 6;

/// Number of lower-level bits summarized by one bit of the next level.
pub const LEVEL_FANOUT: u64 = 1 << LEVEL_FANOUT_POWER;

/// Raw level plus three summary levels.
pub const LEVELS: usize = 4;

/// Index of the coarsest summary level.
pub const TOP_LEVEL: usize = LEVELS - 1;

/// log2 of the samples held by one leaf block.
pub const LEAF_BLOCK_POWER: u32 = 21;

/// Samples held by one leaf block.
pub const LEAF_BLOCK_SAMPLES: u64 = 1 << LEAF_BLOCK_POWER;

/// log2 of the number of leaf blocks per root node.
pub const ROOT_FANOUT_POWER: u32 = 6;

/// Leaf block slots per root node (one bit in each root bitmap).
pub const ROOT_FANOUT: usize = 1 << ROOT_FANOUT_POWER;

/// Samples covered by one root node.
pub const ROOT_NODE_SAMPLES: u64 = LEAF_BLOCK_SAMPLES << ROOT_FANOUT_POWER;

/// Samples packed in one storage word.
pub const WORD_SAMPLES: u64 = 64;

/// Bytes in one storage word.
pub const WORD_BYTES: usize = 8;

/// Number of bits stored at `level`.
pub const fn level_bits(level: usize) -> u64 {
    LEAF_BLOCK_SAMPLES >> (LEVEL_FANOUT_POWER as usize * level)
}

/// Number of 64-bit words stored at `level` (partial words round up).
pub const fn level_words(level: usize) -> usize {
    level_bits(level).div_ceil(WORD_SAMPLES) as usize
}

/// Byte offset of `level` inside a leaf buffer.
pub const fn level_offset(level: usize) -> usize {
    let mut offset = 0;
    let mut l = 0;
    while l < level {
        offset += level_words(l) * WORD_BYTES;
        l += 1;
    }
    offset
}

/// Total byte size of one leaf buffer.
pub const LEAF_BLOCK_BYTES: usize = level_offset(LEVELS);

/// Samples represented by one bit at `level`.
pub const fn level_span(level: usize) -> u64 {
    1 << (LEVEL_FANOUT_POWER as usize * level)
}

/// Physical sample position decomposed into storage coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Index into the channel's root node vector.
    pub root: usize,
    /// Leaf slot inside the root node.
    pub slot: usize,
    /// Sample offset inside the leaf block.
    pub offset: u64,
}

impl Location {
    #[inline]
    pub fn of(position: u64) -> Self {
        Self {
            root: (position / ROOT_NODE_SAMPLES) as usize,
            slot: ((position >> LEAF_BLOCK_POWER) as usize) & (ROOT_FANOUT - 1),
            offset: position & (LEAF_BLOCK_SAMPLES - 1),
        }
    }

    /// Physical position of the first sample of this location's block.
    #[inline]
    pub fn block_start(&self) -> u64 {
        self.root as u64 * ROOT_NODE_SAMPLES + ((self.slot as u64) << LEAF_BLOCK_POWER)
    }

    /// Global block index (root-major).
    #[inline]
    pub fn block_index(&self) -> u64 {
        (self.root * ROOT_FANOUT + self.slot) as u64
    }
}

/// Coarsest level whose window fits inside `granularity` samples.
///
/// A granularity of 0 or 1 asks for exact sample precision.
pub fn granularity_level(granularity: u64) -> usize {
    let mut level = 0;
    while level < TOP_LEVEL && level_span(level + 1) <= granularity {
        level += 1;
    }
    level
}
