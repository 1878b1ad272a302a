//! Leaf block: packed samples of one channel plus the transition mipmap.
//!
//! Samples are stored LSB-first in little-endian 64-bit words. The mipmap
//! does not summarize sample values but *transitions*: level 1 bit `w` is set
//! when some sample inside raw word `w` differs from the sample before it
//! (both inside this block). Each higher level ORs 64 bits of the level below.
//!
//! Searches walk the pyramid: zoom out while the rest of the current summary
//! word is empty, zoom in on the first (or last) set bit until level 0 or the
//! requested granularity level is reached.

use super::geometry::{
    level_bits, level_offset, level_words, LEAF_BLOCK_BYTES, LEAF_BLOCK_SAMPLES,
    LEVEL_FANOUT_POWER, LEVELS, TOP_LEVEL, WORD_BYTES, WORD_SAMPLES,
};

/// Fixed-size buffer holding one channel's samples for one block.
#[derive(Clone)]
pub struct LeafBlock {
    data: Box<[u8]>,
    /// High-water mark of written samples; transitions beyond it are ignored.
    filled: u64,
}

impl std::fmt::Debug for LeafBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafBlock")
            .field("filled", &self.filled)
            .field("has_transitions", &self.has_transitions())
            .finish()
    }
}

impl LeafBlock {
    /// Allocate a zeroed block, returning `None` if the allocator refuses.
    pub fn try_new() -> Option<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(LEAF_BLOCK_BYTES).ok()?;
        data.resize(LEAF_BLOCK_BYTES, 0);
        Some(Self {
            data: data.into_boxed_slice(),
            filled: 0,
        })
    }

    /// Zero all samples and summary levels for reuse.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.filled = 0;
    }

    /// Number of samples written so far.
    #[inline]
    pub fn filled(&self) -> u64 {
        self.filled
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.filled >= LEAF_BLOCK_SAMPLES
    }

    /// Raise the write high-water mark.
    #[inline]
    pub fn mark_filled(&mut self, samples: u64) {
        self.filled = self.filled.max(samples.min(LEAF_BLOCK_SAMPLES));
    }

    #[inline]
    fn word(&self, level: usize, index: usize) -> u64 {
        let at = level_offset(level) + index * WORD_BYTES;
        let mut bytes = [0u8; WORD_BYTES];
        bytes.copy_from_slice(&self.data[at..at + WORD_BYTES]);
        u64::from_le_bytes(bytes)
    }

    #[inline]
    fn set_word(&mut self, level: usize, index: usize, value: u64) {
        let at = level_offset(level) + index * WORD_BYTES;
        self.data[at..at + WORD_BYTES].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn set_bit(&mut self, level: usize, bit: usize, value: bool) {
        let byte = &mut self.data[level_offset(level) + bit / 8];
        let mask = 1u8 << (bit % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Raw sample word `index` (64 samples).
    #[inline]
    pub fn raw_word(&self, index: usize) -> u64 {
        self.word(0, index)
    }

    /// Overwrite raw word `index`.
    #[inline]
    pub fn set_raw_word(&mut self, index: usize, value: u64) {
        self.set_word(0, index, value);
    }

    /// OR `bits` into raw word `index`.
    #[inline]
    pub fn or_raw_word(&mut self, index: usize, bits: u64) {
        let value = self.raw_word(index) | bits;
        self.set_word(0, index, value);
    }

    /// Copy `bytes` into raw word `index` starting at byte `byte_in_word`.
    pub fn write_raw_bytes(&mut self, index: usize, byte_in_word: usize, bytes: &[u8]) {
        debug_assert!(byte_in_word + bytes.len() <= WORD_BYTES);
        let at = index * WORD_BYTES + byte_in_word;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[inline]
    pub fn sample(&self, offset: u64) -> bool {
        debug_assert!(offset < LEAF_BLOCK_SAMPLES);
        (self.data[(offset / 8) as usize] >> (offset % 8)) & 1 != 0
    }

    /// Value of the first sample.
    #[inline]
    pub fn first_sample(&self) -> bool {
        self.sample(0)
    }

    /// Value of the last written sample.
    #[inline]
    pub fn last_sample(&self) -> bool {
        self.sample(self.filled.saturating_sub(1))
    }

    /// Packed raw samples.
    #[inline]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.data[..level_offset(1)]
    }

    /// Packed bits of one summary level.
    pub fn level_bytes(&self, level: usize) -> &[u8] {
        let start = level_offset(level);
        let len = level_bits(level).div_ceil(8) as usize;
        &self.data[start..start + len]
    }

    /// Whether any transition was recorded in this block.
    #[inline]
    pub fn has_transitions(&self) -> bool {
        self.word(TOP_LEVEL, 0) != 0
    }

    /// Transition bits of raw word `index`: bit `j` is set when sample
    /// `64*index + j` differs from the sample before it.
    pub fn transition_word(&self, index: usize) -> u64 {
        let base = index as u64 * WORD_SAMPLES;
        if base >= self.filled {
            return 0;
        }
        let word = self.raw_word(index);
        let carry = if index == 0 {
            word & 1
        } else {
            self.raw_word(index - 1) >> 63
        };
        let toggles = word ^ ((word << 1) | carry);
        let valid = self.filled - base;
        if valid >= WORD_SAMPLES {
            toggles
        } else {
            toggles & ((1u64 << valid) - 1)
        }
    }

    #[inline]
    fn summary_word(&self, level: usize, index: usize) -> u64 {
        if level == 0 {
            self.transition_word(index)
        } else {
            self.word(level, index)
        }
    }

    /// Recompute summary bits covering raw words `[from_word, to_word)`.
    ///
    /// Only the touched bits at each level are rewritten; the rest of the
    /// pyramid is left alone.
    pub fn update_mipmap(&mut self, from_word: usize, to_word: usize) {
        let mut lo = from_word;
        let mut hi = to_word.min(level_words(0));
        if lo >= hi {
            return;
        }
        for level in 1..LEVELS {
            for bit in lo..hi {
                let below = self.summary_word(level - 1, bit);
                self.set_bit(level, bit, below != 0);
            }
            lo /= WORD_SAMPLES as usize;
            hi = hi.div_ceil(WORD_SAMPLES as usize);
        }
    }

    /// Set samples `[offset, LEAF_BLOCK_SAMPLES)` to `value` and finalize the
    /// mipmap for them.
    pub fn fill_from(&mut self, offset: u64, value: bool) {
        if offset >= LEAF_BLOCK_SAMPLES {
            return;
        }
        let fill = if value { u64::MAX } else { 0 };
        let first_word = (offset / WORD_SAMPLES) as usize;
        let in_word = offset % WORD_SAMPLES;
        let mut word_index = first_word;
        if in_word != 0 {
            let keep = (1u64 << in_word) - 1;
            let word = (self.raw_word(word_index) & keep) | (fill & !keep);
            self.set_raw_word(word_index, word);
            word_index += 1;
        }
        for index in word_index..level_words(0) {
            self.set_raw_word(index, fill);
        }
        self.filled = LEAF_BLOCK_SAMPLES;
        self.update_mipmap(first_word, level_words(0));
    }

    /// First transition at an offset in `[from, to]`.
    ///
    /// With `min_level > 0` the search stops at that level and returns the
    /// start of the first window holding a transition (clamped to `from`).
    pub fn next_transition(&self, from: u64, to: u64, min_level: usize) -> Option<u64> {
        let mut pos = from.max(1);
        let to = to.min(LEAF_BLOCK_SAMPLES - 1);
        if pos > to {
            return None;
        }
        let mut level = 0usize;
        loop {
            let shift = LEVEL_FANOUT_POWER as usize * level;
            let bit = pos >> shift;
            let word_index = (bit / WORD_SAMPLES) as usize;
            if word_index >= level_words(level) {
                return None;
            }
            let word = self.summary_word(level, word_index) & (u64::MAX << (bit % WORD_SAMPLES));
            if word != 0 {
                let hit = word_index as u64 * WORD_SAMPLES + word.trailing_zeros() as u64;
                let window_start = hit << shift;
                if window_start > to {
                    return None;
                }
                if level <= min_level {
                    return Some(window_start.max(pos));
                }
                pos = pos.max(window_start);
                level -= 1;
            } else {
                let next = ((word_index as u64 + 1) * WORD_SAMPLES) << shift;
                if next > to {
                    return None;
                }
                pos = next;
                if level < TOP_LEVEL {
                    level += 1;
                }
            }
        }
    }

    /// Last transition at an offset in `[low, from]`.
    ///
    /// With `min_level > 0` returns the end of the last window holding a
    /// transition (clamped to `from`).
    pub fn prev_transition(&self, from: u64, low: u64, min_level: usize) -> Option<u64> {
        let low = low.max(1);
        let mut pos = from.min(LEAF_BLOCK_SAMPLES - 1);
        if pos < low {
            return None;
        }
        let mut level = 0usize;
        loop {
            let shift = LEVEL_FANOUT_POWER as usize * level;
            let bit = pos >> shift;
            let word_index = (bit / WORD_SAMPLES) as usize;
            let keep = bit % WORD_SAMPLES;
            let mask = if keep == WORD_SAMPLES - 1 {
                u64::MAX
            } else {
                (1u64 << (keep + 1)) - 1
            };
            let word = self.summary_word(level, word_index) & mask;
            if word != 0 {
                let hit = word_index as u64 * WORD_SAMPLES + (63 - word.leading_zeros() as u64);
                let window_end = ((hit + 1) << shift) - 1;
                if window_end < low {
                    return None;
                }
                if level <= min_level {
                    return Some(window_end.min(pos));
                }
                pos = pos.min(window_end);
                level -= 1;
            } else {
                let base = (word_index as u64 * WORD_SAMPLES) << shift;
                if base <= low {
                    return None;
                }
                pos = base - 1;
                if level < TOP_LEVEL {
                    level += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_from_fn(samples: u64, f: impl Fn(u64) -> bool) -> LeafBlock {
        let mut block = LeafBlock::try_new().unwrap();
        for word in 0..samples.div_ceil(WORD_SAMPLES) {
            let mut value = 0u64;
            for bit in 0..WORD_SAMPLES {
                let i = word * WORD_SAMPLES + bit;
                if i < samples && f(i) {
                    value |= 1 << bit;
                }
            }
            block.set_raw_word(word as usize, value);
        }
        block.mark_filled(samples);
        block.update_mipmap(0, samples.div_ceil(WORD_SAMPLES) as usize);
        block
    }

    #[test]
    fn test_constant_block_has_no_transitions() {
        let ones = block_from_fn(LEAF_BLOCK_SAMPLES, |_| true);
        assert!(!ones.has_transitions());
        assert!(ones.first_sample());
        assert!(ones.last_sample());
        assert_eq!(ones.next_transition(0, LEAF_BLOCK_SAMPLES - 1, 0), None);
        assert_eq!(ones.prev_transition(LEAF_BLOCK_SAMPLES - 1, 0, 0), None);
    }

    #[test]
    fn test_single_edge_found_from_both_sides() {
        let edge = 1_234_567;
        let block = block_from_fn(LEAF_BLOCK_SAMPLES, |i| i >= edge);
        assert!(block.has_transitions());
        assert_eq!(block.next_transition(0, LEAF_BLOCK_SAMPLES - 1, 0), Some(edge));
        assert_eq!(block.next_transition(edge, edge, 0), Some(edge));
        assert_eq!(block.next_transition(edge + 1, LEAF_BLOCK_SAMPLES - 1, 0), None);
        assert_eq!(block.next_transition(0, edge - 1, 0), None);
        assert_eq!(block.prev_transition(LEAF_BLOCK_SAMPLES - 1, 0, 0), Some(edge));
        assert_eq!(block.prev_transition(edge - 1, 0, 0), None);
    }

    #[test]
    fn test_edge_on_word_boundary() {
        let block = block_from_fn(4096, |i| i >= 64);
        assert_eq!(block.transition_word(0), 0);
        assert_eq!(block.transition_word(1), 1);
        assert_eq!(block.next_transition(1, 4095, 0), Some(64));
        assert_eq!(block.prev_transition(4095, 1, 0), Some(64));
    }

    #[test]
    fn test_granular_search_stops_early() {
        let edge = 10_000;
        let block = block_from_fn(LEAF_BLOCK_SAMPLES, |i| i >= edge);
        // level 1 windows are 64 samples wide
        let hit = block.next_transition(0, LEAF_BLOCK_SAMPLES - 1, 1).unwrap();
        assert_eq!(hit, edge / 64 * 64);
        let back = block.prev_transition(LEAF_BLOCK_SAMPLES - 1, 0, 1).unwrap();
        assert_eq!(back, edge / 64 * 64 + 63);
    }

    #[test]
    fn test_partial_fill_ignores_unwritten_tail() {
        let block = block_from_fn(100, |_| true);
        assert!(!block.has_transitions());
        assert_eq!(block.next_transition(0, LEAF_BLOCK_SAMPLES - 1, 0), None);
    }

    #[test]
    fn test_fill_from_extends_last_value() {
        let mut block = block_from_fn(130, |i| i >= 70);
        block.fill_from(130, true);
        assert!(block.is_full());
        assert!(block.sample(LEAF_BLOCK_SAMPLES - 1));
        assert_eq!(block.next_transition(71, LEAF_BLOCK_SAMPLES - 1, 0), None);
        assert_eq!(block.prev_transition(LEAF_BLOCK_SAMPLES - 1, 1, 0), Some(70));
    }

    #[test]
    fn test_levels_are_or_reduction() {
        let block = block_from_fn(LEAF_BLOCK_SAMPLES, |i| (i / 777_777) % 2 == 1);
        for level in 1..LEVELS {
            for bit in 0..level_bits(level) as usize {
                let below = block.summary_word(level - 1, bit);
                let stored = (block.level_bytes(level)[bit / 8] >> (bit % 8)) & 1 != 0;
                assert_eq!(stored, below != 0, "level {} bit {}", level, bit);
            }
        }
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    fn level_at(edges: &[u64], i: u64) -> bool {
        edges.iter().filter(|&&e| e <= i).count() % 2 == 1
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_search_matches_scan(
            edges in prop::collection::vec(1u64..20_000, 0..25),
            filled in 1u64..20_000,
            from in 0u64..20_000,
            to in 0u64..20_000,
        ) {
            let block = block_from_fn(filled, |i| level_at(&edges, i));
            let toggles = |i: u64| i >= 1 && i < filled && level_at(&edges, i) != level_at(&edges, i - 1);

            let forward = (from.max(1)..=to).find(|&i| toggles(i));
            prop_assert_eq!(block.next_transition(from, to, 0), forward);

            let backward = (from.max(1)..=to).rev().find(|&i| toggles(i));
            prop_assert_eq!(block.prev_transition(to, from, 0), backward);
        }

        #[test]
        fn test_incremental_mipmap_matches_full(
            edges in prop::collection::vec(1u64..8_192, 0..25),
            split in 1usize..128,
        ) {
            let full = block_from_fn(8_192, |i| level_at(&edges, i));

            // same data, summarized in two steps as ingest does
            let mut partial = LeafBlock::try_new().unwrap();
            for word in 0..128 {
                partial.set_raw_word(word, full.raw_word(word));
            }
            partial.mark_filled(split as u64 * WORD_SAMPLES);
            partial.update_mipmap(0, split);
            partial.mark_filled(8_192);
            partial.update_mipmap(split, 128);

            for level in 1..LEVELS {
                prop_assert_eq!(partial.level_bytes(level), full.level_bytes(level));
            }
        }
    }
}
