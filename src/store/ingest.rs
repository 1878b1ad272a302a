//! Streaming ingest: payload bytes into leaf blocks.
//!
//! Samples are written at the ring write cursor. Whenever the cursor crosses a
//! leaf block boundary, and at the end of every `append_payload` call, the
//! transition mipmap of each channel is brought up to date for the words
//! written since the previous update. A block that fills up without a single
//! transition is compacted: its buffer is released and only the root node's
//! `first`/`last` bits remain.
//!
//! In loop mode the logical window keeps the newest `total_samples` samples.
//! Blocks falling entirely before the window are evicted from the head root
//! node, and a fully evicted head node is rotated to the tail of the channel.

use super::geometry::{
    Location, LEAF_BLOCK_POWER, LEAF_BLOCK_SAMPLES, ROOT_FANOUT, ROOT_NODE_SAMPLES, WORD_BYTES,
    WORD_SAMPLES,
};
use super::leaf::LeafBlock;
use super::snapshot::{LogicSnapshot, SnapshotInner};
use crate::config::PayloadFormat;
use crate::error::{Result, StoreError};
use std::sync::Arc;

impl SnapshotInner {
    pub(crate) fn append(&mut self, data: &[u8]) -> Result<()> {
        let format = self
            .config
            .as_ref()
            .map(|c| c.format)
            .ok_or(StoreError::NotInitialized)?;
        if self.ended {
            return Err(StoreError::CaptureEnded);
        }
        match format {
            PayloadFormat::Cross => self.append_cross(data),
            PayloadFormat::Unit { unit_size } => {
                if data.len() % unit_size != 0 {
                    tracing::warn!(
                        "Rejected {}-byte payload: not a multiple of the {}-byte unit",
                        data.len(),
                        unit_size
                    );
                    return Err(StoreError::PayloadLength {
                        len: data.len(),
                        stride: unit_size,
                    });
                }
                self.append_unit(data, unit_size);
            }
        }
        self.sync_all();
        Ok(())
    }

    /// Whether the sample at the write cursor is inside the budget.
    #[inline]
    fn accepting(&self) -> bool {
        self.is_loop || self.written_samples < self.total_samples
    }

    /// Write position reached by a channel once the word at the cursor is
    /// complete. Outside loop mode it never passes the budget.
    fn word_end(&self, samples: u64) -> u64 {
        let end = self.ring_write_cursor + samples;
        if self.is_loop {
            end
        } else {
            end.min(self.loop_offset + self.total_samples)
        }
    }

    fn append_cross(&mut self, mut data: &[u8]) {
        let channels = self.channels.len();
        while !data.is_empty() {
            let take = (WORD_BYTES - self.byte_fraction).min(data.len());
            let (bytes, rest) = data.split_at(take);
            data = rest;

            let channel = self.channel_fraction;
            let accepting = self.accepting();
            if accepting {
                let position = self.ring_write_cursor;
                let word = (Location::of(position).offset / WORD_SAMPLES) as usize;
                let at = self.byte_fraction;
                match self.leaf_for_write(channel, position) {
                    Some(block) => block.write_raw_bytes(word, at, bytes),
                    None if at + take == WORD_BYTES => {
                        self.counters.dropped_samples += WORD_SAMPLES;
                    }
                    None => {}
                }
            }

            self.byte_fraction += take;
            if self.byte_fraction == WORD_BYTES {
                self.byte_fraction = 0;
                if accepting {
                    self.channels[channel].write_pos = self.word_end(WORD_SAMPLES);
                }
                self.channel_fraction += 1;
                if self.channel_fraction == channels {
                    self.channel_fraction = 0;
                    self.advance(WORD_SAMPLES);
                }
            }
        }
    }

    fn append_unit(&mut self, data: &[u8], unit_size: usize) {
        let mut ticks = data.chunks_exact(unit_size).peekable();
        while ticks.peek().is_some() {
            let position = self.ring_write_cursor;
            let in_word = position % WORD_SAMPLES;
            let group: Vec<&[u8]> = ticks.by_ref().take((WORD_SAMPLES - in_word) as usize).collect();
            let count = group.len() as u64;
            let accepted = if self.is_loop {
                count
            } else {
                count.min(self.total_samples - self.written_samples)
            };

            if accepted > 0 {
                let word = (Location::of(position).offset / WORD_SAMPLES) as usize;
                for channel in 0..self.channels.len() {
                    let id = self.channels[channel].id() as usize;
                    let (byte, bit) = (id / 8, id % 8);
                    let bits = group
                        .iter()
                        .take(accepted as usize)
                        .enumerate()
                        .filter(|(_, tick)| (tick[byte] >> bit) & 1 != 0)
                        .fold(0u64, |acc, (k, _)| acc | (1u64 << (in_word + k as u64)));
                    match self.leaf_for_write(channel, position) {
                        Some(block) => block.or_raw_word(word, bits),
                        None => self.counters.dropped_samples += accepted,
                    }
                    self.channels[channel].write_pos = position + accepted;
                }
            }
            self.advance(count);
        }
    }

    /// Mutable leaf buffer of `channel` covering physical `position`,
    /// allocating it on first touch.
    fn leaf_for_write(&mut self, channel: usize, position: u64) -> Option<&mut LeafBlock> {
        let loc = Location::of(position);
        if self.channels[channel].leaf(loc).is_none() {
            let block_index = loc.block_index();
            if self.alloc_failed[channel] == Some(block_index) {
                return None;
            }
            match self.allocate_leaf() {
                Some(block) => self.channels[channel]
                    .ensure_root(loc.root)
                    .set_leaf(loc.slot, block),
                None => {
                    self.alloc_failed[channel] = Some(block_index);
                    self.counters.allocation_failures += 1;
                    tracing::error!(
                        "Failed to allocate leaf block {} of channel {}, dropping its samples",
                        block_index,
                        self.channels[channel].id()
                    );
                    return None;
                }
            }
        }
        self.channels[channel]
            .root_mut(loc.root)?
            .leaf_mut(loc.slot)
            .map(Arc::make_mut)
    }

    /// Move the cursor past `ticks` written samples.
    fn advance(&mut self, ticks: u64) {
        let before = self.ring_write_cursor;
        if self.is_loop {
            self.ring_write_cursor += ticks;
            self.written_samples += ticks;
            if self.written_samples > self.total_samples {
                let excess = self.written_samples - self.total_samples;
                self.written_samples = self.total_samples;
                self.loop_offset += excess;
                self.discarded_samples += excess;
            }
        } else {
            let accepted = ticks.min(self.total_samples - self.written_samples);
            self.ring_write_cursor += accepted;
            self.written_samples += accepted;
            let dropped = ticks - accepted;
            if dropped > 0 {
                if self.written_samples == self.total_samples
                    && self.counters.dropped_samples == 0
                {
                    tracing::debug!(
                        "Sample budget of {} reached, dropping further samples",
                        self.total_samples
                    );
                }
                self.counters.dropped_samples += dropped * self.channels.len() as u64;
            }
        }

        if before >> LEAF_BLOCK_POWER != self.ring_write_cursor >> LEAF_BLOCK_POWER {
            self.sync_all();
        }
        if self.is_loop {
            self.evict();
        }
    }

    /// Drop blocks that fell out of the loop window.
    fn evict(&mut self) {
        loop {
            let slots = ((self.loop_offset >> LEAF_BLOCK_POWER) as usize).min(ROOT_FANOUT);
            if slots > self.evicted_slots {
                let mut detached = Vec::new();
                for channel in &mut self.channels {
                    if let Some(root) = channel.root_mut(0) {
                        detached.extend(root.evict_below(slots));
                    }
                }
                self.counters.evicted += detached.len() as u64;
                for block in detached {
                    self.retire(block);
                }
                tracing::trace!("Evicted head slots below {}", slots);
                self.evicted_slots = slots;
            }

            if self.loop_offset < ROOT_NODE_SAMPLES {
                return;
            }
            let mut detached = Vec::new();
            for channel in &mut self.channels {
                detached.extend(channel.move_first_node_to_last());
                channel.write_pos = channel.write_pos.saturating_sub(ROOT_NODE_SAMPLES);
                channel.mipmap_pos = channel.mipmap_pos.saturating_sub(ROOT_NODE_SAMPLES);
            }
            self.counters.evicted += detached.len() as u64;
            for block in detached {
                self.retire(block);
            }
            self.loop_offset -= ROOT_NODE_SAMPLES;
            self.ring_write_cursor -= ROOT_NODE_SAMPLES;
            self.evicted_slots = 0;
            self.alloc_failed.iter_mut().for_each(|failed| *failed = None);
            tracing::debug!(
                "Ring rotated head node, loop offset now {}, {} samples discarded",
                self.loop_offset,
                self.discarded_samples
            );
        }
    }

    pub(crate) fn sync_all(&mut self) {
        for channel in 0..self.channels.len() {
            self.sync_channel(channel);
        }
    }

    /// Update mipmaps and root bits of `channel` up to its write position.
    fn sync_channel(&mut self, channel: usize) {
        let (from, to) = {
            let store = &self.channels[channel];
            (store.mipmap_pos, store.write_pos)
        };
        let mut compacted = Vec::new();
        let mut pos = from;
        while pos < to {
            let loc = Location::of(pos);
            let block_start = loc.block_start();
            let block_end = block_start + LEAF_BLOCK_SAMPLES;
            let upto = to.min(block_end);
            if let Some(root) = self.channels[channel].root_mut(loc.root) {
                if let Some(leaf) = root.leaf_mut(loc.slot) {
                    let block = Arc::make_mut(leaf);
                    block.mark_filled(upto - block_start);
                    block.update_mipmap(
                        (loc.offset / WORD_SAMPLES) as usize,
                        (upto - block_start).div_ceil(WORD_SAMPLES) as usize,
                    );
                    root.refresh_slot(loc.slot);
                    if upto == block_end && !root.has_toggles(loc.slot) {
                        compacted.extend(root.take_leaf(loc.slot));
                    }
                }
            }
            pos = upto;
        }
        self.channels[channel].mipmap_pos = to & !(WORD_SAMPLES - 1);

        if !compacted.is_empty() {
            tracing::trace!(
                "Compacted {} constant block(s) of channel {}",
                compacted.len(),
                self.channels[channel].id()
            );
        }
        self.counters.compacted += compacted.len() as u64;
        for block in compacted {
            self.retire(block);
        }
    }

    pub(crate) fn end_capture(&mut self) -> Result<()> {
        if self.config.is_none() {
            return Err(StoreError::NotInitialized);
        }
        if self.ended {
            return Ok(());
        }
        self.sync_all();

        let data_end = self.ring_write_cursor;
        let loc = Location::of(data_end);
        let mut retired = Vec::new();
        for channel in &mut self.channels {
            if let Some(root) = channel.root_mut(loc.root) {
                if loc.offset == 0 {
                    // a word written ahead of an incomplete rotation
                    retired.extend(root.take_leaf(loc.slot));
                } else if let Some(leaf) = root.leaf_mut(loc.slot) {
                    let block = Arc::make_mut(leaf);
                    let value = block.sample(loc.offset - 1);
                    block.fill_from(loc.offset, value);
                    root.refresh_slot(loc.slot);
                    if !root.has_toggles(loc.slot) {
                        retired.extend(root.take_leaf(loc.slot));
                    }
                }
            }
            channel.write_pos = data_end;
            channel.mipmap_pos = data_end;
        }
        self.counters.compacted += retired.len() as u64;
        for block in retired {
            self.retire(block);
        }

        self.ended = true;
        self.byte_fraction = 0;
        self.channel_fraction = 0;
        tracing::debug!(
            "Capture ended: {} samples per channel, {} discarded, {} dropped",
            self.written_samples,
            self.discarded_samples,
            self.counters.dropped_samples
        );
        Ok(())
    }
}

impl LogicSnapshot {
    /// Append a chunk of the acquisition byte stream.
    ///
    /// Chunks may split anywhere inside a cross-format word. Unit-format
    /// chunks must hold whole ticks.
    pub fn append_payload(&self, data: &[u8]) -> Result<()> {
        self.lock().append(data)
    }

    /// Finish the run: the partially written tail block is padded with its
    /// last sample value and further appends are rejected.
    pub fn capture_ended(&self) -> Result<()> {
        self.lock().end_capture()
    }
}
