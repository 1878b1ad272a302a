//! Snapshot store: every channel of one capture behind a single lock.
//!
//! [`LogicSnapshot`] is shared between the capture thread, the render thread
//! and decoder threads. All public methods take `&self`; the metadata and the
//! channel directories live in [`SnapshotInner`] behind one `Mutex`. Leaf
//! buffers are reference counted, so a reader holding a [`LeafHandle`] can
//! keep reading after the lock is released.
//!
//! # Positions
//!
//! Query indices are *logical*: logical sample `i` lives at physical position
//! `i + loop_offset`. Outside loop mode the offset is always zero. In loop mode
//! the offset grows as old samples are discarded and drops by
//! `ROOT_NODE_SAMPLES` whenever the head root node is rotated to the tail.
//!
//! # Buffer lifecycle
//!
//! ```text
//! allocate ──> attached to a root slot ──> retired (constant, evicted, ended)
//!                                             │
//!                 handles outstanding? ── yes ┴─> pending_free ──> sweep
//!                                          no ──> spare pool (loop) or freed
//! ```

use super::channel::ChannelStore;
use super::geometry::{Location, LEAF_BLOCK_POWER, LEAF_BLOCK_SAMPLES, ROOT_NODE_SAMPLES};
use super::handle::{BlockView, LeafHandle};
use super::leaf::LeafBlock;
use crate::config::CaptureConfig;
use crate::error::{Result, StoreError};
use crate::types::StoreMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Event counters kept across the runs of one snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub freed: u64,
    pub evicted: u64,
    pub compacted: u64,
    pub allocation_failures: u64,
    pub dropped_samples: u64,
}

/// Lock-protected state of a [`LogicSnapshot`].
#[derive(Debug, Default)]
pub(crate) struct SnapshotInner {
    pub(crate) config: Option<CaptureConfig>,
    pub(crate) channels: Vec<ChannelStore>,
    order: HashMap<u16, usize>,
    pub(crate) total_samples: u64,
    pub(crate) written_samples: u64,
    /// Physical position of the next sample tick.
    pub(crate) ring_write_cursor: u64,
    /// Physical position of logical sample 0.
    pub(crate) loop_offset: u64,
    pub(crate) discarded_samples: u64,
    pub(crate) is_loop: bool,
    pub(crate) ended: bool,
    /// Bytes already received of the current cross-format word.
    pub(crate) byte_fraction: usize,
    /// Internal channel the current cross-format word belongs to.
    pub(crate) channel_fraction: usize,
    /// Head-root slots already evicted by the ring.
    pub(crate) evicted_slots: usize,
    /// Physical block index whose allocation failed, per channel.
    pub(crate) alloc_failed: Vec<Option<u64>>,
    pending_free: Vec<Arc<LeafBlock>>,
    spare: Vec<Arc<LeafBlock>>,
    live_blocks: usize,
    pub(crate) counters: Counters,
}

impl SnapshotInner {
    /// Internal order of external channel `id`.
    pub(crate) fn channel_index(&self, id: u16) -> Result<usize> {
        self.order
            .get(&id)
            .copied()
            .ok_or(StoreError::UnknownChannel(id))
    }

    pub(crate) fn channel(&self, id: u16) -> Result<&ChannelStore> {
        let index = self.channel_index(id)?;
        Ok(&self.channels[index])
    }

    /// Physical position of logical `index`.
    #[inline]
    pub(crate) fn physical(&self, index: u64) -> u64 {
        index + self.loop_offset
    }

    /// Last valid logical index, if any sample was written.
    #[inline]
    pub(crate) fn last_index(&self) -> Option<u64> {
        self.written_samples.checked_sub(1)
    }

    fn reset_cursors(&mut self) {
        self.written_samples = 0;
        self.ring_write_cursor = 0;
        self.loop_offset = 0;
        self.discarded_samples = 0;
        self.ended = false;
        self.byte_fraction = 0;
        self.channel_fraction = 0;
        self.evicted_slots = 0;
        self.alloc_failed = vec![None; self.channels.len()];
    }

    fn allocated_blocks(&self) -> usize {
        self.live_blocks + self.pending_free.len() + self.spare.len()
    }

    /// Take a zeroed leaf buffer from the spare pool or the allocator.
    pub(crate) fn allocate_leaf(&mut self) -> Option<Arc<LeafBlock>> {
        if let Some(mut block) = self.spare.pop() {
            Arc::make_mut(&mut block).reset();
            self.live_blocks += 1;
            return Some(block);
        }
        let limit = self.config.as_ref().and_then(|c| c.memory_limit_blocks);
        if limit.is_some_and(|limit| self.allocated_blocks() >= limit) {
            return None;
        }
        let block = LeafBlock::try_new()?;
        self.live_blocks += 1;
        Some(Arc::new(block))
    }

    /// Hand back a buffer detached from its root slot.
    pub(crate) fn retire(&mut self, block: Arc<LeafBlock>) {
        self.live_blocks = self.live_blocks.saturating_sub(1);
        if Arc::strong_count(&block) > 1 {
            self.pending_free.push(block);
        } else if self.is_loop && self.spare.len() < self.channels.len() * 2 {
            self.spare.push(block);
        } else {
            self.counters.freed += 1;
        }
    }

    /// Free pending buffers whose reader handles are all gone.
    pub(crate) fn sweep(&mut self) {
        let before = self.pending_free.len();
        self.pending_free.retain(|block| Arc::strong_count(block) > 1);
        let freed = before - self.pending_free.len();
        if freed > 0 {
            self.counters.freed += freed as u64;
            tracing::trace!(
                "Freed {} pending block(s), {} still referenced",
                freed,
                self.pending_free.len()
            );
        }
    }

    /// Detach every buffer into the spare pool, keeping the root nodes.
    fn recycle_all(&mut self) {
        let detached: Vec<_> = self
            .channels
            .iter_mut()
            .flat_map(ChannelStore::reset)
            .collect();
        self.live_blocks = 0;
        for block in detached {
            if Arc::strong_count(&block) > 1 {
                self.pending_free.push(block);
            } else {
                self.spare.push(block);
            }
        }
    }

    /// Drop every channel and pooled buffer.
    fn release_all(&mut self) {
        let detached: Vec<_> = self
            .channels
            .drain(..)
            .flat_map(|mut channel| channel.reset())
            .collect();
        self.counters.freed += (detached.len() + self.spare.len() + self.pending_free.len()) as u64;
        self.spare.clear();
        self.pending_free.clear();
        self.order.clear();
        self.live_blocks = 0;
    }

    pub(crate) fn first_payload(&mut self, config: &CaptureConfig) -> Result<()> {
        config.validate()?;
        self.sweep();

        let reuse = self
            .config
            .as_ref()
            .is_some_and(|previous| previous.same_geometry(config));
        if reuse {
            self.recycle_all();
        } else {
            self.release_all();
            let roots = config.total_samples.div_ceil(ROOT_NODE_SAMPLES).max(1) as usize;
            self.channels = config
                .channels
                .iter()
                .map(|id| ChannelStore::new(*id, roots))
                .collect();
            self.order = config
                .channels
                .iter()
                .enumerate()
                .map(|(index, id)| (*id, index))
                .collect();
        }

        self.total_samples = config.total_samples;
        self.is_loop = config.loop_mode;
        self.config = Some(config.clone());
        self.reset_cursors();

        tracing::debug!(
            "Capture started: {} channel(s), {} samples, loop={}, format={}, reused={}",
            config.channels.len(),
            config.total_samples,
            config.loop_mode,
            config.format,
            reuse
        );
        Ok(())
    }

    pub(crate) fn init(&mut self) {
        match self.config.clone() {
            Some(config) => {
                self.recycle_all();
                self.total_samples = config.total_samples;
                self.is_loop = config.loop_mode;
                self.reset_cursors();
            }
            None => self.reset_cursors(),
        }
        self.sweep();
    }

    pub(crate) fn clear(&mut self) {
        self.release_all();
        self.config = None;
        self.total_samples = 0;
        self.is_loop = false;
        self.reset_cursors();
        self.counters = Counters::default();
    }

    pub(crate) fn block_count(&self) -> u64 {
        match self.last_index() {
            None => 0,
            Some(last) => {
                let first_block = self.loop_offset >> LEAF_BLOCK_POWER;
                let last_block = self.physical(last) >> LEAF_BLOCK_POWER;
                last_block - first_block + 1
            }
        }
    }

    pub(crate) fn block(&self, id: u16, block_index: u64) -> Result<Option<BlockView>> {
        let channel = self.channel(id)?;
        if block_index >= self.block_count() {
            return Ok(None);
        }
        let physical_block = (self.loop_offset >> LEAF_BLOCK_POWER) + block_index;
        let loc = Location::of(physical_block << LEAF_BLOCK_POWER);
        let Some(root) = channel.root(loc.root) else {
            return Ok(Some(BlockView::Constant(false)));
        };
        Ok(Some(match root.leaf(loc.slot) {
            Some(block) => BlockView::Raw(LeafHandle::new(id, block_index, Arc::clone(block))),
            None => BlockView::Constant(root.first_value(loc.slot)),
        }))
    }

    pub(crate) fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            live_blocks: self.channels.iter().map(ChannelStore::live_leaves).sum(),
            pending_free: self.pending_free.len(),
            spare_blocks: self.spare.len(),
            freed_blocks: self.counters.freed,
            evicted_blocks: self.counters.evicted,
            compacted_blocks: self.counters.compacted,
            allocation_failures: self.counters.allocation_failures,
            dropped_samples: self.counters.dropped_samples,
        }
    }
}

/// Sample store for one logic capture.
///
/// # Example
///
/// ```ignore
/// let snapshot = LogicSnapshot::new();
/// snapshot.first_payload(&CaptureConfig::new(vec![0, 1], 1_000_000, false))?;
/// snapshot.append_payload(&bytes)?;
/// snapshot.capture_ended()?;
/// let edge = snapshot.next_edge(0, 0, 999_999, 0)?;
/// ```
#[derive(Debug, Default)]
pub struct LogicSnapshot {
    inner: Mutex<SnapshotInner>,
}

impl LogicSnapshot {
    /// Create an empty snapshot; call [`first_payload`](Self::first_payload)
    /// before appending data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the snapshot state. A writer that panicked mid-update leaves the
    /// counters consistent enough to keep reading, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SnapshotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re)initialize storage for a new capture run.
    ///
    /// Buffers of the previous run are reused when the geometry is unchanged.
    pub fn first_payload(&self, config: &CaptureConfig) -> Result<()> {
        self.lock().first_payload(config)
    }

    /// Reset cursors and recycle buffers, keeping the current geometry.
    pub fn init(&self) {
        self.lock().init();
    }

    /// Release all storage and forget the configuration.
    pub fn clear(&self) {
        self.lock().clear();
        tracing::debug!("Snapshot cleared");
    }

    pub fn config(&self) -> Option<CaptureConfig> {
        self.lock().config.clone()
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    /// External channel ids in internal order.
    pub fn channel_ids(&self) -> Vec<u16> {
        self.lock().channels.iter().map(ChannelStore::id).collect()
    }

    /// Declared sample budget.
    pub fn total_samples(&self) -> u64 {
        self.lock().total_samples
    }

    /// Number of readable samples per channel.
    pub fn written_samples(&self) -> u64 {
        self.lock().written_samples
    }

    pub fn ring_write_cursor(&self) -> u64 {
        self.lock().ring_write_cursor
    }

    pub fn loop_offset(&self) -> u64 {
        self.lock().loop_offset
    }

    /// Samples dropped from the front by the loop ring.
    pub fn discarded_samples(&self) -> u64 {
        self.lock().discarded_samples
    }

    pub fn is_loop(&self) -> bool {
        self.lock().is_loop
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Whether `channel` is enabled and holds at least one sample.
    pub fn has_data(&self, channel: u16) -> bool {
        let inner = self.lock();
        inner.written_samples > 0 && inner.channel_index(channel).is_ok()
    }

    /// Number of leaf blocks spanned by the readable samples.
    pub fn block_count(&self) -> u64 {
        self.lock().block_count()
    }

    /// Samples per leaf block.
    pub fn block_size(&self) -> u64 {
        LEAF_BLOCK_SAMPLES
    }

    /// Block `block_index` of `channel`, counted from the block holding
    /// logical sample 0. `Ok(None)` past the last block.
    pub fn block(&self, channel: u16, block_index: u64) -> Result<Option<BlockView>> {
        self.lock().block(channel, block_index)
    }

    /// Return a reader handle and free retired buffers nobody references.
    pub fn release(&self, handle: LeafHandle) {
        drop(handle.into_inner());
        self.lock().sweep();
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.lock().metrics()
    }
}
