//! Read-side queries: samples, raw regions, display edges, edge lists.
//!
//! Every query holds the snapshot lock for its whole duration and works on
//! logical indices. Arguments past the written range are clamped.

use super::edge::next_transition;
use super::geometry::{granularity_level, Location, LEAF_BLOCK_POWER, LEAF_BLOCK_SAMPLES};
use super::handle::{LeafHandle, Region};
use super::snapshot::{LogicSnapshot, SnapshotInner};
use crate::error::Result;
use crate::types::{DisplayEdges, Edge, EdgeKind, ToggleHint};
use std::sync::Arc;

impl SnapshotInner {
    pub(crate) fn sample_at(&self, channel: u16, index: u64) -> Result<bool> {
        let store = self.channel(channel)?;
        Ok(match self.last_index() {
            Some(last) => store.sample(self.physical(index.min(last))),
            None => false,
        })
    }

    /// Exact next edge on logical indices.
    fn next_exact(&self, channel: u16, from: u64, to: u64) -> Result<Option<u64>> {
        self.next_edge(channel, from, to, 0)
    }

    pub(crate) fn read_region(&self, channel: u16, start: u64, end: u64) -> Result<Option<Region>> {
        debug_assert!(start <= end, "inverted region {}..{}", start, end);
        let store = self.channel(channel)?;
        let end = end.min(self.written_samples);
        if start >= end {
            return Ok(None);
        }
        let first = self.physical(start);
        let loc = Location::of(first);
        let run_end = self.physical(end).min(loc.block_start() + LEAF_BLOCK_SAMPLES);
        let len = run_end - first;
        let Some(root) = store.root(loc.root) else {
            return Ok(Some(Region::Constant { value: false, len }));
        };
        Ok(Some(match root.leaf(loc.slot) {
            Some(block) => {
                let block_index =
                    (first >> LEAF_BLOCK_POWER) - (self.loop_offset >> LEAF_BLOCK_POWER);
                Region::Raw {
                    handle: LeafHandle::new(channel, block_index, Arc::clone(block)),
                    first_bit: loc.offset,
                    len,
                }
            }
            None => Region::Constant {
                value: root.first_value(loc.slot),
                len,
            },
        }))
    }

    pub(crate) fn display_edges(
        &self,
        channel: u16,
        start: u64,
        end: u64,
        pixel_width: usize,
        max_toggle_hints: usize,
        samples_per_pixel: u64,
    ) -> Result<DisplayEdges> {
        debug_assert!(start <= end, "inverted range {}..{}", start, end);
        let store = self.channel(channel)?;
        let mut out = DisplayEdges::default();
        let Some(last) = self.last_index() else {
            return Ok(out);
        };
        let end = end.min(last);
        if start > end || pixel_width == 0 {
            return Ok(out);
        }
        let spp = samples_per_pixel.max(1);
        let columns = ((end - start) / spp + 1).min(pixel_width as u64) as usize;
        let level = granularity_level(spp);
        let view_end = start
            .saturating_add((columns as u64).saturating_mul(spp) - 1)
            .min(end);
        out.levels.reserve(columns);

        let mut current = store.sample(self.physical(start));
        let mut pos = start.max(1);
        while out.levels.len() < columns {
            let hit = if pos > view_end {
                None
            } else {
                next_transition(store, self.physical(pos), self.physical(view_end), level)
                    .map(|p| p - self.loop_offset)
            };
            let Some(hit) = hit else {
                out.levels.resize(columns, current);
                break;
            };

            // columns before the hit hold no transition
            let column = ((hit - start) / spp) as usize;
            out.levels.resize(column, current);

            let column_start = start.saturating_add((column as u64).saturating_mul(spp));
            let column_end = column_start.saturating_add(spp - 1).min(end);
            current = store.sample(self.physical(column_end));
            out.levels.push(current);

            if out.toggles.len() < max_toggle_hints {
                if let Some(first) = self.next_exact(channel, column_start.max(1), column_end)? {
                    if self.next_exact(channel, first + 1, column_end)?.is_some() {
                        out.toggles.push(ToggleHint {
                            pixel: column,
                            sample: first,
                        });
                    }
                }
            }
            pos = column_end + 1;
        }
        Ok(out)
    }

    pub(crate) fn edges(&self, channel: u16, start: u64, end: u64, kind: EdgeKind) -> Result<Vec<Edge>> {
        let store = self.channel(channel)?;
        let mut out = Vec::new();
        let mut pos = start;
        while let Some(index) = self.next_exact(channel, pos, end)? {
            let level = store.sample(self.physical(index));
            if kind.accepts(level) {
                out.push(Edge { index, level });
            }
            pos = index + 1;
        }
        Ok(out)
    }

    pub(crate) fn min_pulse(&self, channel: u16, start: u64, end: u64) -> Result<u64> {
        self.channel(channel)?;
        let Some(last) = self.last_index() else {
            return Ok(0);
        };
        let end = end.min(last);
        if start >= end {
            return Ok(0);
        }
        let mut shortest = u64::MAX;
        let mut previous = start;
        let mut pos = start + 1;
        while let Some(index) = self.next_exact(channel, pos, end)? {
            shortest = shortest.min(index - previous);
            if shortest == 1 {
                return Ok(1);
            }
            previous = index;
            pos = index + 1;
        }
        Ok(shortest.min(end - previous).max(1))
    }
}

impl LogicSnapshot {
    /// Sample of `channel` at logical `index` (clamped to the last written
    /// sample; low when nothing was written).
    pub fn sample_at(&self, channel: u16, index: u64) -> Result<bool> {
        self.lock().sample_at(channel, index)
    }

    /// Samples `[start, end)` of `channel`, clipped to the leaf block holding
    /// `start`. Call again from `start + region.len()` for the next run.
    pub fn read_region(&self, channel: u16, start: u64, end: u64) -> Result<Option<Region>> {
        self.lock().read_region(channel, start, end)
    }

    /// Pixel-quantized view of `[start, end]`.
    ///
    /// `levels[c]` is the value at the last sample of column `c`. Columns with
    /// more than one transition are reported in `toggles` (at most
    /// `max_toggle_hints` of them) with the index of their first transition.
    pub fn display_edges(
        &self,
        channel: u16,
        start: u64,
        end: u64,
        pixel_width: usize,
        max_toggle_hints: usize,
        samples_per_pixel: u64,
    ) -> Result<DisplayEdges> {
        self.lock().display_edges(
            channel,
            start,
            end,
            pixel_width,
            max_toggle_hints,
            samples_per_pixel,
        )
    }

    /// Every edge of `channel` in `[start, end]` passing `kind`.
    pub fn edges(&self, channel: u16, start: u64, end: u64, kind: EdgeKind) -> Result<Vec<Edge>> {
        self.lock().edges(channel, start, end, kind)
    }

    /// Shortest distance between consecutive edges in `[start, end]`, with the
    /// range bounds counted as edges. Zero for an empty range.
    pub fn min_pulse(&self, channel: u16, start: u64, end: u64) -> Result<u64> {
        self.lock().min_pulse(channel, start, end)
    }
}
