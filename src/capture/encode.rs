//! Acquisition byte streams built from synthetic signals.
//!
//! [`ReplayStream`] turns [`ReplaySettings`] into the chunks a device would
//! deliver, in either payload format. It is what the replay binary and the
//! benchmarks feed through the capture worker.

use crate::config::{PayloadFormat, ReplaySettings, SignalShape};

/// Cross-format bytes for one 64-sample round starting at `base`.
pub fn cross_round(shapes: &[SignalShape], base: u64) -> Vec<u8> {
    shapes
        .iter()
        .flat_map(|shape| shape.word(base).to_le_bytes())
        .collect()
}

/// Unit-format bytes for the ticks `[base, base + count)`.
pub fn unit_ticks(
    channels: &[u16],
    shapes: &[SignalShape],
    unit_size: usize,
    base: u64,
    count: u64,
) -> Vec<u8> {
    let mut out = vec![0u8; unit_size * count as usize];
    for (tick, bytes) in out.chunks_exact_mut(unit_size).enumerate() {
        for (id, shape) in channels.iter().zip(shapes) {
            if shape.level(base + tick as u64) {
                bytes[*id as usize / 8] |= 1 << (id % 8);
            }
        }
    }
    out
}

/// Chunked byte stream of a synthetic capture.
#[derive(Debug, Clone)]
pub struct ReplayStream {
    channels: Vec<u16>,
    shapes: Vec<SignalShape>,
    format: PayloadFormat,
    samples: u64,
    chunk_bytes: usize,
    /// Next sample tick to encode.
    position: u64,
    pending: Vec<u8>,
}

impl ReplayStream {
    pub fn new(settings: &ReplaySettings) -> Self {
        let channels = settings.capture.channels.clone();
        let shapes = channels.iter().map(|id| settings.shape(*id)).collect();
        Self {
            channels,
            shapes,
            format: settings.capture.format,
            samples: settings.samples,
            chunk_bytes: settings.chunk_bytes.max(1),
            position: 0,
            pending: Vec::new(),
        }
    }

    /// Total bytes the stream yields.
    pub fn total_bytes(&self) -> u64 {
        match self.format {
            PayloadFormat::Cross => self.samples.div_ceil(64) * self.channels.len() as u64 * 8,
            PayloadFormat::Unit { unit_size } => self.samples * unit_size as u64,
        }
    }

    fn refill(&mut self) {
        while self.pending.len() < self.chunk_bytes && self.position < self.samples {
            match self.format {
                PayloadFormat::Cross => {
                    self.pending
                        .extend(cross_round(&self.shapes, self.position));
                    self.position += 64;
                }
                PayloadFormat::Unit { unit_size } => {
                    let count = (self.samples - self.position).min(64);
                    self.pending.extend(unit_ticks(
                        &self.channels,
                        &self.shapes,
                        unit_size,
                        self.position,
                        count,
                    ));
                    self.position += count;
                }
            }
        }
    }
}

impl Iterator for ReplayStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.refill();
        if self.pending.is_empty() {
            return None;
        }
        let take = self.chunk_bytes.min(self.pending.len());
        let rest = self.pending.split_off(take);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}
