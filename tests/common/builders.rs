//! Test data builders for creating captures

use logicstore_rs::{CaptureConfig, LogicSnapshot, PayloadFormat};

/// Reference waveform of one channel, described by its edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    initial: bool,
    /// Sorted edge indices, all >= 1
    toggles: Vec<u64>,
    len: u64,
}

impl Signal {
    /// Constant level for `len` samples
    pub fn constant(level: bool, len: u64) -> Self {
        Self {
            initial: level,
            toggles: Vec::new(),
            len,
        }
    }

    /// Level `initial` at sample 0, flipping at every index in `edges`
    pub fn edges_at(initial: bool, edges: &[u64], len: u64) -> Self {
        let mut toggles: Vec<u64> = edges.iter().copied().filter(|&e| e >= 1 && e < len).collect();
        toggles.sort_unstable();
        toggles.dedup();
        Self {
            initial,
            toggles,
            len,
        }
    }

    /// Low at sample 0, flipping every `period` samples
    pub fn toggling(period: u64, len: u64) -> Self {
        let period = period.max(1);
        Self {
            initial: false,
            toggles: (1..).map(|k| k * period).take_while(|&e| e < len).collect(),
            len,
        }
    }

    /// Samples in the waveform
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Edge indices
    pub fn edges(&self) -> &[u64] {
        &self.toggles
    }

    /// Level at sample `index`; past the end the last level persists
    pub fn level(&self, index: u64) -> bool {
        let flips = self.toggles.partition_point(|&e| e <= index);
        self.initial ^ (flips % 2 == 1)
    }

    /// 64 consecutive levels starting at `base`, LSB first
    pub fn word(&self, base: u64) -> u64 {
        let mut level = self.level(base);
        let mut word = 0u64;
        let mut bit = 0u64;
        let first = self.toggles.partition_point(|&e| e <= base);
        for &edge in &self.toggles[first..] {
            if edge >= base + 64 {
                break;
            }
            let upto = edge - base;
            if level {
                word |= ones(bit, upto);
            }
            level = !level;
            bit = upto;
        }
        if level {
            word |= ones(bit, 64);
        }
        word
    }
}

/// Bits `[from, to)` set
fn ones(from: u64, to: u64) -> u64 {
    let high = if to >= 64 { u64::MAX } else { (1u64 << to) - 1 };
    high & !((1u64 << from) - 1)
}

/// Builder for captures fed into a [`LogicSnapshot`]
#[derive(Debug, Clone)]
pub struct CaptureBuilder {
    channels: Vec<(u16, Signal)>,
    samples: Option<u64>,
    budget: Option<u64>,
    loop_mode: bool,
    format: PayloadFormat,
    memory_limit: Option<usize>,
    chunk_bytes: usize,
}

impl Default for CaptureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBuilder {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            samples: None,
            budget: None,
            loop_mode: false,
            format: PayloadFormat::Cross,
            memory_limit: None,
            chunk_bytes: 4096,
        }
    }

    pub fn channel(mut self, id: u16, signal: Signal) -> Self {
        self.channels.push((id, signal));
        self
    }

    /// Samples produced per channel; defaults to the longest signal
    pub fn samples(mut self, samples: u64) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Store budget; defaults to the produced sample count
    pub fn budget(mut self, budget: u64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn looped(mut self) -> Self {
        self.loop_mode = true;
        self
    }

    pub fn unit(mut self, unit_size: usize) -> Self {
        self.format = PayloadFormat::Unit { unit_size };
        self
    }

    pub fn memory_limit(mut self, blocks: usize) -> Self {
        self.memory_limit = Some(blocks);
        self
    }

    pub fn chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
            .unwrap_or_else(|| self.channels.iter().map(|(_, s)| s.len()).max().unwrap_or(0))
    }

    pub fn signal(&self, id: u16) -> &Signal {
        &self
            .channels
            .iter()
            .find(|(channel, _)| *channel == id)
            .expect("unknown channel in builder")
            .1
    }

    pub fn config(&self) -> CaptureConfig {
        let ids: Vec<u16> = self.channels.iter().map(|(id, _)| *id).collect();
        let budget = self.budget.unwrap_or_else(|| self.sample_count());
        let config = CaptureConfig::new(ids, budget, self.loop_mode).with_format(self.format);
        match self.memory_limit {
            Some(blocks) => config.with_memory_limit(blocks),
            None => config,
        }
    }

    /// Whole acquisition byte stream
    pub fn payload(&self) -> Vec<u8> {
        let samples = self.sample_count();
        match self.format {
            PayloadFormat::Cross => {
                let rounds = samples.div_ceil(64);
                let mut out = Vec::with_capacity((rounds as usize) * self.channels.len() * 8);
                for round in 0..rounds {
                    for (_, signal) in &self.channels {
                        out.extend_from_slice(&signal.word(round * 64).to_le_bytes());
                    }
                }
                out
            }
            PayloadFormat::Unit { unit_size } => {
                let mut out = vec![0u8; unit_size * samples as usize];
                for (tick, bytes) in out.chunks_exact_mut(unit_size).enumerate() {
                    for (id, signal) in &self.channels {
                        if signal.level(tick as u64) {
                            bytes[*id as usize / 8] |= 1 << (id % 8);
                        }
                    }
                }
                out
            }
        }
    }

    /// Payload split into the configured chunk size
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.payload()
            .chunks(self.chunk_bytes)
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Feed the capture without ending it
    pub fn build_open(&self) -> LogicSnapshot {
        let snapshot = LogicSnapshot::new();
        self.feed(&snapshot);
        snapshot
    }

    /// Feed and end the capture
    pub fn build(&self) -> LogicSnapshot {
        let snapshot = self.build_open();
        snapshot.capture_ended().expect("capture_ended failed");
        snapshot
    }

    /// (Re)start a run on an existing snapshot and feed it
    pub fn feed(&self, snapshot: &LogicSnapshot) {
        snapshot
            .first_payload(&self.config())
            .expect("first_payload failed");
        for chunk in self.payload().chunks(self.chunk_bytes) {
            snapshot.append_payload(chunk).expect("append_payload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_word_matches_levels() {
        let signal = Signal::edges_at(true, &[3, 64, 65, 130, 200], 256);
        for base in [0u64, 1, 60, 64, 100, 192] {
            let word = signal.word(base);
            for bit in 0..64 {
                assert_eq!((word >> bit) & 1 == 1, signal.level(base + bit), "base {} bit {}", base, bit);
            }
        }
    }

    #[test]
    fn test_capture_builder() {
        let builder = CaptureBuilder::new()
            .channel(0, Signal::toggling(10, 128))
            .channel(5, Signal::constant(true, 128))
            .budget(100);
        let config = builder.config();
        assert_eq!(config.channels, vec![0, 5]);
        assert_eq!(config.total_samples, 100);
        assert_eq!(builder.payload().len(), 2 * 2 * 8);
    }
}
