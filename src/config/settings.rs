//! Replay settings for synthetic captures
//!
//! The store itself has no device I/O. These settings describe a synthetic
//! capture that the `logicstore` binary (and the benchmarks) feed through the
//! capture worker: one signal shape per channel, the total number of samples
//! produced and the chunk size used to slice the byte stream.
//!
//! # Main Types
//!
//! - [`ReplaySettings`] - Capture geometry plus the synthetic signals
//! - [`SignalShape`] - Waveform of one channel
//!
//! # Example
//!
//! ```toml
//! samples = 5000000
//! chunk_bytes = 65536
//!
//! [capture]
//! channels = [0, 1]
//! total_samples = 4000000
//! loop_mode = true
//!
//! [[signals]]
//! channel = 0
//! shape = { kind = "step", at = 2500000 }
//!
//! [[signals]]
//! channel = 1
//! shape = { kind = "square", half_period = 3 }
//! ```

use super::CaptureConfig;
use crate::error::{Result, ResultExt, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Waveform of one synthetic channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalShape {
    /// Constant level
    Constant { level: bool },
    /// Low until `at`, high from `at` on
    Step { at: u64 },
    /// Toggles every `half_period` samples, starting low
    Square { half_period: u64 },
    /// A single high sample every `period` samples
    Pulse { period: u64 },
}

impl Default for SignalShape {
    fn default() -> Self {
        SignalShape::Constant { level: false }
    }
}

impl SignalShape {
    /// Level of the waveform at sample `index`
    pub fn level(&self, index: u64) -> bool {
        match *self {
            SignalShape::Constant { level } => level,
            SignalShape::Step { at } => index >= at,
            SignalShape::Square { half_period } => (index / half_period.max(1)) % 2 == 1,
            SignalShape::Pulse { period } => index % period.max(1) == period.max(1) - 1,
        }
    }

    /// 64 consecutive levels starting at `base`, LSB first
    pub fn word(&self, base: u64) -> u64 {
        match *self {
            SignalShape::Constant { level: true } => u64::MAX,
            SignalShape::Constant { level: false } => 0,
            _ => (0..64).fold(0u64, |acc, bit| {
                if self.level(base + bit) {
                    acc | (1 << bit)
                } else {
                    acc
                }
            }),
        }
    }
}

impl std::fmt::Display for SignalShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalShape::Constant { level } => write!(f, "constant {}", *level as u8),
            SignalShape::Step { at } => write!(f, "step at {}", at),
            SignalShape::Square { half_period } => write!(f, "square /{}", half_period),
            SignalShape::Pulse { period } => write!(f, "pulse every {}", period),
        }
    }
}

/// Signal assigned to one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSpec {
    /// External channel id
    pub channel: u16,
    /// Waveform
    #[serde(default)]
    pub shape: SignalShape,
}

/// Synthetic capture description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Store geometry
    pub capture: CaptureConfig,

    /// Samples produced per channel (may exceed the budget in loop mode)
    pub samples: u64,

    /// Size of each payload chunk handed to the store
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Per-channel waveforms; channels without an entry stay low
    #[serde(default)]
    pub signals: Vec<SignalSpec>,
}

fn default_chunk_bytes() -> usize {
    64 * 1024
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::new(vec![0, 1], 1_000_000, false),
            samples: 1_000_000,
            chunk_bytes: default_chunk_bytes(),
            signals: vec![
                SignalSpec {
                    channel: 0,
                    shape: SignalShape::Step { at: 500_000 },
                },
                SignalSpec {
                    channel: 1,
                    shape: SignalShape::Square { half_period: 3 },
                },
            ],
        }
    }
}

impl ReplaySettings {
    /// Waveform of external channel `channel`
    pub fn shape(&self, channel: u16) -> SignalShape {
        self.signals
            .iter()
            .find(|s| s.channel == channel)
            .map(|s| s.shape)
            .unwrap_or_default()
    }

    /// Check the settings for contract violations
    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        if self.chunk_bytes == 0 {
            return Err(StoreError::Config("chunk size must be positive".to_string()));
        }
        if let Some(spec) = self
            .signals
            .iter()
            .find(|s| !self.capture.channels.contains(&s.channel))
        {
            return Err(StoreError::Config(format!(
                "signal for channel {} which is not enabled",
                spec.channel
            )));
        }
        Ok(())
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: ReplaySettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(StoreError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
