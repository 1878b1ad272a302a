//! Configuration module for the logic sample store
//!
//! This module describes a capture run: which channels are enabled, the
//! declared sample budget, whether the capture loops, and how the acquisition
//! link interleaves channels in the byte stream.
//!
//! # Payload formats
//!
//! - [`PayloadFormat::Cross`] - 64-sample words, one per channel, round robin
//! - [`PayloadFormat::Unit`] - one `unit_size`-byte tick per sample, one bit per channel
//!
//! # Example
//!
//! ```ignore
//! use logicstore_rs::config::CaptureConfig;
//!
//! let config = CaptureConfig::from_toml_str(r#"
//!     channels = [0, 1, 2, 3]
//!     total_samples = 16777216
//!     loop_mode = true
//! "#)?;
//! snapshot.first_payload(&config)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Maximum number of channels a capture may enable
pub const MAX_CHANNELS: usize = 64;

/// Layout of the sample byte stream handed to `append_payload`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Little-endian 64-sample words, word `k` belongs to channel `k % n`
    #[default]
    Cross,
    /// One `unit_size`-byte tick per sample, bit `id` is channel `id`
    Unit { unit_size: usize },
}

impl PayloadFormat {
    /// Bytes per indivisible payload unit (1 for the cross format)
    pub fn stride(&self) -> usize {
        match self {
            PayloadFormat::Cross => 1,
            PayloadFormat::Unit { unit_size } => *unit_size,
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadFormat::Cross => write!(f, "cross"),
            PayloadFormat::Unit { unit_size } => write!(f, "unit({} bytes)", unit_size),
        }
    }
}

/// Geometry of one capture run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// External channel ids, in the order they appear in a cross payload
    pub channels: Vec<u16>,

    /// Declared sample budget per channel
    pub total_samples: u64,

    /// Keep only the newest `total_samples` samples instead of stopping
    #[serde(default)]
    pub loop_mode: bool,

    /// Byte stream layout
    #[serde(default)]
    pub format: PayloadFormat,

    /// Upper bound on allocated leaf blocks across all channels
    #[serde(default)]
    pub memory_limit_blocks: Option<usize>,
}

impl CaptureConfig {
    /// Create a cross-format configuration
    pub fn new(channels: impl Into<Vec<u16>>, total_samples: u64, loop_mode: bool) -> Self {
        Self {
            channels: channels.into(),
            total_samples,
            loop_mode,
            format: PayloadFormat::Cross,
            memory_limit_blocks: None,
        }
    }

    /// Set the payload format
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Limit the number of leaf blocks the store may allocate
    pub fn with_memory_limit(mut self, blocks: usize) -> Self {
        self.memory_limit_blocks = Some(blocks);
        self
    }

    /// Number of enabled channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Check the configuration for contract violations
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(StoreError::Config("no channels enabled".to_string()));
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(StoreError::Config(format!(
                "{} channels enabled, at most {} supported",
                self.channels.len(),
                MAX_CHANNELS
            )));
        }
        if self.total_samples == 0 {
            return Err(StoreError::Config("sample budget must be positive".to_string()));
        }
        let mut seen = HashSet::new();
        for id in &self.channels {
            if !seen.insert(*id) {
                return Err(StoreError::Config(format!("channel {} enabled twice", id)));
            }
        }
        if let PayloadFormat::Unit { unit_size } = self.format {
            if unit_size == 0 {
                return Err(StoreError::Config("unit size must be positive".to_string()));
            }
            if let Some(id) = self.channels.iter().find(|id| **id as usize >= unit_size * 8) {
                return Err(StoreError::Config(format!(
                    "channel {} does not fit in a {}-byte unit",
                    id, unit_size
                )));
            }
        }
        Ok(())
    }

    /// Whether storage allocated for `other` can be reused for this run
    pub fn same_geometry(&self, other: &CaptureConfig) -> bool {
        self.channels == other.channels
            && self.total_samples == other.total_samples
            && self.loop_mode == other.loop_mode
            && self.format == other.format
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CaptureConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(StoreError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
