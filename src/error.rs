//! Error handling for the logic sample store
//!
//! This module defines the store's error type and a Result alias used
//! throughout the crate. An exhausted search is not an error: searches return
//! `Ok(None)` when nothing matches.

use thiserror::Error;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid capture configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data was appended before `first_payload`
    #[error("Snapshot not initialized: call first_payload before appending data")]
    NotInitialized,

    /// A query named a channel that is not part of the capture
    #[error("Unknown channel: {0}")]
    UnknownChannel(u16),

    /// Payload length does not match the sample stride
    #[error("Payload length {len} is not a multiple of the {stride}-byte sample stride")]
    PayloadLength { len: usize, stride: usize },

    /// Data was appended after `capture_ended`
    #[error("Capture already ended")]
    CaptureEnded,

    /// A search was stopped through its stop flag
    #[error("Search cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error is a cancelled search rather than a failure
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            StoreError::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
