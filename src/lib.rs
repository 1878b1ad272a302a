//! # logicstore-rs: In-memory sample store for logic analyzer captures
//!
//! Holds billions of one-bit samples across dozens of channels, ingests them
//! from a streamed acquisition byte feed, and finds value transitions (edges)
//! in logarithmic time for renderers, triggers and protocol decoders.
//!
//! ## Architecture
//!
//! - **Store**: leaf blocks of packed samples with a transition mipmap, grouped
//!   under root nodes per channel, all behind one snapshot lock
//! - **Capture**: a producer thread driving ingest, fed over crossbeam channels
//! - **Config**: capture geometry and synthetic replay settings, loaded from TOML
//!
//! ## Example
//!
//! ```ignore
//! use logicstore_rs::{CaptureConfig, LogicSnapshot};
//!
//! let snapshot = LogicSnapshot::new();
//! snapshot.first_payload(&CaptureConfig::new(vec![0, 1], 1_000_000, false))?;
//! snapshot.append_payload(&payload)?;
//! snapshot.capture_ended()?;
//!
//! if let Some(edge) = snapshot.next_edge(0, 0, 999_999, 0)? {
//!     println!("first edge at {}", edge);
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureCommand, CaptureEvent, CaptureHandle, CaptureSession};
pub use config::{CaptureConfig, PayloadFormat, ReplaySettings};
pub use error::{Result, StoreError};
pub use store::{BlockView, LeafHandle, LogicSnapshot, Pattern, Region, Term};
pub use types::{DisplayEdges, Edge, EdgeKind, StoreMetrics, ToggleHint};
