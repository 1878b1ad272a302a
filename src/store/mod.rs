//! In-memory sample store for logic captures
//!
//! Samples are one bit per channel. Each channel keeps an array of root nodes;
//! each root node directs 64 leaf blocks of `2^21` samples. A leaf block
//! carries, next to its packed samples, a three-level mipmap of *transitions*
//! so edge searches skip quiet stretches in logarithmic time.
//!
//! # Architecture
//!
//! ```text
//! LogicSnapshot ── Mutex<SnapshotInner>
//!     └── ChannelStore (per enabled channel)
//!           └── RootNode[]  tog / first / last bitmaps
//!                 └── Option<Arc<LeafBlock>> × 64   raw bits + mipmap
//! ```
//!
//! # Components
//!
//! - [`geometry`] - Block sizes and position arithmetic
//! - [`LeafBlock`] - Packed samples and the transition mipmap
//! - [`RootNode`] - Summary bitmaps over 64 leaf blocks
//! - [`ChannelStore`] - Root nodes and ingest cursors of one channel
//! - [`LogicSnapshot`] - Lifecycle, ingest and queries for all channels
//! - [`Pattern`] - Multi-channel pattern search terms
//! - [`LeafHandle`] - Reader access to a leaf buffer outside the lock

pub mod channel;
pub mod edge;
pub mod geometry;
pub mod handle;
pub mod ingest;
pub mod leaf;
pub mod pattern;
pub mod query;
pub mod root;
pub mod snapshot;

pub use channel::ChannelStore;
pub use geometry::{LEAF_BLOCK_SAMPLES, ROOT_FANOUT, ROOT_NODE_SAMPLES};
pub use handle::{BlockView, LeafHandle, Region};
pub use leaf::LeafBlock;
pub use pattern::{Pattern, Term, PATTERN_LOCK_SLICE};
pub use root::RootNode;
pub use snapshot::LogicSnapshot;
