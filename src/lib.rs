//! livemsg – Live chat messages driven by a declarative tree
//!
//! This crate keeps an external chat message synchronized with a tree of
//! content, embeds and interactive controls:
//! - Translation of host-tree snapshots into messages within platform limits
//! - A per-instance commit scheduler that coalesces overlapping renders
//! - A capacity-bounded registry of live instances with eviction
//! - Routing of interaction events to the handlers of the committed tree

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core modules implementing the synchronization engine
pub mod runtime;

// Re-export key types for convenience
pub use runtime::{Runtime, RuntimeConfig};

/// Current version of the livemsg crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
