//! Persistent B-tree for AcornDB.
//!
//! This crate provides:
//! - A tagged node model (leaf or internal)
//! - The node codec translating nodes to and from block-sized buffers
//! - The header sidecar that makes a store reopenable
//! - The B-tree itself: search, top-down pre-emptive insert, and delete
//!   with steal/merge rebalancing

mod codec;
mod header;
mod node;
mod tree;

pub use codec::NodeCodec;
pub use header::TreeHeader;
pub use node::Node;
pub use tree::{BTree, KeyComparator};
