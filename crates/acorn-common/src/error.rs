//! Error types for AcornDB.

use crate::block::BlockNumber;
use thiserror::Error;

/// Result type alias using AcornError.
pub type Result<T> = std::result::Result<T, AcornError>;

/// Errors that can occur in AcornDB operations.
#[derive(Debug, Error)]
pub enum AcornError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block size mismatch: expected {expected}, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    // Configuration errors
    #[error("node geometry unsatisfiable: order {order}, node size {node_size}")]
    Geometry { order: usize, node_size: usize },

    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Encoding errors
    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("node overflow: {keys} keys, {links} links (order {order})")]
    NodeOverflow {
        keys: usize,
        links: usize,
        order: usize,
    },

    // Corruption
    #[error("block {block} corrupted: {reason}")]
    CorruptBlock { block: BlockNumber, reason: String },

    #[error("header corrupted: {0}")]
    CorruptHeader(#[from] serde_json::Error),
}
