//! Header sidecar: the small record that makes a store reopenable.

use acorn_common::{BlockNumber, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The persisted tree header.
///
/// Written next to the block file with the same stem and the `.hdr`
/// extension after every successful mutation and on close. Reopening a tree
/// needs only this record; it carries the block-file path inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeHeader {
    /// Path of the block file.
    pub file_name: PathBuf,
    /// Order of the tree.
    pub order: usize,
    /// Size of one node block in bytes.
    pub node_size: usize,
    /// Number of live nodes.
    pub node_count: u64,
    /// Size of the tree in bytes (`node_count * node_size`).
    pub tree_size: u64,
    /// Block number of the root, or -1 for an empty tree.
    pub root_block_number: BlockNumber,
    /// The free-list stack, bottom to top.
    pub unallocated_blocks: Vec<BlockNumber>,
}

impl TreeHeader {
    /// Derives the header path from a block-file path: same stem, `.hdr`
    /// extension (`words.flraf` becomes `words.hdr`).
    pub fn path_for(block_file: &Path) -> PathBuf {
        block_file.with_extension("hdr")
    }

    /// Reads a header record from disk.
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the header record to disk.
    ///
    /// The record lands in a temporary file next to the destination and is
    /// renamed over it, so readers observe either the old header or the new
    /// one, never a torn write.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("hdr.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
