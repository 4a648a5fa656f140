//! Storage layer for AcornDB.
//!
//! This crate provides:
//! - Fixed-length block file for block-level random access I/O
//! - Free-list allocator over block numbers
//! - Write-back block cache mediating all tree access to the file

mod block_file;
mod cache;
mod freelist;

pub use block_file::BlockFile;
pub use cache::BlockCache;
pub use freelist::FreeList;
