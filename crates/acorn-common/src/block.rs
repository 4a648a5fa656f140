//! Block-number primitives shared by the block file, cache, and tree.

/// Zero-based index of a fixed-size block in a block file.
///
/// Signed so that [`NULL_LINK`] can mark an absent child link or an absent
/// root, matching the on-disk link encoding.
pub type BlockNumber = i32;

/// Sentinel marking an absent child link or an empty tree's root.
pub const NULL_LINK: BlockNumber = -1;

/// Size of one encoded child link in bytes (big-endian signed 32-bit).
pub const LINK_SIZE: usize = 4;

/// Encodes a child link as 4 big-endian bytes.
#[inline]
pub fn encode_link(link: BlockNumber) -> [u8; LINK_SIZE] {
    link.to_be_bytes()
}

/// Decodes a child link from 4 big-endian bytes.
#[inline]
pub fn decode_link(buf: [u8; LINK_SIZE]) -> BlockNumber {
    BlockNumber::from_be_bytes(buf)
}
