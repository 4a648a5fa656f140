//! Node codec: translates tree nodes to and from block-sized buffers.
//!
//! Layout of one node block (exactly `node_size` bytes):
//!
//! ```text
//! +---------------------------------------+------------------------------+
//! | key slots: (order - 1) * key_size     | link slots: order * 4        |
//! | each space-padded on the right        | big-endian signed 32-bit     |
//! | unused slots all-space                | unused slots encode -1       |
//! +---------------------------------------+------------------------------+
//! ```
//!
//! where `key_size = (node_size - order * 4) / (order - 1)` must come out
//! whole. Decoding walks the key slots until the first slot that trims to an
//! empty string, then the link slots until the first -1.

use crate::node::Node;
use acorn_common::{
    decode_link, encode_link, AcornError, BlockNumber, Result, LINK_SIZE, NULL_LINK,
};
use bytes::{Bytes, BytesMut};

/// Codec for one node geometry.
#[derive(Debug, Clone)]
pub struct NodeCodec {
    order: usize,
    node_size: usize,
    key_size: usize,
}

impl NodeCodec {
    /// Creates a codec for the given order and node size.
    ///
    /// Fails when the geometry does not divide into whole key slots of at
    /// least one byte.
    pub fn new(order: usize, node_size: usize) -> Result<Self> {
        if order < 3 {
            return Err(AcornError::InvalidParameter {
                name: "order".to_string(),
                value: order.to_string(),
            });
        }
        let link_bytes = order * LINK_SIZE;
        if node_size <= link_bytes || (node_size - link_bytes) % (order - 1) != 0 {
            return Err(AcornError::Geometry { order, node_size });
        }
        Ok(Self {
            order,
            node_size,
            key_size: (node_size - link_bytes) / (order - 1),
        })
    }

    /// Maximum children per node.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Size of one encoded node in bytes.
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Width of one key slot in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Offset of the link area: the key slots end here.
    fn link_area(&self) -> usize {
        (self.order - 1) * self.key_size
    }

    /// Encodes a node into a block-sized buffer.
    ///
    /// Fails when the node holds more keys or links than the order allows,
    /// or when a key does not fit its slot or would not survive the
    /// space-trimming decode (empty, or ending in a space).
    pub fn encode(&self, node: &Node) -> Result<Bytes> {
        let keys = node.keys();
        let links = node.children();
        if keys.len() > self.order - 1 || links.len() > self.order {
            return Err(AcornError::NodeOverflow {
                keys: keys.len(),
                links: links.len(),
                order: self.order,
            });
        }

        let mut buf = BytesMut::with_capacity(self.node_size);
        for key in keys {
            if key.len() > self.key_size {
                return Err(AcornError::KeyTooLarge {
                    size: key.len(),
                    max: self.key_size,
                });
            }
            if key.is_empty() || key.ends_with(' ') {
                return Err(AcornError::InvalidParameter {
                    name: "key".to_string(),
                    value: format!("{key:?}"),
                });
            }
            buf.extend_from_slice(key.as_bytes());
            buf.resize(buf.len() + (self.key_size - key.len()), b' ');
        }
        buf.resize(self.link_area(), b' ');

        for link in links {
            buf.extend_from_slice(&encode_link(*link));
        }
        for _ in links.len()..self.order {
            buf.extend_from_slice(&encode_link(NULL_LINK));
        }

        Ok(buf.freeze())
    }

    /// Decodes a node from a block-sized buffer.
    ///
    /// `block` is only used to report where corruption was found.
    pub fn decode(&self, block: BlockNumber, bytes: &[u8]) -> Result<Node> {
        if bytes.len() != self.node_size {
            return Err(AcornError::BlockSizeMismatch {
                expected: self.node_size,
                actual: bytes.len(),
            });
        }

        let mut keys = Vec::new();
        for slot in 0..self.order - 1 {
            let raw = &bytes[slot * self.key_size..(slot + 1) * self.key_size];
            let text = std::str::from_utf8(raw).map_err(|_| AcornError::CorruptBlock {
                block,
                reason: format!("key slot {slot} is not valid UTF-8"),
            })?;
            let key = text.trim_end_matches(|c: char| c <= ' ');
            if key.is_empty() {
                break;
            }
            keys.push(key.to_string());
        }

        let mut links = Vec::new();
        for slot in 0..self.order {
            let offset = self.link_area() + slot * LINK_SIZE;
            let raw: [u8; LINK_SIZE] =
                bytes[offset..offset + LINK_SIZE]
                    .try_into()
                    .map_err(|_| AcornError::CorruptBlock {
                        block,
                        reason: format!("link slot {slot} is truncated"),
                    })?;
            let link = decode_link(raw);
            if link == NULL_LINK {
                break;
            }
            if link < 0 {
                return Err(AcornError::CorruptBlock {
                    block,
                    reason: format!("link slot {slot} holds invalid block {link}"),
                });
            }
            links.push(link);
        }

        if links.is_empty() {
            Ok(Node::leaf_with_keys(keys))
        } else if links.len() == keys.len() + 1 {
            Ok(Node::internal(keys, links))
        } else {
            Err(AcornError::CorruptBlock {
                block,
                reason: format!("{} keys but {} child links", keys.len(), links.len()),
            })
        }
    }
}
