//! Configuration structures for AcornDB.

use crate::block::LINK_SIZE;
use crate::error::{AcornError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a persistent B-tree store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Order of the tree: maximum children per node (maximum keys is order - 1).
    pub order: usize,
    /// Size of one node block in bytes.
    pub node_size: usize,
    /// Number of blocks the cache holds at one time.
    pub cache_capacity: usize,
    /// Path of the block file. By convention ends with `.flraf`.
    pub path: PathBuf,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: 8,
            node_size: 256,
            cache_capacity: 4,
            path: PathBuf::from("./data/keys.flraf"),
        }
    }
}

impl TreeConfig {
    /// Validates the configuration.
    ///
    /// The node size must leave room for `order` child links and divide the
    /// remainder evenly into `order - 1` key slots of at least one byte.
    pub fn validate(&self) -> Result<()> {
        if self.order < 3 {
            return Err(AcornError::InvalidParameter {
                name: "order".to_string(),
                value: self.order.to_string(),
            });
        }
        if self.cache_capacity == 0 {
            return Err(AcornError::InvalidParameter {
                name: "cache_capacity".to_string(),
                value: self.cache_capacity.to_string(),
            });
        }
        let link_bytes = self.order * LINK_SIZE;
        if self.node_size <= link_bytes
            || (self.node_size - link_bytes) % (self.order - 1) != 0
        {
            return Err(AcornError::Geometry {
                order: self.order,
                node_size: self.node_size,
            });
        }
        Ok(())
    }

    /// Width of one key slot in bytes for a valid configuration.
    pub fn key_size(&self) -> usize {
        (self.node_size - self.order * LINK_SIZE) / (self.order - 1)
    }

    /// Minimum number of keys a non-root node must hold: `ceil(order / 2) - 1`.
    pub fn min_key_count(&self) -> usize {
        (self.order + 1) / 2 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_config_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.order, 8);
        assert_eq!(config.node_size, 256);
        assert_eq!(config.cache_capacity, 4);
        assert_eq!(config.path, PathBuf::from("./data/keys.flraf"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_geometry() {
        // 256 bytes - 8 links x 4 bytes = 224 bytes over 7 key slots.
        let config = TreeConfig::default();
        assert_eq!(config.key_size(), 32);
        assert_eq!(config.min_key_count(), 3);
    }

    #[test]
    fn test_min_key_count_odd_order() {
        let config = TreeConfig {
            order: 5,
            node_size: 120, // 120 - 20 = 100 over 4 slots = 25 bytes each
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.min_key_count(), 2);
    }

    #[test]
    fn test_validate_rejects_uneven_geometry() {
        let config = TreeConfig {
            node_size: 255,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcornError::Geometry {
                order: 8,
                node_size: 255
            })
        ));
    }

    #[test]
    fn test_validate_rejects_node_size_without_key_room() {
        let config = TreeConfig {
            node_size: 32, // exactly the link area, no key slots
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AcornError::Geometry { .. })));
    }

    #[test]
    fn test_validate_rejects_small_order() {
        let config = TreeConfig {
            order: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcornError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_cache_capacity() {
        let config = TreeConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcornError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_tree_config_serde_roundtrip() {
        let original = TreeConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: TreeConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.order, deserialized.order);
        assert_eq!(original.node_size, deserialized.node_size);
        assert_eq!(original.cache_capacity, deserialized.cache_capacity);
        assert_eq!(original.path, deserialized.path);
    }
}
