//! The persistent B-tree.
//!
//! All node access goes through the block cache; every successful mutation
//! rewrites the header sidecar, so the store survives process restarts.
//! The tree owns the cache, which owns the block file; all mutation runs
//! through `&mut self` and nothing here is safe to share across threads.

use crate::codec::NodeCodec;
use crate::header::TreeHeader;
use crate::node::Node;
use acorn_common::{AcornError, BlockNumber, Result, TreeConfig, NULL_LINK};
use acorn_storage::{BlockCache, BlockFile};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Ordering used for keys in the tree.
pub type KeyComparator = Box<dyn Fn(&str, &str) -> Ordering>;

/// Lexicographic ordering on code points, the default.
fn natural_order() -> KeyComparator {
    Box::new(|a, b| a.cmp(b))
}

/// A persistent, disk-backed B-tree storing a set of textual keys.
pub struct BTree {
    order: usize,
    node_size: usize,
    min_key_count: usize,
    root: BlockNumber,
    node_count: u64,
    codec: NodeCodec,
    cache: BlockCache,
    header_path: PathBuf,
    comparator: KeyComparator,
}

impl BTree {
    /// Creates a fresh tree with keys in their natural order.
    pub fn create(config: TreeConfig) -> Result<Self> {
        Self::create_with_comparator(config, natural_order())
    }

    /// Creates a fresh tree ordering keys with the given comparator.
    pub fn create_with_comparator(config: TreeConfig, comparator: KeyComparator) -> Result<Self> {
        config.validate()?;
        if let Some(dir) = config.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let codec = NodeCodec::new(config.order, config.node_size)?;
        let file = BlockFile::open(&config.path, config.node_size)?;
        let cache = BlockCache::new(config.cache_capacity, file)?;

        Ok(Self {
            order: config.order,
            node_size: config.node_size,
            min_key_count: config.min_key_count(),
            root: NULL_LINK,
            node_count: 0,
            codec,
            cache,
            header_path: TreeHeader::path_for(&config.path),
            comparator,
        })
    }

    /// Reopens a tree from its header sidecar, with keys in their natural
    /// order.
    pub fn open(header_path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self> {
        Self::open_with_comparator(header_path, cache_capacity, natural_order())
    }

    /// Reopens a tree from its header sidecar, ordering keys with the given
    /// comparator.
    ///
    /// The comparator must agree with the one the store was written under;
    /// the header does not carry it.
    pub fn open_with_comparator(
        header_path: impl AsRef<Path>,
        cache_capacity: usize,
        comparator: KeyComparator,
    ) -> Result<Self> {
        let header_path = header_path.as_ref().to_path_buf();
        let header = TreeHeader::read_from(&header_path)?;

        let codec = NodeCodec::new(header.order, header.node_size)?;
        let file = BlockFile::open(&header.file_name, header.node_size)?;
        let cache = BlockCache::with_free_list(cache_capacity, file, header.unallocated_blocks)?;

        Ok(Self {
            order: header.order,
            node_size: header.node_size,
            min_key_count: (header.order + 1) / 2 - 1,
            root: header.root_block_number,
            node_count: header.node_count,
            codec,
            cache,
            header_path,
            comparator,
        })
    }

    /// Adds a key to the tree.
    ///
    /// Returns true if the key was newly inserted, false if it was already
    /// present.
    pub fn add(&mut self, key: &str) -> Result<bool> {
        let added = if self.is_empty() {
            let root = self.cache.allocate();
            self.write_node(root, &Node::leaf_with_keys(vec![key.to_string()]))?;
            self.root = root;
            self.node_count += 1;
            true
        } else {
            self.insert_top_down(key)?
        };

        if added {
            self.write_header()?;
        }
        Ok(added)
    }

    /// Removes a key from the tree.
    ///
    /// Returns true if the key was present and is now removed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        let removed = self.delete_from(self.root, None, key)?;
        if removed {
            self.write_header()?;
        }
        Ok(removed)
    }

    /// Tests whether a key is in the tree.
    pub fn contains(&mut self, key: &str) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let mut node = self.read_node(self.root)?;
        loop {
            let index = self.key_index(&node, key);
            if index < node.key_count()
                && (self.comparator)(&node.keys()[index], key) == Ordering::Equal
            {
                return Ok(true);
            }
            let child = match &node {
                Node::Leaf { .. } => return Ok(false),
                Node::Internal { children, .. } => children[index],
            };
            node = self.read_node(child)?;
        }
    }

    /// Returns true if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root == NULL_LINK
    }

    /// Returns the size of the tree in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.node_count * self.node_size as u64
    }

    /// Flushes the cache, syncs the block file, and rewrites the header.
    pub fn close(&mut self) -> Result<()> {
        self.cache.close()?;
        self.write_header()
    }

    /// Descends from the root, splitting every full node on the way down so
    /// the parent always has room for a promoted key, and inserts at a leaf.
    fn insert_top_down(&mut self, key: &str) -> Result<bool> {
        let mut block = self.root;
        let mut parent: Option<(Node, BlockNumber)> = None;

        loop {
            let mut node = self.read_node(block)?;

            if node.key_count() == self.order - 1 {
                // Continue from the parent: the promoted key may equal the
                // one being inserted, and the descent must re-aim at one of
                // the halves.
                let (split_parent, split_parent_block) =
                    self.split_node(block, node, parent.take())?;
                node = split_parent;
                block = split_parent_block;
            }

            let index = self.key_index(&node, key);
            if index < node.key_count()
                && (self.comparator)(&node.keys()[index], key) == Ordering::Equal
            {
                return Ok(false);
            }

            if node.is_leaf() {
                node.keys_mut().insert(index, key.to_string());
                self.write_node(block, &node)?;
                return Ok(true);
            }

            let child = node.children()[index];
            parent = Some((node, block));
            block = child;
        }
    }

    /// Splits the full node at `block` around its median key, promoting the
    /// median into the parent. A root split synthesizes the parent and makes
    /// it the new root. Returns the parent and its block number.
    fn split_node(
        &mut self,
        block: BlockNumber,
        node: Node,
        parent: Option<(Node, BlockNumber)>,
    ) -> Result<(Node, BlockNumber)> {
        let mid = (node.key_count() + 1) / 2 - 1;
        let promoted = node.keys()[mid].clone();

        let (left, right) = match node {
            Node::Leaf { mut keys } => {
                let right_keys = keys.split_off(mid + 1);
                keys.truncate(mid);
                (Node::leaf_with_keys(keys), Node::leaf_with_keys(right_keys))
            }
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let right_keys = keys.split_off(mid + 1);
                keys.truncate(mid);
                let right_children = children.split_off(mid + 1);
                (
                    Node::internal(keys, children),
                    Node::internal(right_keys, right_children),
                )
            }
        };

        let (mut parent_node, parent_block) = match parent {
            Some((existing, existing_block)) => (existing, existing_block),
            None => (Node::internal(Vec::new(), vec![block]), NULL_LINK),
        };

        let index = self.key_index(&parent_node, &promoted);
        parent_node.keys_mut().insert(index, promoted);

        let right_block = self.cache.allocate();
        self.write_node(block, &left)?;
        self.write_node(right_block, &right)?;

        match &mut parent_node {
            Node::Internal { children, .. } => {
                children[index] = block;
                children.insert(index + 1, right_block);
            }
            Node::Leaf { .. } => {
                return Err(AcornError::CorruptBlock {
                    block: parent_block,
                    reason: "parent of a split node is a leaf".to_string(),
                });
            }
        }
        self.node_count += 1;

        let parent_block = if parent_block == NULL_LINK {
            let new_root = self.cache.allocate();
            self.root = new_root;
            self.node_count += 1;
            new_root
        } else {
            parent_block
        };
        self.write_node(parent_block, &parent_node)?;

        Ok((parent_node, parent_block))
    }

    /// Deletes `key` from the subtree rooted at `block`.
    ///
    /// `parent` carries the parent node and the child index this subtree
    /// occupies in it, so rebalancing never has to re-locate the child.
    /// The parent's eventual write-back in its own frame commits any
    /// mutation rebalancing makes to it.
    fn delete_from(
        &mut self,
        block: BlockNumber,
        parent: Option<(&mut Node, usize)>,
        key: &str,
    ) -> Result<bool> {
        let mut node = self.read_node(block)?;
        let index = self.key_index(&node, key);
        let found = index < node.key_count()
            && (self.comparator)(&node.keys()[index], key) == Ordering::Equal;

        if !found {
            let child = match &node {
                Node::Leaf { .. } => return Ok(false),
                Node::Internal { children, .. } => children[index],
            };
            if !self.delete_from(child, Some((&mut node, index)), key)? {
                return Ok(false);
            }
        } else if !node.is_leaf() {
            // Overwrite with the in-order predecessor, then delete the
            // predecessor from the subtree it came out of.
            let predecessor = self.predecessor_key(&node, index)?;
            node.keys_mut()[index] = predecessor.clone();
            let child = node.children()[index];
            self.delete_from(child, Some((&mut node, index)), &predecessor)?;
        } else {
            node.keys_mut().remove(index);
        }

        let at_root = parent.is_none();
        if node.key_count() < self.min_key_count {
            if let Some((parent_node, child_index)) = parent {
                self.rebalance(&mut node, parent_node, child_index)?;
            }
        }

        if at_root && node.key_count() == 0 {
            self.root = match &node {
                Node::Leaf { .. } => NULL_LINK,
                Node::Internal { children, .. } => children[0],
            };
            self.cache.deallocate(block);
            self.node_count -= 1;
        } else {
            self.write_node(block, &node)?;
        }
        Ok(true)
    }

    /// Finds the in-order predecessor of the key at `index` in `node`: the
    /// last key of the rightmost leaf below the child to its left.
    fn predecessor_key(&mut self, node: &Node, index: usize) -> Result<String> {
        let mut block = node.children()[index];
        let mut current = self.read_node(block)?;
        loop {
            let next = match &current {
                Node::Leaf { .. } => break,
                Node::Internal { children, .. } => children[children.len() - 1],
            };
            block = next;
            current = self.read_node(next)?;
        }
        match current.keys().last() {
            Some(key) => Ok(key.clone()),
            None => Err(AcornError::CorruptBlock {
                block,
                reason: "empty leaf on predecessor path".to_string(),
            }),
        }
    }

    /// Restores the minimum key count of `node`, child `child_index` of
    /// `parent`: steal a key through the parent from a sibling with keys to
    /// spare, or failing that merge with a sibling (preferring the left).
    fn rebalance(
        &mut self,
        node: &mut Node,
        parent: &mut Node,
        child_index: usize,
    ) -> Result<()> {
        let left_block = (child_index > 0).then(|| parent.children()[child_index - 1]);
        let right_block =
            (child_index < parent.key_count()).then(|| parent.children()[child_index + 1]);

        let left = match left_block {
            Some(block) => Some(self.read_node(block)?),
            None => None,
        };
        let right = match right_block {
            Some(block) => Some(self.read_node(block)?),
            None => None,
        };

        match (left_block, left, right_block, right) {
            // Steal from the left sibling.
            (Some(sibling_block), Some(mut sibling), _, _)
                if sibling.key_count() > self.min_key_count =>
            {
                node.keys_mut()
                    .insert(0, parent.keys()[child_index - 1].clone());
                if let Some(stolen) = sibling.keys_mut().pop() {
                    parent.keys_mut()[child_index - 1] = stolen;
                }
                if let (Some(links), Some(sibling_links)) =
                    (links_mut(node), links_mut(&mut sibling))
                {
                    if let Some(link) = sibling_links.pop() {
                        links.insert(0, link);
                    }
                }
                self.write_node(sibling_block, &sibling)?;
            }
            // Steal from the right sibling.
            (_, _, Some(sibling_block), Some(mut sibling))
                if sibling.key_count() > self.min_key_count =>
            {
                node.keys_mut().push(parent.keys()[child_index].clone());
                parent.keys_mut()[child_index] = sibling.keys_mut().remove(0);
                if let (Some(links), Some(sibling_links)) =
                    (links_mut(node), links_mut(&mut sibling))
                {
                    if !sibling_links.is_empty() {
                        links.push(sibling_links.remove(0));
                    }
                }
                self.write_node(sibling_block, &sibling)?;
            }
            // Merge with the left sibling.
            (Some(sibling_block), Some(mut sibling), _, _) => {
                let separator = parent.keys_mut().remove(child_index - 1);
                node.keys_mut().insert(0, separator);
                let sibling_keys = std::mem::take(sibling.keys_mut());
                node.keys_mut().splice(0..0, sibling_keys);
                if let (Some(links), Some(sibling_links)) =
                    (links_mut(node), links_mut(&mut sibling))
                {
                    let sibling_links = std::mem::take(sibling_links);
                    links.splice(0..0, sibling_links);
                }
                if let Some(parent_links) = links_mut(parent) {
                    parent_links.remove(child_index - 1);
                }
                self.cache.deallocate(sibling_block);
                self.node_count -= 1;
            }
            // Merge with the right sibling.
            (_, _, Some(sibling_block), Some(mut sibling)) => {
                let separator = parent.keys_mut().remove(child_index);
                node.keys_mut().push(separator);
                let sibling_keys = std::mem::take(sibling.keys_mut());
                node.keys_mut().extend(sibling_keys);
                if let (Some(links), Some(sibling_links)) =
                    (links_mut(node), links_mut(&mut sibling))
                {
                    links.append(sibling_links);
                }
                if let Some(parent_links) = links_mut(parent) {
                    parent_links.remove(child_index + 1);
                }
                self.cache.deallocate(sibling_block);
                self.node_count -= 1;
            }
            _ => {}
        }
        Ok(())
    }

    /// Index of the first key in `node` that is not less than `key`; equals
    /// the key count when every key is smaller.
    fn key_index(&self, node: &Node, key: &str) -> usize {
        node.keys()
            .iter()
            .take_while(|k| (self.comparator)(key, k.as_str()) == Ordering::Greater)
            .count()
    }

    fn read_node(&mut self, block: BlockNumber) -> Result<Node> {
        let bytes = self.cache.read(block)?;
        self.codec.decode(block, &bytes)
    }

    fn write_node(&mut self, block: BlockNumber, node: &Node) -> Result<()> {
        let bytes = self.codec.encode(node)?;
        self.cache.write(block, bytes)
    }

    fn write_header(&self) -> Result<()> {
        TreeHeader {
            file_name: self.cache.file().path().to_path_buf(),
            order: self.order,
            node_size: self.node_size,
            node_count: self.node_count,
            tree_size: self.size_in_bytes(),
            root_block_number: self.root,
            unallocated_blocks: self.cache.free_blocks().to_vec(),
        }
        .write_to(&self.header_path)
    }
}

impl Drop for BTree {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn links_mut(node: &mut Node) -> Option<&mut Vec<BlockNumber>> {
    match node {
        Node::Leaf { .. } => None,
        Node::Internal { children, .. } => Some(children),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> TreeConfig {
        TreeConfig {
            path: dir.join("keys.flraf"),
            ..Default::default()
        }
    }

    fn create_test_tree(dir: &Path) -> BTree {
        BTree::create(test_config(dir)).unwrap()
    }

    #[test]
    fn test_new_tree_is_empty() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        assert!(tree.is_empty());
        assert_eq!(tree.size_in_bytes(), 0);
        assert!(!tree.contains("anything").unwrap());
    }

    #[test]
    fn test_first_add_creates_root() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        assert!(tree.add("oak").unwrap());
        assert!(!tree.is_empty());
        assert_eq!(tree.size_in_bytes(), 256);
        assert!(tree.contains("oak").unwrap());
        assert!(!tree.contains("elm").unwrap());
    }

    #[test]
    fn test_duplicate_add_returns_false() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        assert!(tree.add("apple").unwrap());
        assert!(!tree.add("apple").unwrap());
        assert_eq!(tree.size_in_bytes(), 256);
    }

    #[test]
    fn test_remove_last_key_empties_tree() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        tree.add("only").unwrap();
        assert!(tree.remove("only").unwrap());
        assert!(tree.is_empty());
        assert_eq!(tree.size_in_bytes(), 0);
        assert!(!tree.contains("only").unwrap());
    }

    #[test]
    fn test_remove_from_empty_tree() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());
        assert!(!tree.remove("ghost").unwrap());
    }

    #[test]
    fn test_remove_missing_key_returns_false() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        tree.add("present").unwrap();
        assert!(!tree.remove("absent").unwrap());
        assert!(tree.contains("present").unwrap());
    }

    #[test]
    fn test_double_remove_returns_false() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        tree.add("x").unwrap();
        assert!(tree.remove("x").unwrap());
        assert!(!tree.remove("x").unwrap());
    }

    #[test]
    fn test_block_reused_after_root_removal() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        tree.add("a").unwrap();
        tree.remove("a").unwrap();
        // The freed root block is the next allocation.
        tree.add("b").unwrap();
        assert_eq!(tree.root, 0);
    }

    #[test]
    fn test_root_split() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        for key in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            assert!(tree.add(key).unwrap());
        }

        // Seven keys fill the root; the eighth splits it.
        assert_eq!(tree.node_count, 3);
        let root = tree.read_node(tree.root).unwrap();
        assert_eq!(root.keys(), &["d"]);
        assert_eq!(root.children().len(), 2);
        for key in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            assert!(tree.contains(key).unwrap());
        }
    }

    #[test]
    fn test_header_written_after_add() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        tree.add("k").unwrap();
        let header = TreeHeader::read_from(&dir.path().join("keys.hdr")).unwrap();
        assert_eq!(header.node_count, 1);
        assert_eq!(header.root_block_number, 0);
        assert_eq!(header.order, 8);
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("keys.hdr");

        {
            let mut tree = create_test_tree(dir.path());
            for key in ["fir", "ash", "yew", "oak", "elm"] {
                tree.add(key).unwrap();
            }
            tree.close().unwrap();
        }

        let mut tree = BTree::open(&header_path, 4).unwrap();
        for key in ["fir", "ash", "yew", "oak", "elm"] {
            assert!(tree.contains(key).unwrap());
        }
        assert!(!tree.contains("beech").unwrap());
        assert_eq!(tree.size_in_bytes(), 256);
    }

    #[test]
    fn test_open_missing_header_fails() {
        let dir = tempdir().unwrap();
        assert!(BTree::open(dir.path().join("absent.hdr"), 4).is_err());
    }

    #[test]
    fn test_custom_comparator() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create_with_comparator(
            test_config(dir.path()),
            Box::new(|a, b| b.cmp(a)), // reverse order
        )
        .unwrap();

        for key in ["a", "b", "c", "d"] {
            tree.add(key).unwrap();
        }
        let root = tree.read_node(tree.root).unwrap();
        assert_eq!(root.keys(), &["d", "c", "b", "a"]);
        assert!(tree.contains("b").unwrap());
        assert!(!tree.contains("e").unwrap());
    }

    #[test]
    fn test_oversized_key_is_rejected() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        let long_key = "k".repeat(33); // key slots hold 32 bytes
        assert!(matches!(
            tree.add(&long_key),
            Err(AcornError::KeyTooLarge { .. })
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_many_keys_stay_reachable() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        let keys: Vec<String> = (0..100).map(|i| format!("key{i:03}")).collect();
        for key in &keys {
            assert!(tree.add(key).unwrap());
        }
        for key in &keys {
            assert!(tree.contains(key).unwrap(), "lost {key}");
        }
        assert!(!tree.contains("key100").unwrap());
    }

    #[test]
    fn test_interleaved_add_remove() {
        let dir = tempdir().unwrap();
        let mut tree = create_test_tree(dir.path());

        let keys: Vec<String> = (0..60).map(|i| format!("w{i:02}")).collect();
        for key in &keys {
            tree.add(key).unwrap();
        }
        // Remove every other key.
        for key in keys.iter().step_by(2) {
            assert!(tree.remove(key).unwrap(), "failed to remove {key}");
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(tree.contains(key).unwrap(), i % 2 == 1, "wrong answer for {key}");
        }
    }
}
