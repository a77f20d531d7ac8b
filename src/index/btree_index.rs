use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{
    OrdexError, PageId, Result, DEFAULT_INDEX_NAME, DEFAULT_NODE_CAPACITY, INVALID_PAGE_ID,
};

use super::node::{InnerNode, LeafNode, Node, NODE_KIND_LEAF};

/// Tuning knobs recognized by the tree constructor.
pub struct IndexOptions {
    /// Label for the index
    pub name: String,
    /// Maximum logical entries (keys + pointers) per node; a node at this
    /// size splits on the next insert
    pub node_capacity: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_INDEX_NAME.to_string(),
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }
}

/// A B+Tree index over unique `i64` keys mapping to opaque 8-byte record ids.
///
/// Inner pages direct the search and leaf pages hold the entries, all fetched
/// through the buffer pool; the tree itself keeps only the root page id. An
/// insert descends top-down while recording the inner ancestors it passes, so
/// splits propagate upward by walking that per-operation stack instead of
/// parent pointers stored in the nodes.
///
/// Supported operations are unique-key insertion and point lookup. Deletion
/// and the in-order leaf scan over the sibling links are future work.
pub struct BTreeIndex {
    bpm: Arc<BufferPoolManager>,
    /// Root page, INVALID_PAGE_ID until the first insert
    root_page_id: PageId,
    name: String,
    node_capacity: usize,
}

impl BTreeIndex {
    /// Creates an empty index. No page is allocated until the first insert.
    pub fn new(bpm: Arc<BufferPoolManager>, options: IndexOptions) -> Self {
        assert!(options.node_capacity >= 4, "node capacity must be at least 4");
        Self {
            bpm,
            root_page_id: INVALID_PAGE_ID,
            name: options.name,
            node_capacity: options.node_capacity,
        }
    }

    /// Reattaches to an index whose pages already exist in the pool's backing
    /// file, picking up at the given root.
    pub fn open(bpm: Arc<BufferPoolManager>, root_page_id: PageId, options: IndexOptions) -> Self {
        let mut index = Self::new(bpm, options);
        index.root_page_id = root_page_id;
        index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current root page id. Callers that reopen the index later are
    /// responsible for remembering it.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup. Returns the record id stored under the key, or None.
    pub fn get(&self, key: i64) -> Result<Option<i64>> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.read_page(page_id)?;
            let node = Node::from_bytes(&guard.data()[..])?;
            match node {
                Node::Leaf(leaf) => return Ok(leaf.lookup(key)),
                Node::Inner(inner) => page_id = inner.child_for(key),
            }
        }
    }

    /// Inserts a key with its record id.
    ///
    /// Returns true on a new insertion and false for a duplicate key, which
    /// leaves the mapping untouched. An error from the buffer pool or the
    /// pager aborts the insert; splits link new pages only after they are
    /// written, so an aborted insert leaves the tree consistent.
    pub fn insert(&mut self, key: i64, record_id: i64) -> Result<bool> {
        if self.root_page_id == INVALID_PAGE_ID {
            let mut guard = self.bpm.new_page()?;
            let mut leaf = LeafNode::new(self.node_capacity as u32);
            leaf.insert(key, record_id);
            leaf.serialize(&mut guard.data_mut()[..])?;
            self.root_page_id = guard.page_id();
            return Ok(true);
        }

        // Top-down descent to the target leaf, recording the inner ancestors
        // a split would have to revisit.
        let mut ancestors: Vec<PageId> = Vec::new();
        let mut page_id = self.root_page_id;
        let mut leaf = loop {
            let guard = self.bpm.read_page(page_id)?;
            let node = Node::from_bytes(&guard.data()[..])?;
            match node {
                Node::Leaf(leaf) => break leaf,
                Node::Inner(inner) => {
                    ancestors.push(page_id);
                    page_id = inner.child_for(key);
                }
            }
        };

        if leaf.lookup(key).is_some() {
            return Ok(false);
        }

        if leaf.size() < self.node_capacity {
            leaf.insert(key, record_id);
            let mut guard = self.bpm.write_page(page_id)?;
            leaf.serialize(&mut guard.data_mut()[..])?;
            return Ok(true);
        }

        // Overflow: insert first, split at the post-insert midpoint, then
        // copy the right leaf's smallest key up into the parent.
        leaf.insert(key, record_id);
        let (split_key, right) = leaf.split();

        let mut right_guard = self.bpm.new_page()?;
        let right_page_id = right_guard.page_id();
        leaf.right_sibling = right_page_id;

        right.serialize(&mut right_guard.data_mut()[..])?;
        drop(right_guard);
        self.insert_into_parent(&mut ancestors, page_id, split_key, right_page_id)?;

        // The shrunk left leaf goes to its page last: an insert aborted
        // anywhere above leaves the pre-insert leaf intact and the new page
        // unreachable.
        let mut guard = self.bpm.write_page(page_id)?;
        leaf.serialize(&mut guard.data_mut()[..])?;
        Ok(true)
    }

    /// Links a freshly split-off page into the parent popped from the
    /// ancestor stack, splitting upward as needed. `left` is the page that
    /// was split; `right` becomes the right-hand child of `key`.
    fn insert_into_parent(
        &mut self,
        ancestors: &mut Vec<PageId>,
        left: PageId,
        key: i64,
        right: PageId,
    ) -> Result<()> {
        let Some(parent_id) = ancestors.pop() else {
            // The split reached the top of the tree: grow a new root whose
            // first child is the old root.
            let mut guard = self.bpm.new_page()?;
            let mut root = InnerNode::new_root(left);
            root.insert(key, right);
            root.serialize(&mut guard.data_mut()[..])?;
            self.root_page_id = guard.page_id();
            return Ok(());
        };

        let mut inner = {
            let guard = self.bpm.read_page(parent_id)?;
            let node = Node::from_bytes(&guard.data()[..])?;
            match node {
                Node::Inner(inner) => inner,
                // An ancestor can only be an inner node; a leaf here means
                // the page bytes are corrupt.
                Node::Leaf(_) => return Err(OrdexError::InvalidPageType(NODE_KIND_LEAF)),
            }
        };

        if inner.size() < self.node_capacity {
            inner.insert(key, right);
            let mut guard = self.bpm.write_page(parent_id)?;
            inner.serialize(&mut guard.data_mut()[..])?;
            return Ok(());
        }

        // Inner overflow: insert first, then move the middle key up. As with
        // leaves, the shrunk left node is written only after the split has
        // fully propagated upward.
        inner.insert(key, right);
        let (split_key, right_inner) = inner.split();

        let mut right_guard = self.bpm.new_page()?;
        let right_page_id = right_guard.page_id();
        inner.right_sibling = right_page_id;

        right_inner.serialize(&mut right_guard.data_mut()[..])?;
        drop(right_guard);
        self.insert_into_parent(ancestors, parent_id, split_key, right_page_id)?;

        let mut guard = self.bpm.write_page(parent_id)?;
        inner.serialize(&mut guard.data_mut()[..])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_index(pool_size: usize, node_capacity: usize) -> (BTreeIndex, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
        let options = IndexOptions {
            name: "test".to_string(),
            node_capacity,
        };
        (BTreeIndex::new(bpm, options), temp_file)
    }

    #[test]
    fn test_empty_index_has_no_root() {
        let (index, _temp) = create_index(10, 8);
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        assert_eq!(index.get(42).unwrap(), None);
    }

    #[test]
    fn test_first_insert_creates_leaf_root() {
        let (mut index, _temp) = create_index(10, 8);

        assert!(index.insert(1, 100).unwrap());
        assert_ne!(index.root_page_id(), INVALID_PAGE_ID);
        assert_eq!(index.get(1).unwrap(), Some(100));
        assert_eq!(index.get(2).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let (mut index, _temp) = create_index(10, 8);

        assert!(index.insert(1, 100).unwrap());
        assert!(!index.insert(1, 999).unwrap());
        assert_eq!(index.get(1).unwrap(), Some(100));
    }

    #[test]
    fn test_leaf_split_grows_inner_root() {
        let (mut index, _temp) = create_index(10, 8);

        // Capacity 8 holds four pairs per leaf; the fifth insert splits.
        for i in 1..=5 {
            assert!(index.insert(100 + i, i * 10).unwrap());
        }

        let root_guard = index.bpm.read_page(index.root_page_id()).unwrap();
        let root = match Node::from_bytes(&root_guard.data()[..]).unwrap() {
            Node::Inner(inner) => inner,
            Node::Leaf(_) => panic!("root should have grown into an inner node"),
        };
        assert_eq!(root.keys.len(), 2);
        assert_eq!(root.children.len(), 2);

        // The separator is the smallest key of the right leaf.
        let right_guard = index.bpm.read_page(root.children[1]).unwrap();
        let right = match Node::from_bytes(&right_guard.data()[..]).unwrap() {
            Node::Leaf(leaf) => leaf,
            Node::Inner(_) => panic!("child should be a leaf"),
        };
        assert_eq!(root.keys[1], right.keys[0]);

        for i in 1..=5 {
            assert_eq!(index.get(100 + i).unwrap(), Some(i * 10));
        }
    }
}
