pub mod btree_index;
pub mod node;

pub use btree_index::{BTreeIndex, IndexOptions};
pub use node::{InnerNode, LeafNode, Node};
