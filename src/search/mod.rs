pub mod node;
pub mod tree;

pub use node::{Expansion, Node};
pub use tree::{TimeStep, TreeSearch, MAX_TREE_SIZE};
