pub mod node_pool;
pub mod node_table;

pub use node_pool::{NodeId, NodePool};
pub use node_table::NodeTable;
