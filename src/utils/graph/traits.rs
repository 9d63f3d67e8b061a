//! Trait definitions for graph abstractions.
//!
//! Algorithms are written against these traits rather than a concrete graph type, so the
//! same SCC implementation serves the block scheduler's per-region graphs and the unit tests'
//! adjacency lists.

use crate::utils::graph::NodeId;

/// Base trait providing core graph properties.
///
/// Node identifiers of a graph implementing this trait are expected to be dense, i.e.
/// `NodeId::new(0)..NodeId::new(node_count())`. Algorithms use [`NodeId::index`] to address
/// per-node state vectors.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node identifiers in the graph, in ascending order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Trait for graphs that support forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns an iterator over the successor nodes of the given node.
    ///
    /// Successors are yielded in the order the algorithm should visit them. Duplicates and
    /// self-loops are allowed.
    ///
    /// # Panics
    ///
    /// May panic if `node` is not a valid node in the graph.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
