//! Minimal directed graph infrastructure for control-flow analysis.
//!
//! The block graph of a method lives in an arena (see [`crate::blocks::MethodBlocks`]) whose
//! nodes are addressed by [`NodeId`] handles. Algorithms in [`algorithms`] are written against
//! the [`GraphBase`] and [`Successors`] traits so that they can run on the arena as well as on
//! small derived graphs such as the per-region view used by the block scheduler.
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier
//! - [`GraphBase`] / [`Successors`] - Traits algorithms are generic over
//! - [`algorithms`] - Iterative graph algorithms (Tarjan SCC)

pub mod algorithms;
mod node;
mod traits;

pub use node::NodeId;
pub use traits::{GraphBase, Successors};
