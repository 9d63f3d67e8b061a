//! Graph algorithms for control-flow analysis.
//!
//! # Available Algorithms
//!
//! - [`strongly_connected_components`] - Tarjan's SCC algorithm over a whole graph
//! - [`TarjanState`] - Resumable Tarjan state for visiting from chosen roots
//!
//! All algorithms keep their traversal state on the heap, so the native call stack stays flat
//! no matter how large or deeply nested the analysed method is.

mod scc;

pub use scc::{strongly_connected_components, TarjanState};
