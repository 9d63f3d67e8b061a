//! Shared utilities used by the block graph and its algorithms.

pub mod graph;
