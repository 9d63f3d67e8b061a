//! Built-in block passes.
//!
//! - [`DeadBlockPass`] - removes code unreachable from the method entry
//! - [`BlockMergePass`] - joins blocks with their single predecessor
//! - [`NopBlockPass`] - routes edges around `nop`-only blocks
//!
//! [`default_passes`] returns them in the order the engine runs them.

mod deadblocks;
mod merge;
mod nopblocks;

pub use deadblocks::DeadBlockPass;
pub use merge::BlockMergePass;
pub use nopblocks::NopBlockPass;

use crate::compiler::BlocksPass;

/// The built-in passes in pipeline order.
#[must_use]
pub fn default_passes() -> Vec<Box<dyn BlocksPass>> {
    vec![
        Box::new(NopBlockPass::new()),
        Box::new(DeadBlockPass::new()),
        Box::new(BlockMergePass::new()),
    ]
}
