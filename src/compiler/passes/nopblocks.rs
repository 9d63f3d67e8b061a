//! `nop` block bypassing.

use crate::{
    blocks::MethodBlocks,
    compiler::{BlocksPass, EventKind, PassContext},
    deobfuscation::EngineConfig,
    Result,
};

/// Routes edges around blocks that contain nothing but `nop`s and drops those blocks once
/// nothing reaches them.
pub struct NopBlockPass;

impl Default for NopBlockPass {
    fn default() -> Self {
        Self::new()
    }
}

impl NopBlockPass {
    /// Creates a new `nop` block pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BlocksPass for NopBlockPass {
    fn name(&self) -> &'static str {
        "nop-blocks"
    }

    fn description(&self) -> &'static str {
        "Bypasses and removes nop-only blocks"
    }

    fn should_run(&self, config: &EngineConfig) -> bool {
        config.enable_nop_block_removal
    }

    fn run_on_method(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<bool> {
        let before = blocks.all_blocks()?.len();
        let redirected = blocks.merge_nop_blocks()?;
        let removed = before - blocks.all_blocks()?.len();

        if redirected > 0 {
            ctx.events
                .record(EventKind::NopBlockBypassed)
                .method(ctx.method)
                .count(redirected)
                .pass(self.name());
        }
        if removed > 0 {
            ctx.events
                .record(EventKind::BlockRemoved)
                .method(ctx.method)
                .count(removed)
                .pass(self.name());
        }
        Ok(redirected > 0 || removed > 0)
    }
}
