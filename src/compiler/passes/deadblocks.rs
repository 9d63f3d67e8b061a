//! Unreachable block removal.
//!
//! Wraps [`DeadCodeEliminator`]: everything that can't be reached from the method entry is
//! dropped, together with regions that lost all their reachable code. Handlers of a live
//! protected region always survive.

use crate::{
    blocks::{DeadCodeEliminator, MethodBlocks},
    compiler::{BlocksPass, EventKind, PassContext},
    deobfuscation::EngineConfig,
    Result,
};

/// Removes blocks that no path from the method entry reaches.
pub struct DeadBlockPass;

impl Default for DeadBlockPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadBlockPass {
    /// Creates a new dead block pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BlocksPass for DeadBlockPass {
    fn name(&self) -> &'static str {
        "dead-blocks"
    }

    fn description(&self) -> &'static str {
        "Removes blocks and regions unreachable from the method entry"
    }

    fn should_run(&self, config: &EngineConfig) -> bool {
        config.enable_dead_code_elimination
    }

    fn run_on_method(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<bool> {
        let removed = DeadCodeEliminator::new(blocks).run()?;
        if removed > 0 {
            ctx.events
                .record(EventKind::BlockRemoved)
                .method(ctx.method)
                .count(removed)
                .pass(self.name())
                .message(format!("removed {removed} unreachable blocks"));
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::EventLog, metadata::token::Token, test::instr};

    #[test]
    fn test_removes_and_records() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ret")]);
        let dead = blocks.new_block(vec![instr("ret")]);
        blocks.add(root, entry).unwrap();
        blocks.add(root, dead).unwrap();

        let config = EngineConfig::default();
        let events = EventLog::new();
        let ctx = PassContext::new(Token::new(0x0600_0001), &config, &events);

        let pass = DeadBlockPass::new();
        assert!(pass.run_on_method(&mut blocks, &ctx).unwrap());
        assert_eq!(events.total(EventKind::BlockRemoved), 1);
        assert!(!pass.run_on_method(&mut blocks, &ctx).unwrap());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_disabled_by_config() {
        let config = EngineConfig::new().with_passes(false, true, true);
        assert!(!DeadBlockPass::new().should_run(&config));
    }
}
