//! Block merging.
//!
//! A block whose only successor has no other predecessor is joined with that successor,
//! in every region of the method. Conditional branches, switches and region entries are
//! never merged.

use crate::{
    blocks::MethodBlocks,
    compiler::{BlocksPass, EventKind, PassContext},
    deobfuscation::EngineConfig,
    Result,
};

/// Joins straight-line chains of blocks.
pub struct BlockMergePass;

impl Default for BlockMergePass {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockMergePass {
    /// Creates a new block merge pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BlocksPass for BlockMergePass {
    fn name(&self) -> &'static str {
        "block-merging"
    }

    fn description(&self) -> &'static str {
        "Merges blocks into their single predecessor"
    }

    fn should_run(&self, config: &EngineConfig) -> bool {
        config.enable_block_merging
    }

    fn run_on_method(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<bool> {
        let mut merged = 0;
        for scope in blocks.regions()? {
            merged += blocks.merge_blocks(scope)?;
        }

        if merged > 0 {
            ctx.events
                .record(EventKind::BlocksMerged)
                .method(ctx.method)
                .count(merged)
                .pass(self.name());
        }
        Ok(merged > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::EventLog,
        metadata::token::Token,
        test::{instr, target_instr},
    };

    #[test]
    fn test_merges_chain() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let a = blocks.new_block(vec![instr("ldc.i4.1")]);
        let b = blocks.new_block(vec![instr("pop"), target_instr("br", 0)]);
        let c = blocks.new_block(vec![instr("ret")]);
        for id in [a, b, c] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(a, Some(b)).unwrap();
        blocks.set_targets(b, Some(vec![c])).unwrap();

        let config = EngineConfig::default();
        let events = EventLog::new();
        let ctx = PassContext::new(Token::new(0x0600_0001), &config, &events);

        assert!(BlockMergePass::new().run_on_method(&mut blocks, &ctx).unwrap());
        assert_eq!(blocks.children(root).unwrap(), &[a]);
        let merged: Vec<&str> = blocks
            .block(a)
            .unwrap()
            .instructions()
            .iter()
            .map(|i| i.mnemonic)
            .collect();
        assert_eq!(merged, vec!["ldc.i4.1", "pop", "ret"]);
        assert_eq!(events.total(EventKind::BlocksMerged), 2);
        blocks.verify().unwrap();
    }
}
