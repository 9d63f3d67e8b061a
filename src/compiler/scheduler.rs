//! Fixpoint execution of block passes on one method.
//!
//! The [`PassScheduler`] runs its passes in registration order, over and over, until a
//! whole round leaves the tree unchanged or the round limit is reached.

use crate::{
    blocks::MethodBlocks,
    compiler::{pass::BlocksPass, EventKind, PassContext},
    Result,
};

/// Runs a list of [`BlocksPass`]es to a fixpoint.
pub struct PassScheduler {
    /// Maximum number of rounds.
    max_iterations: usize,
    /// The passes, in execution order.
    passes: Vec<Box<dyn BlocksPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler that runs at most `max_iterations` rounds.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Appends a pass to the pipeline.
    pub fn add(&mut self, pass: Box<dyn BlocksPass>) {
        self.passes.push(pass);
    }

    /// Names of the registered passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every pass once. Returns `true` if any of them changed the tree.
    fn run_once(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            if !pass.should_run(ctx.config) {
                continue;
            }
            if pass.run_on_method(blocks, ctx)? {
                changed = true;
                ctx.events
                    .record(EventKind::PassCompleted)
                    .method(ctx.method)
                    .pass(pass.name());
                if ctx.config.verify_after_passes {
                    blocks.verify()?;
                }
            }
        }
        Ok(changed)
    }

    /// Runs the pipeline on `blocks` until nothing changes.
    ///
    /// Returns the number of rounds that changed the tree.
    ///
    /// # Errors
    ///
    /// Returns the first pass failure, or an invariant violation if the configuration asks
    /// for verification after each pass.
    pub fn run(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<usize> {
        let mut rounds = 0;
        for _ in 0..self.max_iterations {
            if !self.run_once(blocks, ctx)? {
                break;
            }
            rounds += 1;
        }

        if rounds == self.max_iterations && rounds > 0 {
            ctx.events.warn(format!(
                "{}: passes still changing after {} rounds",
                ctx.method, rounds
            ));
        }
        Ok(rounds)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        compiler::{default_passes, EventLog},
        deobfuscation::EngineConfig,
        metadata::token::Token,
        test::instr,
    };

    /// Reports a change a fixed number of times.
    struct Countdown(AtomicUsize);

    impl BlocksPass for Countdown {
        fn name(&self) -> &'static str {
            "countdown"
        }

        fn run_on_method(&self, _: &mut MethodBlocks, _: &PassContext<'_>) -> Result<bool> {
            let left = self.0.load(Ordering::Relaxed);
            if left == 0 {
                return Ok(false);
            }
            self.0.store(left - 1, Ordering::Relaxed);
            Ok(true)
        }
    }

    #[test]
    fn test_runs_to_fixpoint() {
        let mut scheduler = PassScheduler::new(10);
        scheduler.add(Box::new(Countdown(AtomicUsize::new(3))));

        let config = EngineConfig::default();
        let events = EventLog::new();
        let ctx = PassContext::new(Token::new(0x0600_0001), &config, &events);
        let mut blocks = MethodBlocks::new();

        assert_eq!(scheduler.run(&mut blocks, &ctx).unwrap(), 3);
        assert_eq!(events.count_kind(EventKind::PassCompleted), 3);
        assert_eq!(events.count_kind(EventKind::Warning), 0);
    }

    #[test]
    fn test_round_limit() {
        let mut scheduler = PassScheduler::new(2);
        scheduler.add(Box::new(Countdown(AtomicUsize::new(5))));

        let config = EngineConfig::default();
        let events = EventLog::new();
        let ctx = PassContext::new(Token::new(0x0600_0001), &config, &events);
        let mut blocks = MethodBlocks::new();

        assert_eq!(scheduler.run(&mut blocks, &ctx).unwrap(), 2);
        assert_eq!(events.count_kind(EventKind::Warning), 1);
    }

    #[test]
    fn test_default_pipeline() {
        let mut scheduler = PassScheduler::default();
        for pass in default_passes() {
            scheduler.add(pass);
        }
        assert_eq!(
            scheduler.pass_names(),
            vec!["nop-blocks", "dead-blocks", "block-merging"]
        );

        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("nop")]);
        let exit = blocks.new_block(vec![instr("ret")]);
        let dead = blocks.new_block(vec![instr("ret")]);
        for id in [entry, exit, dead] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(entry, Some(exit)).unwrap();

        let config = EngineConfig::aggressive();
        let events = EventLog::new();
        let ctx = PassContext::new(Token::new(0x0600_0001), &config, &events);
        assert!(scheduler.run(&mut blocks, &ctx).unwrap() >= 1);
        assert_eq!(blocks.all_blocks().unwrap().len(), 1);
        blocks.verify().unwrap();
    }
}
