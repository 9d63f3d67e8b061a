//! Main deobfuscation engine.
//!
//! The [`DeobfuscationEngine`] runs the per-method pipeline:
//!
//! 1. **Build**: [`GraphBuilder`] turns the body into a block tree
//! 2. **Passes**: the [`PassScheduler`] runs the enabled block passes to a fixpoint
//! 3. **Reorder**: [`repartition`] schedules every region and repairs stack order
//! 4. **Generate**: [`CodeGenerator`] emits the new body
//!
//! Methods are independent, so batches are spread over the rayon thread pool.

use std::time::Instant;

use rayon::prelude::*;

use crate::{
    blocks::{repartition, CodeGenerator, GraphBuilder},
    compiler::{default_passes, BlocksPass, EventKind, EventLog, PassContext, PassScheduler},
    deobfuscation::{config::EngineConfig, result::DeobfuscationResult},
    metadata::{method::MethodBody, token::Token},
    Result,
};

/// Main deobfuscation engine.
///
/// # Example
///
/// ```rust
/// use cilflow::{
///     assembly::{Instruction, Operand},
///     deobfuscation::{DeobfuscationEngine, EngineConfig},
///     metadata::{method::MethodBody, token::Token},
/// };
///
/// let engine = DeobfuscationEngine::new(EngineConfig::default());
/// let body = MethodBody::new(
///     vec![
///         Instruction::new("br", Operand::Target(2))?,
///         Instruction::new("nop", Operand::None)?,
///         Instruction::new("ret", Operand::None)?,
///     ],
///     vec![],
/// );
///
/// let cleaned = engine.process_method(Token::new(0x0600_0001), &body)?;
/// assert_eq!(cleaned.instructions.len(), 1);
/// # Ok::<(), cilflow::Error>(())
/// ```
pub struct DeobfuscationEngine {
    /// Configuration.
    config: EngineConfig,
    /// Pass scheduler holding the enabled passes.
    scheduler: PassScheduler,
    /// Events of every method processed so far.
    events: EventLog,
}

impl Default for DeobfuscationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DeobfuscationEngine {
    /// Creates a new engine with the built-in passes that `config` enables.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let mut scheduler = PassScheduler::new(config.max_iterations);
        for pass in default_passes() {
            if pass.should_run(&config) {
                scheduler.add(pass);
            }
        }

        Self {
            config,
            scheduler,
            events: EventLog::new(),
        }
    }

    /// Appends a custom pass after the built-in ones.
    pub fn add_pass(&mut self, pass: Box<dyn BlocksPass>) {
        self.scheduler.add(pass);
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Runs the pipeline on one method body and returns the regenerated body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedExceptionTable`] or [`crate::Error::Malformed`] for
    /// bodies the builder rejects, and any invariant violation a later stage detects. The
    /// failure is also recorded as an error event.
    pub fn process_method(&self, token: Token, body: &MethodBody) -> Result<MethodBody> {
        self.process_with(token, body, &self.events)
    }

    /// Runs the pipeline on every method, in parallel unless the configuration disables it.
    ///
    /// The batch's events are returned in the result and also appended to
    /// [`DeobfuscationEngine::events`].
    pub fn process_methods(&self, methods: &[(Token, MethodBody)]) -> DeobfuscationResult {
        let start = Instant::now();
        let events = EventLog::new();

        let outcomes: Vec<(Token, Result<MethodBody>)> = if self.config.parallel {
            methods
                .par_iter()
                .map(|(token, body)| (*token, self.process_with(*token, body, &events)))
                .collect()
        } else {
            methods
                .iter()
                .map(|(token, body)| (*token, self.process_with(*token, body, &events)))
                .collect()
        };

        self.events.merge(&events);
        DeobfuscationResult::new(outcomes, events).with_timing(start.elapsed())
    }

    fn process_with(&self, token: Token, body: &MethodBody, events: &EventLog) -> Result<MethodBody> {
        events
            .record(EventKind::MethodProcessingStarted)
            .method(token);

        let result = self.run_pipeline(token, body, events);
        match &result {
            Ok(output) => {
                events
                    .record(EventKind::CodeRegenerated)
                    .method(token)
                    .count(output.instructions.len())
                    .message(format!(
                        "{} -> {} instructions",
                        body.instructions.len(),
                        output.instructions.len()
                    ));
            }
            Err(error) => events.error(format!("{token}: {error}")),
        }

        events
            .record(EventKind::MethodProcessingCompleted)
            .method(token);
        result
    }

    fn run_pipeline(&self, token: Token, body: &MethodBody, events: &EventLog) -> Result<MethodBody> {
        let mut blocks = GraphBuilder::new(body)
            .strip_branches(self.config.strip_branches)
            .build()?;

        let ctx = PassContext::new(token, &self.config, events);
        self.scheduler.run(&mut blocks, &ctx)?;

        if self.config.reorder_blocks {
            let reordered = repartition(&mut blocks)?;
            if reordered > 0 {
                events
                    .record(EventKind::RegionReordered)
                    .method(token)
                    .count(reordered);
            }
            if self.config.verify_after_passes {
                blocks.verify()?;
            }
        }

        let (output, flipped) = CodeGenerator::new(&blocks).generate_with_flips()?;
        if flipped > 0 {
            events
                .record(EventKind::BranchFlipped)
                .method(token)
                .count(flipped);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::method::ExceptionHandler,
        test::{instr, mnemonics, target_instr},
        Error,
    };

    #[test]
    fn test_process_method_cleans_up() {
        let engine = DeobfuscationEngine::default();
        let body = MethodBody::new(
            vec![
                instr("ldarg.0"),
                target_instr("br", 3),
                instr("nop"),
                instr("ret"),
            ],
            vec![],
        );
        let output = engine.process_method(Token::new(0x0600_0001), &body).unwrap();
        assert_eq!(mnemonics(&output), vec!["ldarg.0", "ret"]);
        assert_eq!(engine.events().count_kind(EventKind::CodeRegenerated), 1);
    }

    #[test]
    fn test_process_method_reports_malformed_body() {
        let engine = DeobfuscationEngine::default();
        let body = MethodBody::new(
            vec![instr("nop"), instr("ret")],
            vec![ExceptionHandler::finally(0..1, 1..5)],
        );
        let result = engine.process_method(Token::new(0x0600_0002), &body);
        assert!(matches!(result, Err(Error::MalformedExceptionTable { .. })));
        assert_eq!(engine.events().errors().count(), 1);
    }

    #[test]
    fn test_without_passes_keeps_blocks() {
        let config = EngineConfig::new()
            .with_passes(false, false, false)
            .with_strip_branches(false);
        let engine = DeobfuscationEngine::new(config);
        let body = MethodBody::new(
            vec![target_instr("br", 1), instr("ret")],
            vec![],
        );
        let output = engine.process_method(Token::new(0x0600_0003), &body).unwrap();
        assert_eq!(mnemonics(&output), vec!["br.s", "ret"]);
    }

    #[test]
    fn test_reordering_is_recorded() {
        let config = EngineConfig::new().with_passes(false, false, false);
        let engine = DeobfuscationEngine::new(config);
        // 0: ldarg.0  1: br 3 | 2: ret | 3: pop  4: br 2
        let body = MethodBody::new(
            vec![
                instr("ldarg.0"),
                target_instr("br", 3),
                instr("ret"),
                instr("pop"),
                target_instr("br", 2),
            ],
            vec![],
        );
        let token = Token::new(0x0600_0004);
        let output = engine.process_method(token, &body).unwrap();
        assert_eq!(mnemonics(&output), vec!["ldarg.0", "pop", "ret"]);

        let events = engine.events();
        assert_eq!(events.total(EventKind::RegionReordered), 1);
        assert_eq!(events.total(EventKind::BranchFlipped), 0);
        assert!(events
            .filter_method(token)
            .any(|event| event.kind == EventKind::RegionReordered));
    }

    #[test]
    fn test_branch_flip_is_recorded() {
        let config = EngineConfig::new().with_reordering(false);
        let engine = DeobfuscationEngine::new(config);
        // 0: ldarg.0  1: brfalse 3 | 2: br 5 | 3: ldc.i4.1  4: ret | 5: ldc.i4.0  6: ret
        let body = MethodBody::new(
            vec![
                instr("ldarg.0"),
                target_instr("brfalse", 3),
                target_instr("br", 5),
                instr("ldc.i4.1"),
                instr("ret"),
                instr("ldc.i4.0"),
                instr("ret"),
            ],
            vec![],
        );
        let output = engine.process_method(Token::new(0x0600_0005), &body).unwrap();
        assert_eq!(
            mnemonics(&output),
            vec!["ldarg.0", "brtrue.s", "ldc.i4.1", "ret", "ldc.i4.0", "ret"]
        );
        assert_eq!(output.instructions[1].targets(), vec![4]);
        assert_eq!(engine.events().total(EventKind::BranchFlipped), 1);
        assert_eq!(engine.events().total(EventKind::RegionReordered), 0);
    }

    #[test]
    fn test_batch_keeps_failures_local() {
        let good = MethodBody::new(vec![instr("ret")], vec![]);
        let bad = MethodBody::new(vec![target_instr("br", 7)], vec![]);
        let methods = vec![
            (Token::new(0x0600_0001), good.clone()),
            (Token::new(0x0600_0002), bad),
            (Token::new(0x0600_0003), good),
        ];

        for parallel in [true, false] {
            let engine = DeobfuscationEngine::new(EngineConfig::new().with_parallel(parallel));
            let result = engine.process_methods(&methods);
            assert_eq!(result.methods.len(), 3);
            assert_eq!(result.succeeded().count(), 2);
            assert_eq!(result.failed().count(), 1);
            assert!(result.get(Token::new(0x0600_0002)).unwrap().is_err());
            assert_eq!(result.methods[2].0, Token::new(0x0600_0003));
            assert_eq!(engine.events().len(), result.events.len());
        }
    }
}
