//! The pass interface of the block pipeline.

use crate::{
    blocks::MethodBlocks, compiler::EventLog, deobfuscation::EngineConfig,
    metadata::token::Token, Result,
};

/// Read-only state shared by all passes running on one method.
pub struct PassContext<'a> {
    /// The method being processed.
    pub method: Token,
    /// The active configuration.
    pub config: &'a EngineConfig,
    /// Sink for everything the passes want to report.
    pub events: &'a EventLog,
}

impl<'a> PassContext<'a> {
    /// Creates a context for `method`.
    #[must_use]
    pub fn new(method: Token, config: &'a EngineConfig, events: &'a EventLog) -> Self {
        PassContext {
            method,
            config,
            events,
        }
    }
}

/// A transformation of a method's block tree.
///
/// Passes must be thread-safe (`Send + Sync`): the engine shares one set of passes between
/// all methods of a batch. Any state that has to survive a single call belongs in the
/// context, not in the pass.
pub trait BlocksPass: Send + Sync {
    /// Unique name for events and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Should this pass run under the given configuration?
    fn should_run(&self, _config: &EngineConfig) -> bool {
        true
    }

    /// Runs the pass on one method.
    ///
    /// Returns `true` if the tree changed. Events are recorded to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree is inconsistent; the method is then abandoned.
    fn run_on_method(&self, blocks: &mut MethodBlocks, ctx: &PassContext<'_>) -> Result<bool>;
}
