//! Configuration for the deobfuscation engine.
//!
//! This module provides [`EngineConfig`], which selects the block passes, bounds the pass
//! scheduler and switches the optional stages of the per-method pipeline.

/// Configuration for the deobfuscation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum rounds of the pass scheduler per method (default: 10).
    pub max_iterations: usize,

    /// Turn trailing unconditional `br`s into fallthrough edges while building (default: true).
    pub strip_branches: bool,

    /// Enable the unreachable block removal pass.
    pub enable_dead_code_elimination: bool,

    /// Enable the block merging pass.
    pub enable_block_merging: bool,

    /// Enable the `nop` block bypass pass.
    pub enable_nop_block_removal: bool,

    /// Reorder every region before code generation (default: true).
    ///
    /// With this disabled, blocks are emitted in the order the passes left them.
    pub reorder_blocks: bool,

    /// Check the tree invariants after every pass that changed something (slow).
    pub verify_after_passes: bool,

    /// Process batches of methods on the rayon thread pool (default: true).
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            strip_branches: true,
            enable_dead_code_elimination: true,
            enable_block_merging: true,
            enable_nop_block_removal: true,
            reorder_blocks: true,
            verify_after_passes: false,
            parallel: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a "fast" configuration: a single scheduler round and no `nop` bypassing.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_iterations: 1,
            enable_nop_block_removal: false,
            ..Self::default()
        }
    }

    /// Creates an "aggressive" configuration.
    ///
    /// This configuration uses:
    /// - more scheduler rounds (50 max)
    /// - every pass enabled
    /// - invariant checks after each changing pass
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_iterations: 50,
            verify_after_passes: true,
            ..Self::default()
        }
    }

    /// Sets the maximum number of scheduler rounds.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enables or disables the individual block passes.
    ///
    /// # Arguments
    ///
    /// * `dead_code` - Unreachable block removal.
    /// * `merging` - Block merging.
    /// * `nop_blocks` - `nop` block bypassing.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_passes(mut self, dead_code: bool, merging: bool, nop_blocks: bool) -> Self {
        self.enable_dead_code_elimination = dead_code;
        self.enable_block_merging = merging;
        self.enable_nop_block_removal = nop_blocks;
        self
    }

    /// Sets whether trailing `br`s become fallthrough edges.
    #[must_use]
    pub fn with_strip_branches(mut self, strip: bool) -> Self {
        self.strip_branches = strip;
        self
    }

    /// Sets whether regions are reordered before code generation.
    #[must_use]
    pub fn with_reordering(mut self, reorder: bool) -> Self {
        self.reorder_blocks = reorder;
        self
    }

    /// Sets whether tree invariants are checked after passes.
    #[must_use]
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_after_passes = verify;
        self
    }

    /// Sets whether batches run in parallel.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns `true` if at least one block pass is enabled.
    #[must_use]
    pub fn any_pass_enabled(&self) -> bool {
        self.enable_dead_code_elimination
            || self.enable_block_merging
            || self.enable_nop_block_removal
    }
}
