//! # cilflow Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cilflow library. Import this module to get quick access to everything needed
//! to build, transform and regenerate method bodies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilflow operations
pub use crate::Error;

/// The result type used throughout cilflow
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Per-method pipeline and its configuration
pub use crate::deobfuscation::{DeobfuscationEngine, DeobfuscationResult, EngineConfig};

// ================================================================================================
// Instructions and Method Bodies
// ================================================================================================

/// Instructions and their operands
pub use crate::assembly::{FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior};

/// Method bodies and exception handling
pub use crate::metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody};

/// Metadata tokens for catch types and operand references
pub use crate::metadata::token::Token;

// ================================================================================================
// Block Graph
// ================================================================================================

/// Block tree construction, restructuring, layout and code generation
pub use crate::blocks::{
    repartition, Block, BlockScheduler, CodeGenerator, DeadCodeEliminator, GraphBuilder,
    MethodBlocks, NodeKind, StackOrderFixup,
};

/// Arena handles
pub use crate::utils::graph::NodeId;

// ================================================================================================
// Passes
// ================================================================================================

/// Pass interface, scheduler and event log
pub use crate::compiler::{
    BlocksPass, EventKind, EventLog, PassContext, PassScheduler,
};
