//! CIL instruction model.
//!
//! # Key Components
//!
//! - [`Instruction`] - A decoded instruction with control-flow queries
//! - [`instructions`] - Static ECMA-335 opcode tables
//! - [`opcodes`] - Named opcode bytes used by the control-flow engine

mod instruction;
pub mod instructions;
pub mod opcodes;

pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior};
