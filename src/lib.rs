// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilflow
//!
//! [![Crates.io](https://img.shields.io/crates/v/cilflow.svg)](https://crates.io/crates/cilflow)
//! [![Documentation](https://docs.rs/cilflow/badge.svg)](https://docs.rs/cilflow)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/cilflow/blob/main/LICENSE-APACHE)
//!
//! Control-flow reconstruction and regeneration for .NET CIL method bodies.
//!
//! `cilflow` takes a decoded method body (instructions plus exception handler table), lifts
//! it into a tree of basic blocks nested in try/filter/handler regions, lets passes clean
//! up the control flow (unreachable code, trampolines, `nop` padding, split blocks) and
//! emits a fresh, verifiable body with recomputed branches and exception ranges.
//!
//! ## Features
//!
//! - **🌳 Region tree** - blocks nested in protected regions, filters and handlers, mirroring the exception table
//! - **🔗 Explicit edges** - fallthrough, branch targets and source lists kept symmetric by every operation
//! - **🧹 Cleanup passes** - dead code elimination, block merging and `nop` block removal run to a fixpoint
//! - **📐 Layout** - loop-aware block scheduling with evaluation-stack repair
//! - **⚡ Parallel batches** - independent methods processed on the rayon thread pool
//! - **🛡️ No recursion** - every traversal uses explicit stacks, so huge methods can't overflow
//!
//! ## Quick Start
//!
//! ```rust
//! use cilflow::prelude::*;
//!
//! // br 2; nop; ret
//! let body = MethodBody::new(
//!     vec![
//!         Instruction::new("br", Operand::Target(2))?,
//!         Instruction::new("nop", Operand::None)?,
//!         Instruction::new("ret", Operand::None)?,
//!     ],
//!     vec![],
//! );
//!
//! let engine = DeobfuscationEngine::new(EngineConfig::default());
//! let output = engine.process_method(Token::new(0x0600_0001), &body)?;
//! assert_eq!(output.instructions.len(), 1);
//! # Ok::<(), cilflow::Error>(())
//! ```
//!
//! ### Working with the block tree
//!
//! ```rust
//! use cilflow::prelude::*;
//!
//! let body = MethodBody::new(
//!     vec![
//!         Instruction::new("ldarg.0", Operand::None)?,
//!         Instruction::new("brtrue", Operand::Target(4))?,
//!         Instruction::new("ldc.i4.0", Operand::None)?,
//!         Instruction::new("ret", Operand::None)?,
//!         Instruction::new("ldc.i4.1", Operand::None)?,
//!         Instruction::new("ret", Operand::None)?,
//!     ],
//!     vec![],
//! );
//!
//! let mut blocks = GraphBuilder::new(&body).build()?;
//! let entry = blocks.entry(blocks.root())?.ok_or(Error::InvalidRegionShape("empty".into()))?;
//! assert_eq!(blocks.block(entry)?.count_targets(), 2);
//!
//! blocks.flip_conditional(entry)?;
//! assert_eq!(blocks.block(entry)?.instructions()[1].mnemonic, "brfalse");
//!
//! // the `ldc.i4.0` block still follows the entry, so the generator emits the cheaper form
//! repartition(&mut blocks)?;
//! let output = CodeGenerator::new(&blocks).generate()?;
//! assert_eq!(output.instructions[1].mnemonic, "brtrue.s");
//! assert_eq!(output.instructions[1].targets(), vec![4]);
//! # Ok::<(), cilflow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Malformed input is reported as
//! [`Error::Malformed`] or [`Error::MalformedExceptionTable`]; every other variant means a
//! tree invariant was broken. An error never affects more than the method being processed.
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run roundtrip --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilflow::prelude::*;
///
/// let body = MethodBody::new(vec![Instruction::new("ret", Operand::None)?], vec![]);
/// let blocks = GraphBuilder::new(&body).build()?;
/// assert_eq!(blocks.all_blocks()?.len(), 1);
/// # Ok::<(), cilflow::Error>(())
/// ```
pub mod prelude;

/// CIL instructions and the opcode table
///
/// This module describes single instructions the way the block graph needs them:
///
/// - **Opcode table**: mnemonic, encoding, operand type, flow type and stack behaviour of
///   every ECMA-335 opcode
/// - **Branch handling**: target access, short/long form conversion, condition inversion
/// - **Stack Effect Analysis**: pops and pushes per instruction
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A CIL instruction with index-based branch operands
/// - [`assembly::Operand`] - Instruction operands (immediates, tokens, targets)
/// - [`assembly::FlowType`] - How instructions affect control flow
pub mod assembly;

/// Block graph and region tree of a method
///
/// Construction ([`blocks::GraphBuilder`]), restructuring ([`blocks::MethodBlocks`],
/// [`blocks::DeadCodeEliminator`]), layout ([`blocks::BlockScheduler`],
/// [`blocks::StackOrderFixup`]) and code generation ([`blocks::CodeGenerator`]).
pub mod blocks;

/// Passes over the block tree, their scheduler and the event log
pub mod compiler;

/// The per-method pipeline and its configuration
pub mod deobfuscation;

/// Method bodies, exception handlers and metadata tokens
pub mod metadata;

/// Graph primitives and algorithms
pub mod utils;

/// `cilflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilflow` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use cilflow::{blocks::GraphBuilder, metadata::method::{ExceptionHandler, MethodBody}, Error};
/// use cilflow::assembly::{Instruction, Operand};
///
/// let body = MethodBody::new(
///     vec![Instruction::new("ret", Operand::None)?],
///     vec![ExceptionHandler::finally(0..1, 1..3)],
/// );
/// match GraphBuilder::new(&body).build() {
///     Err(Error::MalformedExceptionTable { message, .. }) => println!("rejected: {message}"),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), cilflow::Error>(())
/// ```
pub use error::Error;
