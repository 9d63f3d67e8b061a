//! Block graph and region tree of a single method.
//!
//! This module turns a flat [`crate::metadata::method::MethodBody`] into a tree of basic
//! blocks nested in the regions of its exception handler table, lets passes restructure it,
//! and flattens it back into a body.
//!
//! # Architecture
//!
//! - [`MethodBlocks`] - arena owning every [`Node`] of one method, addressed by
//!   [`crate::utils::graph::NodeId`]
//! - [`Block`] - straight-line code with `fallthrough`, `targets` and `sources` edges
//! - [`Scope`], [`ProtectedRegion`], [`RegionHandler`] - the region tree
//! - [`GraphBuilder`] - body to tree
//! - [`DeadCodeEliminator`] - removes everything unreachable from the method entry
//! - [`BlockScheduler`] and [`StackOrderFixup`] - choose the physical order of each region,
//!   applied to a whole tree by [`repartition`]
//! - [`CodeGenerator`] - tree to body
//!
//! # Example
//!
//! ```rust
//! use cilflow::{
//!     assembly::{Instruction, Operand},
//!     blocks::{repartition, CodeGenerator, DeadCodeEliminator, GraphBuilder},
//!     metadata::method::MethodBody,
//! };
//!
//! let body = MethodBody::new(
//!     vec![
//!         Instruction::new("br", Operand::Target(2))?,
//!         Instruction::new("nop", Operand::None)?,
//!         Instruction::new("ret", Operand::None)?,
//!     ],
//!     vec![],
//! );
//!
//! let mut blocks = GraphBuilder::new(&body).build()?;
//! DeadCodeEliminator::new(&mut blocks).run()?;
//! let root = blocks.root();
//! blocks.merge_blocks(root)?;
//! repartition(&mut blocks)?;
//! let output = CodeGenerator::new(&blocks).generate()?;
//! assert_eq!(output.instructions.len(), 1);
//! # Ok::<(), cilflow::Error>(())
//! ```

mod block;
mod builder;
mod codegen;
mod deadcode;
mod fixup;
mod method;
mod region;
mod scheduler;

pub use block::Block;
pub use builder::GraphBuilder;
pub use codegen::CodeGenerator;
pub use deadcode::DeadCodeEliminator;
pub use fixup::{repartition, StackOrderFixup};
pub use method::{MethodBlocks, Node, NodeKind};
pub use region::{ProtectedRegion, RegionHandler, Scope};
pub use scheduler::BlockScheduler;
