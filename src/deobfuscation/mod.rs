//! Per-method deobfuscation pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  Deobfuscation Pipeline                   │
//! ├───────────────────────────────────────────────────────────┤
//! │  Input: MethodBody (instructions + exception handlers)    │
//! │           │                                               │
//! │           ▼                                               │
//! │  GraphBuilder        blocks, edges and region tree        │
//! │           │                                               │
//! │           ▼                                               │
//! │  PassScheduler       nop bypass, dead blocks, merging     │
//! │           │          (repeat until no change)             │
//! │           ▼                                               │
//! │  repartition         per-region scheduling + stack fixup  │
//! │           │                                               │
//! │           ▼                                               │
//! │  CodeGenerator       instructions, branches, EH table     │
//! │           │                                               │
//! │  Output: MethodBody                                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`DeobfuscationEngine`] - runs the pipeline on single methods or batches
//! - [`EngineConfig`] - pass selection, iteration limit and optional stages
//! - [`DeobfuscationResult`] - per-method outcomes and events of a batch

mod config;
mod engine;
mod result;

pub use config::EngineConfig;
pub use engine::DeobfuscationEngine;
pub use result::DeobfuscationResult;
