//! Pass infrastructure for block-level transformations.
//!
//! This module sits between the block graph and the engine:
//!
//! - [`crate::blocks`] - block tree construction, restructuring and code generation
//! - [`compiler`](self) - passes over the block tree and their scheduling
//! - [`crate::deobfuscation`] - per-method pipeline and batch processing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Block Pipeline                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  PassScheduler            fixpoint execution per method     │
//! │    └─ rounds until no pass reports a change                 │
//! │                                                             │
//! │  BlocksPass trait         interface for all passes          │
//! │    ├─ should_run()        gate on the engine configuration  │
//! │    └─ run_on_method()     transform one MethodBlocks tree   │
//! │                                                             │
//! │  Passes (3 built-in)                                        │
//! │    ├─ NopBlockPass        bypass nop-only blocks            │
//! │    ├─ DeadBlockPass       remove unreachable code           │
//! │    └─ BlockMergePass      join straight-line chains         │
//! │                                                             │
//! │  EventLog                 change tracking and diagnostics   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod events;
mod pass;
mod passes;
mod scheduler;

pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::{BlocksPass, PassContext};
pub use passes::{default_passes, BlockMergePass, DeadBlockPass, NopBlockPass};
pub use scheduler::PassScheduler;
