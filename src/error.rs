use thiserror::Error;

use crate::utils::graph::NodeId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! malformed_eh_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedExceptionTable {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedExceptionTable {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only two variants can be triggered by the input itself: [`Error::Malformed`] for broken
/// instruction streams and [`Error::MalformedExceptionTable`] for exception tables that do not
/// describe properly nested regions. Every other variant signals that an operation was asked to
/// break one of the structural invariants of a [`crate::blocks::MethodBlocks`] tree. None of them
/// are recovered locally: they abort processing of the current method, and because every method
/// owns its own tree, other methods are unaffected.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Broken instruction stream (e.g. branch target out of range)
/// - [`Error::MalformedExceptionTable`] - Exception rows that don't align with block boundaries
/// - [`Error::InvalidMnemonic`] - Unknown instruction mnemonic
///
/// ## Graph Invariant Errors
/// - [`Error::OwnershipViolation`] - A node's parent pointer and its parent's child list disagree
/// - [`Error::DanglingEdge`] - An edge has no matching entry in the target's source list
/// - [`Error::NotMergeable`] - Block merge preconditions are not met
/// - [`Error::InvalidEdgeArity`] - Wrong number of branch targets for an instruction
/// - [`Error::NullTarget`] - A branch was redirected to a block that doesn't exist
/// - [`Error::InvalidTerminator`] - A block doesn't end with the expected instruction
/// - [`Error::InvalidHandle`] - A stale or mistyped node handle was used
///
/// ## Layout Errors
/// - [`Error::OrderingInvariantViolation`] - Block ordering lost its entry or its members
/// - [`Error::InvalidRegionShape`] - A region doesn't have the structure its kind requires
/// - [`Error::BoundsError`] - An index or range is empty or out of bounds
/// - [`Error::UnsafeRegionRemoval`] - Code to be removed is still referenced by live code
///
/// # Examples
///
/// ```rust
/// use cilflow::{Error, blocks::GraphBuilder, metadata::method::MethodBody};
///
/// let body = MethodBody::default();
/// match GraphBuilder::new(&body).build() {
///     Ok(blocks) => println!("{} blocks", blocks.all_blocks().map_or(0, |ids| ids.len())),
///     Err(Error::MalformedExceptionTable { message, .. }) => eprintln!("bad EH table: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream is damaged or inconsistent.
    ///
    /// Raised for branch targets outside of the method, unassigned opcodes and similar
    /// problems of the input. The error includes the source location where the problem
    /// was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The exception handler table doesn't describe properly nested regions.
    ///
    /// This is the expected failure for corrupted or deliberately crafted exception tables:
    /// boundaries that don't align with block boundaries, overlapping ranges, or a range that
    /// would separate a protected region from its handlers. No partial tree is produced.
    #[error("Malformed exception table - {file}:{line}: {message}")]
    MalformedExceptionTable {
        /// Description of the misaligned or inconsistent row
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// No instruction with this mnemonic exists.
    #[error("Unknown instruction mnemonic - {0}")]
    InvalidMnemonic(String),

    /// A node is already owned by a region, or its parent pointer disagrees with the child
    /// list of the region that is supposed to own it.
    #[error("Ownership violation on {node}: {message}")]
    OwnershipViolation {
        /// The node whose ownership is inconsistent
        node: NodeId,
        /// What exactly is inconsistent
        message: String,
    },

    /// An outgoing edge has no matching entry in the target's `sources` list.
    #[error("Dangling edge {from} -> {target}")]
    DanglingEdge {
        /// The block owning the outgoing edge
        from: NodeId,
        /// The block that should list `from` as one of its sources
        target: NodeId,
    },

    /// The two blocks can't be merged.
    ///
    /// Merging requires that the first block's only successor is the second block, that the
    /// second block's only source is the first block, and that both live in the same region.
    #[error("Block {block} can't be merged with {other}")]
    NotMergeable {
        /// The block that would absorb `other`
        block: NodeId,
        /// The block that would be absorbed
        other: NodeId,
    },

    /// The number of branch targets doesn't match the instruction.
    ///
    /// Single-target branches require exactly one target, switches accept any number, and all
    /// other instructions accept none.
    #[error("Instruction {mnemonic} expects {expected} targets, got {found}")]
    InvalidEdgeArity {
        /// Mnemonic of the instruction being updated
        mnemonic: &'static str,
        /// Human readable description of the accepted arity
        expected: &'static str,
        /// Number of targets that were provided
        found: usize,
    },

    /// A branch was redirected to a node that is not a live block.
    #[error("Branch target {0} is not a live block")]
    NullTarget(NodeId),

    /// The terminator of a block isn't of the kind the operation requires.
    #[error("Block {block} must end with {expected}")]
    InvalidTerminator {
        /// The offending block
        block: NodeId,
        /// Description of the required terminator
        expected: &'static str,
    },

    /// The handle refers to a removed node, or to a node of the wrong kind.
    #[error("Invalid node handle {0}")]
    InvalidHandle(NodeId),

    /// A region's linear ordering lost its entry position or changed its members.
    #[error("Ordering invariant violated - {0}")]
    OrderingInvariantViolation(String),

    /// A region doesn't have the structure required by its kind.
    #[error("Invalid region shape - {0}")]
    InvalidRegionShape(String),

    /// An index or a recorded range is empty or out of bounds.
    #[error("Out of bounds - {0}")]
    BoundsError(String),

    /// A region was to be removed while live code still branches into it.
    #[error("Region {region} is still referenced by {referrer}")]
    UnsafeRegionRemoval {
        /// The region (or dead node) that was about to be removed
        region: NodeId,
        /// A surviving block that still has an edge into it
        referrer: NodeId,
    },
}
