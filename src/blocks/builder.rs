//! Construction of a [`MethodBlocks`] tree from a flat method body.
//!
//! The builder works in four steps:
//!
//! 1. **Validation** - branch targets and exception rows must point inside the body
//! 2. **Partitioning** - every branch target, every instruction following a block terminator
//!    and every exception boundary starts a new block
//! 3. **Wiring** - each block's terminator is turned into `fallthrough`/`targets` edges; the
//!    `sources` lists follow automatically
//! 4. **Nesting** - exception rows, innermost first, wrap contiguous runs of already placed
//!    blocks and regions into protected regions, filter scopes and handler scopes
//!
//! Finally, a trailing `br` is replaced by its edge unless [`GraphBuilder::strip_branches`]
//! was turned off.
//!
//! # Examples
//!
//! ```rust
//! use cilflow::{
//!     assembly::{Instruction, Operand},
//!     blocks::GraphBuilder,
//!     metadata::method::MethodBody,
//! };
//!
//! let body = MethodBody::new(
//!     vec![
//!         Instruction::new("br.s", Operand::Target(1))?,
//!         Instruction::new("ret", Operand::None)?,
//!     ],
//!     vec![],
//! );
//!
//! let blocks = GraphBuilder::new(&body).build()?;
//! let ids = blocks.all_blocks()?;
//! assert_eq!(ids.len(), 2);
//! assert_eq!(blocks.block(ids[0])?.fallthrough(), Some(ids[1]));
//! # Ok::<(), cilflow::Error>(())
//! ```

use rustc_hash::FxHashMap;

use crate::{
    blocks::MethodBlocks,
    metadata::method::{ExceptionHandler, MethodBody},
    utils::graph::NodeId,
    Result,
};

/// A block as laid out in the input, `start..end` in instruction indices.
struct Span {
    start: usize,
    end: usize,
    node: NodeId,
}

/// What occupies a run of instructions while regions are being nested.
#[derive(Clone, Copy)]
enum Slot {
    /// A block or protected region waiting for an owner
    Node(NodeId),
    /// Filter or handler code already owned by a clause of the given protected region
    Handler(NodeId),
}

struct Run {
    start: usize,
    end: usize,
    slot: Slot,
}

/// The ordered runs of the method, merged step by step as regions are built.
struct Runs {
    runs: Vec<Run>,
    /// Number of `Slot::Handler` runs per protected region
    handler_runs: FxHashMap<NodeId, usize>,
}

impl Runs {
    /// Replaces the runs exactly covering `start..end` with a single run of `slot`, returning
    /// the nodes that the new owner adopts.
    fn replace(&mut self, start: usize, end: usize, slot: Slot) -> Result<Vec<NodeId>> {
        let first = self.runs.iter().position(|run| run.start == start);
        let last = self.runs.iter().position(|run| run.end == end);
        let (Some(first), Some(last)) = (first, last) else {
            return Err(malformed_eh_error!(
                "Range {}..{} does not align with block or region boundaries",
                start,
                end
            ));
        };
        if first > last {
            return Err(malformed_eh_error!("Range {}..{} is empty", start, end));
        }

        let mut adopted = Vec::new();
        let mut handlers: FxHashMap<NodeId, usize> = FxHashMap::default();
        for run in &self.runs[first..=last] {
            match run.slot {
                Slot::Node(node) => adopted.push(node),
                Slot::Handler(protected) => *handlers.entry(protected).or_default() += 1,
            }
        }

        // a protected region and its handlers move together
        for (&protected, &count) in &handlers {
            if !adopted.contains(&protected) || self.handler_runs.get(&protected) != Some(&count) {
                return Err(malformed_eh_error!(
                    "Range {}..{} splits protected region {} from its handlers",
                    start,
                    end,
                    protected
                ));
            }
        }
        for protected in &adopted {
            if let Some(&total) = self.handler_runs.get(protected) {
                if handlers.get(protected) != Some(&total) {
                    return Err(malformed_eh_error!(
                        "Range {}..{} splits protected region {} from its handlers",
                        start,
                        end,
                        protected
                    ));
                }
            }
        }

        self.runs.drain(first..=last);
        self.runs.insert(first, Run { start, end, slot });
        if let Slot::Handler(protected) = slot {
            *self.handler_runs.entry(protected).or_default() += 1;
        }
        Ok(adopted)
    }
}

/// Builds the block graph and region tree of a method body.
pub struct GraphBuilder<'a> {
    body: &'a MethodBody,
    strip_branches: bool,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder for `body`. Trailing `br` instructions are stripped by default.
    #[must_use]
    pub fn new(body: &'a MethodBody) -> Self {
        GraphBuilder {
            body,
            strip_branches: true,
        }
    }

    /// Keep (`false`) or strip (`true`) trailing unconditional branches. A kept `br` is
    /// represented by a single target edge instead of a fallthrough.
    #[must_use]
    pub fn strip_branches(mut self, strip: bool) -> Self {
        self.strip_branches = strip;
        self
    }

    /// Builds the tree. Nothing is returned unless the whole body could be represented.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for branch targets outside the body and
    /// [`crate::Error::MalformedExceptionTable`] for exception rows that are out of range,
    /// don't nest, or would let code enter a region other than through its entry.
    pub fn build(&self) -> Result<MethodBlocks> {
        self.validate()?;

        let mut blocks = MethodBlocks::new();
        let instructions = &self.body.instructions;
        if instructions.is_empty() {
            return Ok(blocks);
        }

        let spans = self.partition(&mut blocks);
        let mut node_at: Vec<Option<NodeId>> = vec![None; instructions.len()];
        for span in &spans {
            node_at[span.start] = Some(span.node);
        }

        self.wire(&mut blocks, &spans, &node_at)?;

        let top_level = self.nest(&mut blocks, &spans)?;
        let root = blocks.root();
        for node in top_level {
            blocks.add(root, node)?;
        }

        for span in &spans {
            for target in blocks.block(span.node)?.successors() {
                if blocks.check_region_entry(span.node, target).is_err() {
                    return Err(malformed_eh_error!(
                        "Edge from instruction {} enters a region at a non-entry block",
                        span.end - 1
                    ));
                }
            }
        }

        if self.strip_branches {
            for span in &spans {
                blocks.remove_last_br(span.node)?;
            }
        }

        Ok(blocks)
    }

    fn validate(&self) -> Result<()> {
        let count = self.body.instructions.len();
        for (index, instr) in self.body.instructions.iter().enumerate() {
            if let Some(target) = instr.targets().into_iter().find(|&t| t >= count) {
                return Err(malformed_error!(
                    "Instruction {} ({}) targets {} outside of {} instructions",
                    index,
                    instr.mnemonic,
                    target,
                    count
                ));
            }
        }
        for handler in &self.body.exception_handlers {
            handler.validate(count)?;
        }
        Ok(())
    }

    fn partition(&self, blocks: &mut MethodBlocks) -> Vec<Span> {
        let instructions = &self.body.instructions;
        let count = instructions.len();

        let mut leader = vec![false; count + 1];
        leader[0] = true;
        for (index, instr) in instructions.iter().enumerate() {
            if instr.ends_block() {
                leader[index + 1] = true;
            }
            for target in instr.targets() {
                leader[target] = true;
            }
        }
        for handler in &self.body.exception_handlers {
            let boundaries = [
                Some(handler.try_start),
                Some(handler.try_end),
                handler.filter_start,
                Some(handler.handler_start),
                Some(handler.handler_end),
            ];
            for boundary in boundaries.into_iter().flatten() {
                leader[boundary] = true;
            }
        }

        let starts: Vec<usize> = (0..count).filter(|&index| leader[index]).collect();
        starts
            .iter()
            .enumerate()
            .map(|(position, &start)| {
                let end = starts.get(position + 1).copied().unwrap_or(count);
                Span {
                    start,
                    end,
                    node: blocks.new_block(instructions[start..end].to_vec()),
                }
            })
            .collect()
    }

    fn wire(
        &self,
        blocks: &mut MethodBlocks,
        spans: &[Span],
        node_at: &[Option<NodeId>],
    ) -> Result<()> {
        let node_of = |index: usize| {
            node_at
                .get(index)
                .copied()
                .flatten()
                .ok_or_else(|| malformed_error!("Instruction {} does not start a block", index))
        };

        for (position, span) in spans.iter().enumerate() {
            let last = &self.body.instructions[span.end - 1];
            if last.falls_through() {
                if let Some(next) = spans.get(position + 1) {
                    blocks.set_fallthrough(span.node, Some(next.node))?;
                }
            }
            if last.is_branch() {
                let targets = last
                    .targets()
                    .into_iter()
                    .map(&node_of)
                    .collect::<Result<Vec<_>>>()?;
                blocks.set_targets(span.node, Some(targets))?;
            }
        }
        Ok(())
    }

    /// Wraps runs into regions, innermost try range first, and returns the nodes left at the
    /// top level in program order.
    fn nest(&self, blocks: &mut MethodBlocks, spans: &[Span]) -> Result<Vec<NodeId>> {
        let mut runs = Runs {
            runs: spans
                .iter()
                .map(|span| Run {
                    start: span.start,
                    end: span.end,
                    slot: Slot::Node(span.node),
                })
                .collect(),
            handler_runs: FxHashMap::default(),
        };

        let mut rows: Vec<&ExceptionHandler> = self.body.exception_handlers.iter().collect();
        rows.sort_by(|a, b| {
            b.try_start
                .cmp(&a.try_start)
                .then(a.try_end.cmp(&b.try_end))
        });

        for group in rows.chunk_by(|a, b| a.try_start == b.try_start && a.try_end == b.try_end) {
            let protected = blocks.new_protected_region();
            let (try_start, try_end) = (group[0].try_start, group[0].try_end);
            for child in runs.replace(try_start, try_end, Slot::Node(protected))? {
                blocks.add(protected, child)?;
            }

            for row in group {
                let filter = match row.filter_start {
                    Some(filter_start) => {
                        let scope = blocks.new_filter_scope();
                        for child in
                            runs.replace(filter_start, row.handler_start, Slot::Handler(protected))?
                        {
                            blocks.add(scope, child)?;
                        }
                        Some(scope)
                    }
                    None => None,
                };

                let scope = blocks.new_handler_scope();
                for child in
                    runs.replace(row.handler_start, row.handler_end, Slot::Handler(protected))?
                {
                    blocks.add(scope, child)?;
                }

                let handler = blocks.new_region_handler(filter, scope, row.flags, row.catch_type)?;
                blocks.add_handler(protected, handler)?;
            }
        }

        Ok(runs
            .runs
            .iter()
            .filter_map(|run| match run.slot {
                Slot::Node(node) => Some(node),
                Slot::Handler(_) => None,
            })
            .collect())
    }
}
