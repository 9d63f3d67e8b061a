//! Flattening of a block tree back into a method body.
//!
//! The generator is the inverse of [`crate::blocks::GraphBuilder`]. It walks the region tree
//! in child order, lays every protected region's handlers out right after its try body,
//! turns edges back into branch operands and rebuilds the exception handler table from the
//! ranges the regions ended up covering.
//!
//! # Layout rules
//!
//! - within a region, the last block ending in the region's natural exit (`ret` for the
//!   method, `leave` for a try body, `endfilter` for a filter, `endfinally`/`leave` for a
//!   handler) is moved to the end, so no other block loses its fallthrough predecessor;
//!   the entry is never moved
//! - a block whose fallthrough isn't the next block gets an explicit `br`
//! - a two-way conditional branch whose target is the next block is inverted so it falls
//!   through instead
//! - after layout every branch is first widened, then shortened wherever the displacement
//!   fits in a signed byte
//!
//! The tree itself is never modified.

use rustc_hash::FxHashMap;

use crate::{
    assembly::{FlowType, Instruction},
    blocks::{MethodBlocks, NodeKind},
    metadata::method::{ExceptionHandler, MethodBody},
    utils::graph::NodeId,
    Error, Result,
};

/// Size of a short branch: opcode and 8-bit displacement.
const SHORT_BRANCH_SIZE: i64 = 2;

/// One step of the layout walk.
enum Task {
    /// Lay out the children of a region
    Children(NodeId),
    /// Lay out a single child
    Node(NodeId),
    /// Record the current block count for a boundary of a protected region
    Mark(NodeId, Boundary),
}

#[derive(Clone, Copy)]
enum Boundary {
    TryStart,
    TryEnd,
    FilterStart(usize),
    HandlerStart(usize),
    HandlerEnd(usize),
}

/// Block positions of one handler of a protected region.
#[derive(Default, Clone, Copy)]
struct HandlerMarks {
    filter_start: Option<usize>,
    handler_start: usize,
    handler_end: usize,
}

/// Block positions of a protected region and its handlers.
#[derive(Default)]
struct RegionMarks {
    try_start: usize,
    try_end: usize,
    handlers: Vec<HandlerMarks>,
}

/// Generates instructions and exception handlers from a [`MethodBlocks`] tree.
pub struct CodeGenerator<'a> {
    blocks: &'a MethodBlocks,
}

impl<'a> CodeGenerator<'a> {
    /// Creates a generator for `blocks`.
    #[must_use]
    pub fn new(blocks: &'a MethodBlocks) -> Self {
        CodeGenerator { blocks }
    }

    /// Emits the method body.
    ///
    /// Branch operands of the result index its instruction list, offsets are recomputed and
    /// nested exception rows precede the rows that enclose them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] for protected regions without handlers,
    /// [`Error::BoundsError`] for regions that laid out no code, [`Error::DanglingEdge`] for
    /// edges to blocks outside the tree and [`Error::InvalidEdgeArity`] if a block's edges
    /// don't fit its terminator.
    pub fn generate(&self) -> Result<MethodBody> {
        self.generate_with_flips().map(|(body, _)| body)
    }

    /// Emits the method body like [`CodeGenerator::generate`] and also returns how many
    /// conditional branches were inverted to fall through to their target.
    ///
    /// # Errors
    ///
    /// See [`CodeGenerator::generate`].
    pub fn generate_with_flips(&self) -> Result<(MethodBody, usize)> {
        let (layout, regions) = self.lay_out_blocks()?;
        let mut flipped = 0;

        let mut instructions: Vec<Instruction> = Vec::new();
        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(layout.len());
        let mut pending: Vec<(usize, NodeId, Vec<NodeId>)> = Vec::new();

        for (position, &node) in layout.iter().enumerate() {
            let start = instructions.len();
            let block = self.blocks.block(node)?;
            let next = layout.get(position + 1).copied();

            let mut last = match block.instructions().split_last() {
                Some((last, body)) => {
                    instructions.extend_from_slice(body);
                    last.clone()
                }
                None => Instruction::nop(),
            };

            match block.targets() {
                Some(targets) => {
                    let flippable = targets.len() == 1 && block.fallthrough().is_some();
                    if flippable && Some(targets[0]) == next && last.flip() {
                        flipped += 1;
                        let fallthrough = block.fallthrough().into_iter().collect();
                        pending.push((instructions.len(), node, fallthrough));
                        instructions.push(last);
                        spans.push((start, instructions.len()));
                        continue;
                    }
                    pending.push((instructions.len(), node, targets.to_vec()));
                }
                None if last.is_branch() => {
                    return Err(Error::InvalidEdgeArity {
                        mnemonic: last.mnemonic,
                        expected: "at least 1",
                        found: 0,
                    });
                }
                None => {}
            }
            instructions.push(last);

            if let Some(fallthrough) = block.fallthrough() {
                if Some(fallthrough) != next {
                    pending.push((instructions.len(), node, vec![fallthrough]));
                    instructions.push(Instruction::branch(0));
                }
            }
            spans.push((start, instructions.len()));
        }

        let block_start: FxHashMap<NodeId, usize> = layout
            .iter()
            .zip(&spans)
            .map(|(&node, &(start, _))| (node, start))
            .collect();
        for (index, source, targets) in pending {
            let resolved = targets
                .iter()
                .map(|target| {
                    block_start
                        .get(target)
                        .copied()
                        .ok_or(Error::DanglingEdge {
                            from: source,
                            target: *target,
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            instructions[index].update_targets(&resolved)?;
        }

        let mut exception_handlers = self.exception_rows(&regions, &spans)?;
        exception_handlers.sort_by(|a, b| {
            b.try_start
                .cmp(&a.try_start)
                .then(a.try_end.cmp(&b.try_end))
                .then(a.filter_or_handler_start().cmp(&b.filter_or_handler_start()))
                .then(a.handler_end.cmp(&b.handler_end))
        });

        optimize_branches(&mut instructions);
        Ok((MethodBody::new(instructions, exception_handlers), flipped))
    }

    /// Orders all blocks physically and records the block positions of every region.
    fn lay_out_blocks(&self) -> Result<(Vec<NodeId>, Vec<(NodeId, RegionMarks)>)> {
        let mut layout = Vec::new();
        let mut marks: FxHashMap<NodeId, RegionMarks> = FxHashMap::default();
        let mut region_order = Vec::new();

        let mut tasks = vec![Task::Children(self.blocks.root())];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Children(scope) => {
                    let children = self.place_last(scope)?;
                    tasks.extend(children.into_iter().rev().map(Task::Node));
                }
                Task::Node(node) => match self.blocks.node(node)?.kind() {
                    NodeKind::Block(_) => layout.push(node),
                    NodeKind::ProtectedRegion(_) => {
                        let handlers = self.blocks.handlers(node)?;
                        if handlers.is_empty() {
                            return Err(Error::InvalidRegionShape(format!(
                                "protected region {node} has no handlers"
                            )));
                        }
                        region_order.push(node);
                        marks.insert(
                            node,
                            RegionMarks {
                                handlers: vec![HandlerMarks::default(); handlers.len()],
                                ..RegionMarks::default()
                            },
                        );

                        let mut steps = vec![
                            Task::Mark(node, Boundary::TryStart),
                            Task::Children(node),
                            Task::Mark(node, Boundary::TryEnd),
                        ];
                        for (index, &handler) in handlers.iter().enumerate() {
                            let handler = self.blocks.region_handler(handler)?;
                            if let Some(filter) = handler.filter() {
                                steps.push(Task::Mark(node, Boundary::FilterStart(index)));
                                steps.push(Task::Children(filter));
                            }
                            steps.push(Task::Mark(node, Boundary::HandlerStart(index)));
                            steps.push(Task::Children(handler.handler()));
                            steps.push(Task::Mark(node, Boundary::HandlerEnd(index)));
                        }
                        tasks.extend(steps.into_iter().rev());
                    }
                    kind => {
                        return Err(Error::InvalidRegionShape(format!(
                            "{} {node} in a child list",
                            kind.name()
                        )))
                    }
                },
                Task::Mark(region, boundary) => {
                    let position = layout.len();
                    let Some(entry) = marks.get_mut(&region) else {
                        continue;
                    };
                    match boundary {
                        Boundary::TryStart => entry.try_start = position,
                        Boundary::TryEnd => entry.try_end = position,
                        Boundary::FilterStart(i) => entry.handlers[i].filter_start = Some(position),
                        Boundary::HandlerStart(i) => entry.handlers[i].handler_start = position,
                        Boundary::HandlerEnd(i) => entry.handlers[i].handler_end = position,
                    }
                }
            }
        }

        let regions = region_order
            .into_iter()
            .filter_map(|node| marks.remove(&node).map(|m| (node, m)))
            .collect();
        Ok((layout, regions))
    }

    /// The children of `scope` with the last non-entry child ending in the region's exit moved
    /// to the end.
    fn place_last(&self, scope: NodeId) -> Result<Vec<NodeId>> {
        let mut children = self.blocks.children(scope)?.to_vec();
        let exits: &[FlowType] = match self.blocks.node(scope)?.kind() {
            NodeKind::MethodScope(_) => &[FlowType::Return],
            NodeKind::ProtectedRegion(_) => &[FlowType::Leave],
            NodeKind::FilterScope(_) => &[FlowType::EndFilter],
            _ => &[FlowType::EndFinally, FlowType::Leave],
        };

        // the entry never moves
        let last = children.iter().skip(1).rposition(|&child| {
            self.blocks
                .block(child)
                .ok()
                .and_then(|block| block.last_instruction())
                .is_some_and(|instr| exits.contains(&instr.flow_type))
        });
        if let Some(index) = last.map(|index| index + 1) {
            let child = children.remove(index);
            children.push(child);
        }
        Ok(children)
    }

    fn exception_rows(
        &self,
        regions: &[(NodeId, RegionMarks)],
        spans: &[(usize, usize)],
    ) -> Result<Vec<ExceptionHandler>> {
        let mut rows = Vec::new();
        for (node, marks) in regions {
            let (try_start, try_end) = instruction_range(spans, marks.try_start, marks.try_end)?;
            for (&handler, handler_marks) in self.blocks.handlers(*node)?.iter().zip(&marks.handlers)
            {
                let handler = self.blocks.region_handler(handler)?;
                let filter_start = match handler_marks.filter_start {
                    Some(position) => {
                        Some(instruction_range(spans, position, handler_marks.handler_start)?.0)
                    }
                    None => None,
                };
                let (handler_start, handler_end) = instruction_range(
                    spans,
                    handler_marks.handler_start,
                    handler_marks.handler_end,
                )?;

                rows.push(ExceptionHandler {
                    flags: handler.flags(),
                    try_start,
                    try_end,
                    filter_start,
                    handler_start,
                    handler_end,
                    catch_type: handler.catch_type(),
                });
            }
        }
        Ok(rows)
    }
}

/// Converts the block positions `start..end` into an instruction range.
fn instruction_range(spans: &[(usize, usize)], start: usize, end: usize) -> Result<(usize, usize)> {
    if start >= end || spans.is_empty() {
        return Err(Error::BoundsError(format!(
            "region covers no blocks ({start}..{end})"
        )));
    }
    let last = spans.len() - 1;
    Ok((spans[start.min(last)].0, spans[(end - 1).min(last)].1))
}

/// Widens every branch, then shortens those whose displacement fits in a signed byte until
/// nothing changes, and recomputes the offsets.
fn optimize_branches(instructions: &mut [Instruction]) {
    for instr in instructions.iter_mut() {
        instr.to_long_form();
    }

    loop {
        let offsets = offsets(instructions);
        let mut changed = false;
        for index in 0..instructions.len() {
            let instr = &instructions[index];
            if instr.is_switch() || !instr.is_branch() || instr.is_short_branch() {
                continue;
            }
            let Some(&target) = instr.targets().first() else {
                continue;
            };
            let displacement = offsets[target] - (offsets[index] + SHORT_BRANCH_SIZE);
            if i8::try_from(displacement).is_ok() && instructions[index].to_short_form() {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut offset = 0u32;
    for instr in instructions.iter_mut() {
        instr.offset = offset;
        offset += instr.size();
    }
}

fn offsets(instructions: &[Instruction]) -> Vec<i64> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0i64;
    for instr in instructions {
        offsets.push(offset);
        offset += i64::from(instr.size());
    }
    offsets.push(offset);
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blocks::{repartition, GraphBuilder},
        metadata::token::Token,
        test::{instr, mnemonics, target_instr},
    };

    fn roundtrip(body: &MethodBody) -> MethodBody {
        let blocks = GraphBuilder::new(body).build().unwrap();
        CodeGenerator::new(&blocks).generate().unwrap()
    }

    #[test]
    fn test_straight_line() {
        let body = MethodBody::new(vec![instr("ldc.i4.0"), instr("pop"), instr("ret")], vec![]);
        let out = roundtrip(&body);
        assert_eq!(mnemonics(&out), vec!["ldc.i4.0", "pop", "ret"]);
        assert!(out.exception_handlers.is_empty());
    }

    #[test]
    fn test_conditional_is_shortened() {
        let body = MethodBody::new(
            vec![
                instr("ldarg.0"),
                target_instr("brtrue", 4),
                instr("ldc.i4.0"),
                instr("ret"),
                instr("ldc.i4.1"),
                instr("ret"),
            ],
            vec![],
        );
        let blocks = GraphBuilder::new(&body).build().unwrap();
        let (out, flipped) = CodeGenerator::new(&blocks).generate_with_flips().unwrap();
        assert_eq!(flipped, 0);
        assert_eq!(
            mnemonics(&out),
            vec!["ldarg.0", "brtrue.s", "ldc.i4.0", "ret", "ldc.i4.1", "ret"]
        );
        assert_eq!(out.instructions[1].targets(), vec![4]);
        assert_eq!(out.instructions[4].offset, 5);
    }

    #[test]
    fn test_flip_when_target_is_next() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ldarg.0"), target_instr("brtrue", 0)]);
        let taken = blocks.new_block(vec![instr("ldc.i4.1"), instr("ret")]);
        let other = blocks.new_block(vec![instr("ldc.i4.0"), instr("ret")]);
        for id in [entry, taken, other] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(entry, Some(other)).unwrap();
        blocks.set_targets(entry, Some(vec![taken])).unwrap();

        let (out, flipped) = CodeGenerator::new(&blocks).generate_with_flips().unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(
            mnemonics(&out),
            vec!["ldarg.0", "brfalse.s", "ldc.i4.1", "ret", "ldc.i4.0", "ret"]
        );
        assert_eq!(out.instructions[1].targets(), vec![4]);
        // the tree is untouched
        assert_eq!(blocks.block(entry).unwrap().fallthrough(), Some(other));
    }

    #[test]
    fn test_synthesizes_branch_for_distant_fallthrough() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("nop")]);
        let middle = blocks.new_block(vec![instr("ret")]);
        let target = blocks.new_block(vec![instr("ldnull"), instr("throw")]);
        for id in [entry, middle, target] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(entry, Some(target)).unwrap();

        let out = CodeGenerator::new(&blocks).generate().unwrap();
        assert_eq!(mnemonics(&out), vec!["nop", "br.s", "ret", "ldnull", "throw"]);
        assert_eq!(out.instructions[1].targets(), vec![3]);
    }

    #[test]
    fn test_try_catch_rows() {
        let body = MethodBody::new(
            vec![
                instr("nop"),
                target_instr("leave", 4),
                instr("pop"),
                target_instr("leave", 4),
                instr("ret"),
            ],
            vec![ExceptionHandler::catch(0..2, 2..4, Token(0x0100_0001))],
        );
        let out = roundtrip(&body);
        assert_eq!(
            mnemonics(&out),
            vec!["nop", "leave.s", "pop", "leave.s", "ret"]
        );
        assert_eq!(out.exception_handlers, body.exception_handlers);
    }

    #[test]
    fn test_nested_rows_come_first() {
        let body = MethodBody::new(
            vec![
                instr("nop"),
                target_instr("leave", 3),
                instr("endfinally"),
                target_instr("leave", 6),
                instr("pop"),
                target_instr("leave", 6),
                instr("ret"),
            ],
            vec![
                ExceptionHandler::catch(0..4, 4..6, Token(0x0100_0001)),
                ExceptionHandler::finally(0..2, 2..3),
            ],
        );
        let mut blocks = GraphBuilder::new(&body).build().unwrap();
        repartition(&mut blocks).unwrap();
        let out = CodeGenerator::new(&blocks).generate().unwrap();
        assert_eq!(out.exception_handlers.len(), 2);
        assert!(out.exception_handlers[0].is_finally());
        assert_eq!(out.exception_handlers[0].try_end, 2);
        assert_eq!(out.exception_handlers[1].try_end, 4);
    }

    #[test]
    fn test_region_without_handlers() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let protected = blocks.new_protected_region();
        let block = blocks.new_block(vec![instr("ret")]);
        blocks.add(protected, block).unwrap();
        blocks.add(root, protected).unwrap();
        assert!(matches!(
            CodeGenerator::new(&blocks).generate(),
            Err(Error::InvalidRegionShape(_))
        ));
    }

    #[test]
    fn test_empty_handler_range() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let protected = blocks.new_protected_region();
        let block = blocks.new_block(vec![instr("ret")]);
        blocks.add(protected, block).unwrap();
        let scope = blocks.new_handler_scope();
        let handler = blocks
            .new_region_handler(
                None,
                scope,
                crate::metadata::method::ExceptionHandlerFlags::FINALLY,
                None,
            )
            .unwrap();
        blocks.add_handler(protected, handler).unwrap();
        blocks.add(root, protected).unwrap();
        assert!(matches!(
            CodeGenerator::new(&blocks).generate(),
            Err(Error::BoundsError(_))
        ));
    }

    #[test]
    fn test_empty_block_emits_nop() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let empty = blocks.new_block(vec![]);
        let exit = blocks.new_block(vec![instr("ret")]);
        blocks.add(root, empty).unwrap();
        blocks.add(root, exit).unwrap();
        blocks.set_fallthrough(empty, Some(exit)).unwrap();
        let out = CodeGenerator::new(&blocks).generate().unwrap();
        assert_eq!(mnemonics(&out), vec!["nop", "ret"]);
    }

    #[test]
    fn test_long_branch_stays_long() {
        let mut code = vec![target_instr("br", 200)];
        code.extend((1..200).map(|_| instr("nop")));
        code.push(instr("ret"));
        let body = MethodBody::new(code, vec![]);
        let blocks = GraphBuilder::new(&body).strip_branches(false).build().unwrap();
        let out = CodeGenerator::new(&blocks).generate().unwrap();
        assert_eq!(out.instructions[0].mnemonic, "br");
        assert_eq!(out.instructions[0].targets(), vec![200]);
        assert_eq!(out.code_size(), 5 + 199 + 1);
    }

    #[test]
    fn test_entry_stays_first_when_it_returns() {
        let body = MethodBody::new(vec![instr("ret"), instr("ldnull"), instr("throw")], vec![]);
        let out = roundtrip(&body);
        assert_eq!(out.instructions[0].mnemonic, "ret");
        assert_eq!(mnemonics(&out), vec!["ret", "ldnull", "throw"]);
    }

    #[test]
    fn test_try_entry_stays_first_when_it_leaves() {
        // 0: leave 4 | 1: ldnull  2: throw | 3: endfinally | 4: ret
        let body = MethodBody::new(
            vec![
                target_instr("leave", 4),
                instr("ldnull"),
                instr("throw"),
                instr("endfinally"),
                instr("ret"),
            ],
            vec![ExceptionHandler::finally(0..3, 3..4)],
        );
        let out = roundtrip(&body);
        assert_eq!(out.instructions[0].mnemonic, "leave.s");
        assert_eq!(out.exception_handlers.len(), 1);
        let row = &out.exception_handlers[0];
        assert_eq!(row.try_start, 0);
        assert_eq!(out.instructions[row.try_start].mnemonic, "leave.s");
        assert_eq!(out.instructions[row.handler_start].mnemonic, "endfinally");
        assert_eq!(out.instructions[0].targets(), vec![4]);
    }
}
