//! Repairs a scheduled order so that the evaluation stack stays verifiable.
//!
//! A verifier walking the emitted code front to back must know the stack depth at the start
//! of every block. For a block entered with an empty stack nothing is needed, but a block
//! entered with values on the stack must come after at least one of its predecessors. The
//! fixup keeps the scheduled order wherever that holds and otherwise pulls a predecessor in
//! front of the block.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    blocks::{BlockScheduler, MethodBlocks, NodeKind},
    utils::graph::NodeId,
    Error, Result,
};

/// One suspended placement: `node` waits until one of its `sources` has been placed.
struct PlaceFrame {
    node: NodeId,
    sources: Vec<NodeId>,
    next: usize,
}

/// Stack-depth aware reordering of one region's children.
pub struct StackOrderFixup<'a> {
    blocks: &'a MethodBlocks,
    scope: NodeId,
    sorted: Vec<NodeId>,
    /// Stack depth on entry of each child
    depth: FxHashMap<NodeId, usize>,
}

impl<'a> StackOrderFixup<'a> {
    /// Prepares the fixup of `sorted`, a permutation of the children of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for stale handles in the tree.
    pub fn new(blocks: &'a MethodBlocks, scope: NodeId, sorted: Vec<NodeId>) -> Result<Self> {
        let mut fixup = StackOrderFixup {
            blocks,
            scope,
            sorted,
            depth: FxHashMap::default(),
        };
        fixup.compute_depths()?;
        Ok(fixup)
    }

    /// Stack depth when entering `child`, as seen by the simulation.
    #[must_use]
    pub fn entry_depth(&self, child: NodeId) -> Option<usize> {
        self.depth.get(&child).copied()
    }

    fn is_ours(&self, node: NodeId) -> Result<bool> {
        Ok(self.blocks.parent(node)? == Some(self.scope))
    }

    /// Depth on entry of the region: the exception object for filters and for the handlers
    /// of catch and filter clauses.
    fn initial_depth(&self) -> Result<usize> {
        let node = self.blocks.node(self.scope)?;
        Ok(match node.kind() {
            NodeKind::FilterScope(_) => 1,
            NodeKind::HandlerScope(_) => match node.parent() {
                Some(owner) => usize::from(self.blocks.region_handler(owner)?.pushes_exception()),
                None => 0,
            },
            _ => 0,
        })
    }

    fn compute_depths(&mut self) -> Result<()> {
        let Some(&first) = self.sorted.first() else {
            return Ok(());
        };

        let mut starts = vec![(first, self.initial_depth()?)];
        for &child in &self.sorted[1..] {
            let start = match self.blocks.node(child)?.kind() {
                NodeKind::Block(block) => {
                    let mut foreign = false;
                    for &source in block.sources() {
                        foreign |= !self.is_ours(source)?;
                    }
                    foreign
                }
                _ => true,
            };
            if start {
                starts.push((child, 0));
            }
        }

        let mut pending: Vec<(NodeId, usize)> = Vec::new();
        for start in starts {
            pending.push(start);
            while let Some((node, depth)) = pending.pop() {
                if self.depth.contains_key(&node) || !self.is_ours(node)? {
                    continue;
                }
                let NodeKind::Block(block) = self.blocks.node(node)?.kind() else {
                    // the stack is empty when a try region is entered
                    self.depth.insert(node, 0);
                    continue;
                };
                self.depth.insert(node, depth);

                let mut exit = depth;
                for instr in block.instructions() {
                    exit = exit.saturating_sub(usize::from(instr.stack_behavior.pops))
                        + usize::from(instr.stack_behavior.pushes);
                    if instr.clears_stack() {
                        exit = 0;
                    }
                }
                pending.extend(block.successors().into_iter().map(|target| (target, exit)));
            }
        }

        // children no path reaches are placed as if entered with an empty stack
        for &child in &self.sorted {
            self.depth.entry(child).or_insert(0);
        }
        Ok(())
    }

    /// Returns the repaired order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderingInvariantViolation`] if the result doesn't contain exactly the
    /// scheduled children or doesn't start with the scheduled entry.
    pub fn fix(&self) -> Result<Vec<NodeId>> {
        let mut placed: FxHashSet<NodeId> = FxHashSet::default();
        let mut in_progress: FxHashSet<NodeId> = FxHashSet::default();
        let mut order = Vec::with_capacity(self.sorted.len());

        for &child in &self.sorted {
            if placed.contains(&child) || in_progress.contains(&child) {
                continue;
            }
            in_progress.insert(child);
            let mut frames = vec![self.frame(child, &placed)?];

            while let Some(frame) = frames.last_mut() {
                if let Some(&source) = frame.sources.get(frame.next) {
                    frame.next += 1;
                    if placed.contains(&source) || in_progress.contains(&source) {
                        continue;
                    }
                    // the first source that can be placed is enough
                    frame.next = frame.sources.len();
                    in_progress.insert(source);
                    let next = self.frame(source, &placed)?;
                    frames.push(next);
                    continue;
                }

                let node = frame.node;
                frames.pop();
                in_progress.remove(&node);
                placed.insert(node);
                order.push(node);
            }
        }

        if order.len() != self.sorted.len() {
            return Err(Error::OrderingInvariantViolation(format!(
                "fixup placed {} of {} children of {}",
                order.len(),
                self.sorted.len(),
                self.scope
            )));
        }
        if order.first() != self.sorted.first() {
            return Err(Error::OrderingInvariantViolation(format!(
                "entry of {} is no longer first",
                self.scope
            )));
        }
        Ok(order)
    }

    /// Sets up the placement of `node`, listing the sources to try first when its entry
    /// depth needs a placed predecessor.
    fn frame(&self, node: NodeId, placed: &FxHashSet<NodeId>) -> Result<PlaceFrame> {
        let mut sources = Vec::new();
        let is_entry = self.sorted.first() == Some(&node);
        if let (NodeKind::Block(block), false) = (self.blocks.node(node)?.kind(), is_entry) {
            let justified = block.sources().iter().any(|source| placed.contains(source));
            if self.depth.get(&node).copied().unwrap_or(0) != 0 && !justified {
                for &source in block.sources() {
                    if self.is_ours(source)? {
                        sources.push(source);
                    }
                }
            }
        }
        Ok(PlaceFrame {
            node,
            sources,
            next: 0,
        })
    }
}

/// Schedules and repairs every region of the method, rewriting each child list in place.
/// Returns the number of regions whose child order changed.
///
/// # Errors
///
/// Propagates [`BlockScheduler`] and [`StackOrderFixup`] failures.
pub fn repartition(blocks: &mut MethodBlocks) -> Result<usize> {
    let mut reordered = 0;
    for scope in blocks.regions()? {
        let sorted = BlockScheduler::new(blocks, scope)?.schedule()?;
        let fixed = StackOrderFixup::new(blocks, scope, sorted)?.fix()?;
        let children = blocks.children_mut(scope)?;
        if *children != fixed {
            *children = fixed;
            reordered += 1;
        }
    }
    Ok(reordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{instr, target_instr};

    #[test]
    fn test_keeps_order_without_stack() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let ids: Vec<NodeId> = (0..3)
            .map(|_| {
                let id = blocks.new_block(vec![instr("nop")]);
                blocks.add(root, id).unwrap();
                id
            })
            .collect();
        blocks.set_fallthrough(ids[0], Some(ids[2])).unwrap();

        let sorted = vec![ids[0], ids[1], ids[2]];
        let fixed = StackOrderFixup::new(&blocks, root, sorted.clone())
            .unwrap()
            .fix()
            .unwrap();
        assert_eq!(fixed, sorted);
    }

    #[test]
    fn test_pulls_predecessor_forward() {
        // entry: brtrue -> push; push: ldc.i4.1 -> use; use: pop ret (entered with 1 value)
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ldarg.0"), target_instr("brtrue", 0)]);
        let exit = blocks.new_block(vec![instr("ret")]);
        let use_value = blocks.new_block(vec![instr("pop"), instr("ret")]);
        let push = blocks.new_block(vec![instr("ldc.i4.1")]);
        for id in [entry, exit, use_value, push] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(entry, Some(exit)).unwrap();
        blocks.set_targets(entry, Some(vec![push])).unwrap();
        blocks.set_fallthrough(push, Some(use_value)).unwrap();

        let fixup =
            StackOrderFixup::new(&blocks, root, vec![entry, exit, use_value, push]).unwrap();
        assert_eq!(fixup.entry_depth(use_value), Some(1));
        assert_eq!(fixup.entry_depth(push), Some(0));
        assert_eq!(fixup.fix().unwrap(), vec![entry, exit, push, use_value]);
    }

    #[test]
    fn test_catch_handler_starts_with_exception() {
        let mut blocks = MethodBlocks::new();
        let scope = blocks.new_handler_scope();
        let first = blocks.new_block(vec![instr("pop"), target_instr("leave", 0)]);
        blocks.add(scope, first).unwrap();
        let handler = blocks
            .new_region_handler(
                None,
                scope,
                crate::metadata::method::ExceptionHandlerFlags::EXCEPTION,
                Some(crate::metadata::token::Token(0x0100_0001)),
            )
            .unwrap();
        let protected = blocks.new_protected_region();
        blocks.add_handler(protected, handler).unwrap();

        let fixup = StackOrderFixup::new(&blocks, scope, vec![first]).unwrap();
        assert_eq!(fixup.entry_depth(first), Some(1));
        assert_eq!(fixup.fix().unwrap(), vec![first]);
    }

    #[test]
    fn test_rejects_foreign_order() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let a = blocks.new_block(vec![instr("ret")]);
        blocks.add(root, a).unwrap();
        let fixup = StackOrderFixup::new(&blocks, root, vec![a, a]).unwrap();
        assert!(matches!(
            fixup.fix(),
            Err(Error::OrderingInvariantViolation(_))
        ));
    }

    #[test]
    fn test_repartition() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let ids: Vec<NodeId> = ["nop", "ret", "nop"]
            .iter()
            .map(|name| {
                let id = blocks.new_block(vec![instr(name)]);
                blocks.add(root, id).unwrap();
                id
            })
            .collect();
        blocks.set_fallthrough(ids[0], Some(ids[2])).unwrap();
        blocks.set_fallthrough(ids[2], Some(ids[1])).unwrap();

        assert_eq!(repartition(&mut blocks).unwrap(), 1);
        assert_eq!(blocks.children(root).unwrap(), &[ids[0], ids[2], ids[1]]);
        blocks.verify().unwrap();

        // already in order
        assert_eq!(repartition(&mut blocks).unwrap(), 0);
    }
}
