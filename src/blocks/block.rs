//! Basic blocks and the operations that edit them.
//!
//! A [`Block`] stores its instructions and both directions of every edge: `fallthrough` and
//! `targets` on the source side, one `sources` entry per edge on the target side. Every
//! operation here updates both sides together, so the edge multiset stays symmetric.
//!
//! # Edge model
//!
//! - `fallthrough` is the block control reaches when the last instruction doesn't transfer
//!   control (or when a branch was stripped and replaced by the edge itself)
//! - `targets` holds the explicit destinations of a trailing branch, leave or switch, in
//!   operand order
//! - `sources` lists one entry per incoming edge; a block that both falls through and
//!   branches to the same successor appears twice

use crate::{
    assembly::{Instruction, Operand},
    blocks::{MethodBlocks, NodeKind},
    utils::graph::NodeId,
    Error, Result,
};

/// A maximal straight-line run of instructions with explicit exit edges.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) fallthrough: Option<NodeId>,
    pub(crate) targets: Option<Vec<NodeId>>,
    pub(crate) sources: Vec<NodeId>,
}

impl Block {
    /// The instructions of this block.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The terminating instruction, if any.
    #[must_use]
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// The block reached when control runs off the end.
    #[must_use]
    pub fn fallthrough(&self) -> Option<NodeId> {
        self.fallthrough
    }

    /// The explicit branch destinations, in operand order.
    #[must_use]
    pub fn targets(&self) -> Option<&[NodeId]> {
        self.targets.as_deref()
    }

    /// One entry per incoming edge.
    #[must_use]
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Every outgoing edge: the fallthrough first, then the targets.
    #[must_use]
    pub fn successors(&self) -> Vec<NodeId> {
        self.fallthrough
            .iter()
            .chain(self.targets.iter().flatten())
            .copied()
            .collect()
    }

    /// Number of outgoing edges.
    #[must_use]
    pub fn count_targets(&self) -> usize {
        usize::from(self.fallthrough.is_some()) + self.targets.as_ref().map_or(0, Vec::len)
    }

    /// The single successor of a block with exactly one way out.
    ///
    /// That is the fallthrough when there are no targets, or the lone target of a kept `br`.
    #[must_use]
    pub fn only_target(&self) -> Option<NodeId> {
        match (&self.fallthrough, &self.targets) {
            (fallthrough, None) => *fallthrough,
            (None, Some(targets)) if targets.len() == 1 => Some(targets[0]),
            _ => None,
        }
    }

    /// Returns `true` if the block contains only `nop`s (or nothing) and just falls through.
    #[must_use]
    pub fn is_nop_block(&self) -> bool {
        self.fallthrough.is_some()
            && self.targets.is_none()
            && self.instructions.iter().all(Instruction::is_nop)
    }

    /// Returns `true` if the block ends in a conditional branch.
    #[must_use]
    pub fn is_conditional_branch(&self) -> bool {
        self.last_instruction()
            .is_some_and(Instruction::is_conditional_branch)
    }

    /// Returns `true` if `source` is the only block that reaches this one.
    #[must_use]
    pub fn is_only_source(&self, source: NodeId) -> bool {
        self.sources.len() == 1 && self.sources[0] == source
    }

    fn ends_in_branch(&self) -> bool {
        self.last_instruction().is_some_and(Instruction::is_branch)
    }
}

impl MethodBlocks {
    /// Allocates a detached block. Attach it with [`MethodBlocks::add`].
    pub fn new_block(&mut self, instructions: Vec<Instruction>) -> NodeId {
        self.alloc(NodeKind::Block(Block {
            instructions,
            ..Block::default()
        }))
    }

    fn live_block(&self, target: NodeId) -> Result<NodeId> {
        if self.is_block(target) {
            Ok(target)
        } else {
            Err(Error::NullTarget(target))
        }
    }

    fn add_source(&mut self, target: NodeId, source: NodeId) -> Result<()> {
        self.block_mut(target)?.sources.push(source);
        Ok(())
    }

    fn remove_source(&mut self, target: NodeId, source: NodeId) -> Result<()> {
        let sources = &mut self.block_mut(target)?.sources;
        match sources.iter().position(|&s| s == source) {
            Some(index) => {
                sources.remove(index);
                Ok(())
            }
            None => Err(Error::DanglingEdge {
                from: source,
                target,
            }),
        }
    }

    /// Removes the fallthrough edge of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingEdge`] if the successor doesn't list `block` as a source.
    pub fn disconnect_from_fallthrough(&mut self, block: NodeId) -> Result<()> {
        if let Some(fallthrough) = self.block_mut(block)?.fallthrough.take() {
            self.remove_source(fallthrough, block)?;
        }
        Ok(())
    }

    /// Removes every target edge of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingEdge`] if a successor doesn't list `block` as a source.
    pub fn disconnect_from_targets(&mut self, block: NodeId) -> Result<()> {
        if let Some(targets) = self.block_mut(block)?.targets.take() {
            for target in targets {
                self.remove_source(target, block)?;
            }
        }
        Ok(())
    }

    /// Removes every outgoing edge of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingEdge`] if a successor doesn't list `block` as a source.
    pub fn disconnect_from_fallthrough_and_targets(&mut self, block: NodeId) -> Result<()> {
        self.disconnect_from_fallthrough(block)?;
        self.disconnect_from_targets(block)
    }

    /// Removes every edge from `block` to `target`, leaving other edges intact.
    ///
    /// Target slots pointing at `target` are dropped; if none remain the block has no
    /// targets at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingEdge`] if `block` had no edge to `target`.
    pub fn disconnect_from_block(&mut self, block: NodeId, target: NodeId) -> Result<()> {
        let mut removed = 0;
        let data = self.block_mut(block)?;
        if data.fallthrough == Some(target) {
            data.fallthrough = None;
            removed += 1;
        }
        if let Some(targets) = &mut data.targets {
            let before = targets.len();
            targets.retain(|&t| t != target);
            removed += before - targets.len();
            if targets.is_empty() {
                data.targets = None;
            }
        }

        if removed == 0 {
            return Err(Error::DanglingEdge {
                from: block,
                target,
            });
        }
        for _ in 0..removed {
            self.remove_source(target, block)?;
        }
        Ok(())
    }

    /// Replaces the fallthrough edge of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTarget`] if `fallthrough` doesn't name a live block.
    pub fn set_fallthrough(&mut self, block: NodeId, fallthrough: Option<NodeId>) -> Result<()> {
        if let Some(target) = fallthrough {
            self.live_block(target)?;
        }
        self.disconnect_from_fallthrough(block)?;
        self.block_mut(block)?.fallthrough = fallthrough;
        if let Some(target) = fallthrough {
            self.add_source(target, block)?;
        }
        Ok(())
    }

    /// Replaces all target edges of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTarget`] if a target doesn't name a live block.
    pub fn set_targets(&mut self, block: NodeId, targets: Option<Vec<NodeId>>) -> Result<()> {
        for &target in targets.iter().flatten() {
            self.live_block(target)?;
        }
        self.disconnect_from_targets(block)?;
        for &target in targets.iter().flatten() {
            self.add_source(target, block)?;
        }
        self.block_mut(block)?.targets = targets;
        Ok(())
    }

    /// Redirects the target at `index` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTarget`] for a dead target and [`Error::BoundsError`] if
    /// `index` is not a target slot.
    pub fn set_target(&mut self, block: NodeId, index: usize, target: NodeId) -> Result<()> {
        self.live_block(target)?;
        let old = {
            let data = self.block_mut(block)?;
            let slot = data
                .targets
                .as_mut()
                .and_then(|targets| targets.get_mut(index))
                .ok_or_else(|| {
                    Error::BoundsError(format!("block {block} has no target slot {index}"))
                })?;
            std::mem::replace(slot, target)
        };
        self.remove_source(old, block)?;
        self.add_source(target, block)
    }

    /// Appends an instruction to `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `block` is not a live block.
    pub fn push_instruction(&mut self, block: NodeId, instruction: Instruction) -> Result<()> {
        self.block_mut(block)?.instructions.push(instruction);
        Ok(())
    }

    /// Inserts an instruction before position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundsError`] if `index` is past the end of the block.
    pub fn insert_instruction(
        &mut self,
        block: NodeId,
        index: usize,
        instruction: Instruction,
    ) -> Result<()> {
        let data = self.block_mut(block)?;
        if index > data.instructions.len() {
            return Err(Error::BoundsError(format!(
                "insert at {index} in block {block} of {} instructions",
                data.instructions.len()
            )));
        }
        data.instructions.insert(index, instruction);
        Ok(())
    }

    /// Removes `count` instructions starting at `index`.
    ///
    /// When the range covers a trailing branch, the block's outgoing edges are torn down
    /// first; the caller is expected to wire new ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundsError`] if the range runs past the end of the block.
    pub fn remove_instructions(&mut self, block: NodeId, index: usize, count: usize) -> Result<()> {
        let data = self.block(block)?;
        let len = data.len();
        let end = index
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                Error::BoundsError(format!(
                    "remove {index}+{count} in block {block} of {len} instructions"
                ))
            })?;
        if count > 0 && end == len && data.ends_in_branch() {
            self.disconnect_from_fallthrough_and_targets(block)?;
        }
        self.block_mut(block)?.instructions.drain(index..end);
        Ok(())
    }

    /// Removes the instructions at the given positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundsError`] if a position is past the end of the block.
    pub fn remove_indices(&mut self, block: NodeId, indices: &[usize]) -> Result<()> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let data = self.block(block)?;
        let len = data.len();
        if let Some(&bad) = sorted.iter().find(|&&index| index >= len) {
            return Err(Error::BoundsError(format!(
                "remove index {bad} in block {block} of {len} instructions"
            )));
        }
        if len > 0 && sorted.last() == Some(&(len - 1)) && data.ends_in_branch() {
            self.disconnect_from_fallthrough_and_targets(block)?;
        }
        for &index in sorted.iter().rev() {
            self.block_mut(block)?.instructions.remove(index);
        }
        Ok(())
    }

    /// Replaces `count` instructions at `index` with a single instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundsError`] if `count` is zero or the range is out of bounds.
    pub fn replace_instructions(
        &mut self,
        block: NodeId,
        index: usize,
        count: usize,
        instruction: Instruction,
    ) -> Result<()> {
        if count == 0 {
            return Err(Error::BoundsError(format!(
                "replace of zero instructions in block {block}"
            )));
        }
        self.remove_instructions(block, index, count)?;
        self.insert_instruction(block, index, instruction)
    }

    /// Drops the last `count` instructions and makes `target` the only successor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTarget`] if `target` isn't a live block, [`Error::BoundsError`]
    /// if the block is shorter than `count`.
    pub fn replace_tail_with_branch(
        &mut self,
        block: NodeId,
        count: usize,
        target: NodeId,
    ) -> Result<()> {
        self.live_block(target)?;
        let len = self.block(block)?.len();
        if count > len {
            return Err(Error::BoundsError(format!(
                "replace last {count} of {len} instructions in block {block}"
            )));
        }

        self.disconnect_from_fallthrough_and_targets(block)?;
        let data = self.block_mut(block)?;
        data.instructions.truncate(len - count);
        data.fallthrough = Some(target);
        self.add_source(target, block)
    }

    /// Like [`MethodBlocks::replace_tail_with_branch`], but a trailing `br` is not counted
    /// in `count`.
    ///
    /// # Errors
    ///
    /// See [`MethodBlocks::replace_tail_with_branch`].
    pub fn replace_last_non_branch_with_branch(
        &mut self,
        block: NodeId,
        count: usize,
        target: NodeId,
    ) -> Result<()> {
        let extra = usize::from(
            self.block(block)?
                .last_instruction()
                .is_some_and(Instruction::is_br),
        );
        self.replace_tail_with_branch(block, count + extra, target)
    }

    /// Resolves a trailing conditional branch to one of its successors.
    ///
    /// The branch is replaced by `pop`s for its operands so the stack stays balanced, and the
    /// block continues at the target when `taken`, at the fallthrough otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerminator`] if the block doesn't end in a conditional branch,
    /// [`Error::InvalidEdgeArity`] if it doesn't have one fallthrough and one target.
    pub fn replace_conditional_with_branch(&mut self, block: NodeId, taken: bool) -> Result<()> {
        let data = self.block(block)?;
        let last = data
            .last_instruction()
            .filter(|instr| instr.is_conditional_branch())
            .ok_or(Error::InvalidTerminator {
                block,
                expected: "a conditional branch",
            })?;
        let (Some(fallthrough), Some([target])) = (data.fallthrough, data.targets.as_deref())
        else {
            return Err(Error::InvalidEdgeArity {
                mnemonic: last.mnemonic,
                expected: "1 fallthrough and 1 target",
                found: data.count_targets(),
            });
        };

        let pops = last.stack_behavior.pops;
        let destination = if taken { *target } else { fallthrough };
        self.replace_tail_with_branch(block, 1, destination)?;
        self.push_pops(block, pops)
    }

    /// Resolves a trailing `switch` to `target`, popping the selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerminator`] if the block doesn't end in a `switch`, and
    /// [`Error::NullTarget`] if `target` isn't a live block.
    pub fn replace_switch_with_branch(&mut self, block: NodeId, target: NodeId) -> Result<()> {
        let pops = self
            .block(block)?
            .last_instruction()
            .filter(|instr| instr.is_switch())
            .map(|instr| instr.stack_behavior.pops)
            .ok_or(Error::InvalidTerminator {
                block,
                expected: "a switch",
            })?;
        self.replace_tail_with_branch(block, 1, target)?;
        self.push_pops(block, pops)
    }

    fn push_pops(&mut self, block: NodeId, count: u8) -> Result<()> {
        for _ in 0..count {
            let pop = Instruction::new("pop", Operand::None)?;
            self.push_instruction(block, pop)?;
        }
        Ok(())
    }

    /// Turns a trailing `br` into a plain fallthrough edge. Returns `false` if the block
    /// doesn't end in `br`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdgeArity`] if the `br` doesn't have exactly one target edge.
    pub fn remove_last_br(&mut self, block: NodeId) -> Result<bool> {
        let data = self.block_mut(block)?;
        let Some(mnemonic) = data
            .instructions
            .last()
            .filter(|instr| instr.is_br())
            .map(|instr| instr.mnemonic)
        else {
            return Ok(false);
        };
        let target = match (data.fallthrough, data.targets.as_deref()) {
            (None, Some(&[target])) => target,
            _ => {
                return Err(Error::InvalidEdgeArity {
                    mnemonic,
                    expected: "exactly 1 target",
                    found: data.count_targets(),
                })
            }
        };

        data.instructions.pop();
        data.targets = None;
        data.fallthrough = Some(target);
        Ok(true)
    }

    /// Inverts a trailing two-way conditional branch and swaps its fallthrough and target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdgeArity`] unless the block has one fallthrough and one
    /// target, [`Error::InvalidTerminator`] if the branch has no inverse.
    pub fn flip_conditional(&mut self, block: NodeId) -> Result<()> {
        let data = self.block_mut(block)?;
        let (fallthrough, target) = match (data.fallthrough, data.targets.as_deref()) {
            (Some(fallthrough), Some(&[target])) => (fallthrough, target),
            _ => {
                return Err(Error::InvalidEdgeArity {
                    mnemonic: data.instructions.last().map_or("", |instr| instr.mnemonic),
                    expected: "1 fallthrough and 1 target",
                    found: data.count_targets(),
                })
            }
        };

        let flipped = data.instructions.last_mut().is_some_and(Instruction::flip);
        if !flipped {
            return Err(Error::InvalidTerminator {
                block,
                expected: "a flippable conditional branch",
            });
        }
        data.fallthrough = Some(target);
        data.targets = Some(vec![fallthrough]);
        Ok(())
    }

    /// Returns `true` if `block` continues unconditionally into `other`, so `other`'s
    /// instructions could be appended to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for stale handles.
    pub fn can_append(&self, block: NodeId, other: NodeId) -> Result<bool> {
        let data = self.block(block)?;
        if block == other || data.only_target() != Some(other) {
            return Ok(false);
        }
        Ok(data
            .last_instruction()
            .map_or(true, |instr| instr.is_br() || instr.falls_through()))
    }

    /// Returns `true` if [`MethodBlocks::merge`] would succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for stale handles.
    pub fn can_merge(&self, block: NodeId, other: NodeId) -> Result<bool> {
        if !self.can_append(block, other)? || !self.block(other)?.is_only_source(block) {
            return Ok(false);
        }
        let parent = self.parent(other)?;
        if parent != self.parent(block)? {
            return Ok(false);
        }
        match parent {
            Some(scope) => Ok(self.entry(scope)? != Some(other)),
            None => Ok(true),
        }
    }

    /// Appends `other` to `block` and removes `other` from the tree.
    ///
    /// `block` loses its trailing `br`, `nop`s on both sides are dropped, and `block` takes
    /// over `other`'s outgoing edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotMergeable`] if [`MethodBlocks::can_merge`] is false.
    pub fn merge(&mut self, block: NodeId, other: NodeId) -> Result<()> {
        if !self.can_merge(block, other)? {
            return Err(Error::NotMergeable { block, other });
        }

        self.remove_last_br(block)?;
        self.disconnect_from_fallthrough_and_targets(block)?;

        let fallthrough = self.block(other)?.fallthrough;
        let targets = self.block(other)?.targets.clone();
        self.disconnect_from_fallthrough_and_targets(other)?;
        let tail = std::mem::take(&mut self.block_mut(other)?.instructions);

        let data = self.block_mut(block)?;
        data.instructions.retain(|instr| !instr.is_nop());
        data.instructions
            .extend(tail.into_iter().filter(|instr| !instr.is_nop()));
        self.set_fallthrough(block, fallthrough)?;
        self.set_targets(block, targets)?;

        if let Some(parent) = self.parent(other)? {
            self.children_mut(parent)?.retain(|&child| child != other);
        }
        self.release(other)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{instr, target_instr};

    /// Builds `count` blocks under the root, unconnected.
    fn blocks_with(count: usize) -> (MethodBlocks, Vec<NodeId>) {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let ids = (0..count)
            .map(|_| {
                let id = blocks.new_block(vec![instr("nop")]);
                blocks.add(root, id).unwrap();
                id
            })
            .collect();
        (blocks, ids)
    }

    #[test]
    fn test_only_target() {
        let mut block = Block::default();
        assert_eq!(block.only_target(), None);
        block.fallthrough = Some(NodeId::new(1));
        assert_eq!(block.only_target(), Some(NodeId::new(1)));
        block.targets = Some(vec![NodeId::new(2)]);
        assert_eq!(block.only_target(), None);
        block.fallthrough = None;
        assert_eq!(block.only_target(), Some(NodeId::new(2)));
        assert_eq!(block.count_targets(), 1);
    }

    #[test]
    fn test_set_edges_keeps_sources_in_sync() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2], ids[1]])).unwrap();
        assert_eq!(blocks.block(ids[1]).unwrap().sources(), &[ids[0], ids[0]]);
        blocks.verify().unwrap();

        blocks.set_target(ids[0], 1, ids[2]).unwrap();
        assert_eq!(blocks.block(ids[1]).unwrap().sources(), &[ids[0]]);
        assert_eq!(blocks.block(ids[2]).unwrap().sources(), &[ids[0], ids[0]]);
        blocks.verify().unwrap();

        assert!(matches!(
            blocks.set_target(ids[0], 5, ids[2]),
            Err(Error::BoundsError(_))
        ));
    }

    #[test]
    fn test_disconnect_from_block() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[1], ids[2]])).unwrap();
        blocks.disconnect_from_block(ids[0], ids[1]).unwrap();
        assert_eq!(blocks.block(ids[0]).unwrap().successors(), vec![ids[2]]);
        assert!(blocks.block(ids[1]).unwrap().sources().is_empty());
        blocks.verify().unwrap();

        assert!(matches!(
            blocks.disconnect_from_block(ids[0], ids[1]),
            Err(Error::DanglingEdge { .. })
        ));
    }

    #[test]
    fn test_replace_tail_with_branch() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[0], instr("ldc.i4.0")).unwrap();
        blocks.push_instruction(ids[0], target_instr("brtrue", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2]])).unwrap();

        blocks.replace_tail_with_branch(ids[0], 2, ids[2]).unwrap();
        let a = blocks.block(ids[0]).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.fallthrough(), Some(ids[2]));
        assert_eq!(a.targets(), None);
        assert!(blocks.block(ids[1]).unwrap().sources().is_empty());
        assert_eq!(blocks.block(ids[2]).unwrap().sources(), &[ids[0]]);
        blocks.verify().unwrap();

        let dead = blocks.new_block(vec![]);
        blocks.release(dead).unwrap();
        assert!(matches!(
            blocks.replace_tail_with_branch(ids[0], 1, dead),
            Err(Error::NullTarget(_))
        ));
        assert!(matches!(
            blocks.replace_tail_with_branch(ids[0], 9, ids[1]),
            Err(Error::BoundsError(_))
        ));
    }

    #[test]
    fn test_remove_terminating_branch_disconnects() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[0], target_instr("brfalse.s", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2]])).unwrap();

        blocks.remove_instructions(ids[0], 1, 1).unwrap();
        assert_eq!(blocks.block(ids[0]).unwrap().count_targets(), 0);
        assert!(blocks.block(ids[2]).unwrap().sources().is_empty());
        blocks.verify().unwrap();

        assert!(matches!(
            blocks.remove_instructions(ids[0], 0, 4),
            Err(Error::BoundsError(_))
        ));
    }

    #[test]
    fn test_remove_indices_and_replace() {
        let (mut blocks, ids) = blocks_with(1);
        for name in ["ldc.i4.0", "ldc.i4.1", "add", "pop"] {
            blocks.push_instruction(ids[0], instr(name)).unwrap();
        }
        blocks.remove_indices(ids[0], &[0, 2]).unwrap();
        let names: Vec<_> = blocks.block(ids[0]).unwrap().instructions().iter().map(|i| i.mnemonic).collect();
        assert_eq!(names, vec!["ldc.i4.0", "add", "pop"]);

        blocks.replace_instructions(ids[0], 0, 2, instr("dup")).unwrap();
        let names: Vec<_> = blocks.block(ids[0]).unwrap().instructions().iter().map(|i| i.mnemonic).collect();
        assert_eq!(names, vec!["dup", "pop"]);
        assert!(blocks.remove_indices(ids[0], &[7]).is_err());
    }

    #[test]
    fn test_flip_conditional() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[0], target_instr("blt", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2]])).unwrap();

        blocks.flip_conditional(ids[0]).unwrap();
        let a = blocks.block(ids[0]).unwrap();
        assert_eq!(a.last_instruction().unwrap().mnemonic, "bge");
        assert_eq!(a.fallthrough(), Some(ids[2]));
        assert_eq!(a.targets(), Some(&[ids[1]][..]));
        blocks.verify().unwrap();

        blocks.set_targets(ids[0], None).unwrap();
        assert!(matches!(
            blocks.flip_conditional(ids[0]),
            Err(Error::InvalidEdgeArity { .. })
        ));
    }

    #[test]
    fn test_flip_unflippable() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[0], target_instr("beq", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2]])).unwrap();
        assert!(matches!(
            blocks.flip_conditional(ids[0]),
            Err(Error::InvalidTerminator { .. })
        ));
    }

    #[test]
    fn test_replace_conditional_with_branch() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[0], target_instr("bgt", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2]])).unwrap();

        blocks.replace_conditional_with_branch(ids[0], true).unwrap();
        let a = blocks.block(ids[0]).unwrap();
        let names: Vec<_> = a.instructions().iter().map(|i| i.mnemonic).collect();
        assert_eq!(names, vec!["nop", "pop", "pop"]);
        assert_eq!(a.fallthrough(), Some(ids[2]));
        assert!(blocks.block(ids[1]).unwrap().sources().is_empty());
        blocks.verify().unwrap();

        assert!(matches!(
            blocks.replace_conditional_with_branch(ids[0], false),
            Err(Error::InvalidTerminator { .. })
        ));
    }

    #[test]
    fn test_replace_switch_with_branch() {
        let (mut blocks, ids) = blocks_with(3);
        let switch = Instruction::new("switch", Operand::Switch(vec![0, 0])).unwrap();
        blocks.push_instruction(ids[0], switch).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[2], ids[1]])).unwrap();

        blocks.replace_switch_with_branch(ids[0], ids[2]).unwrap();
        let a = blocks.block(ids[0]).unwrap();
        assert_eq!(a.last_instruction().unwrap().mnemonic, "pop");
        assert_eq!(a.successors(), vec![ids[2]]);
        blocks.verify().unwrap();
    }

    #[test]
    fn test_remove_last_br() {
        let (mut blocks, ids) = blocks_with(2);
        blocks.push_instruction(ids[0], target_instr("br.s", 0)).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[1]])).unwrap();

        assert!(blocks.remove_last_br(ids[0]).unwrap());
        assert_eq!(blocks.block(ids[0]).unwrap().fallthrough(), Some(ids[1]));
        assert!(!blocks.remove_last_br(ids[0]).unwrap());
        blocks.verify().unwrap();
    }

    #[test]
    fn test_merge() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.push_instruction(ids[1], instr("ldc.i4.1")).unwrap();
        blocks.push_instruction(ids[1], target_instr("br", 0)).unwrap();
        blocks.set_fallthrough(ids[0], Some(ids[1])).unwrap();
        blocks.set_targets(ids[1], Some(vec![ids[2]])).unwrap();
        blocks.push_instruction(ids[2], instr("ret")).unwrap();

        assert!(blocks.can_merge(ids[1], ids[2]).unwrap());

        blocks.merge(ids[1], ids[2]).unwrap();
        let b = blocks.block(ids[1]).unwrap();
        let names: Vec<_> = b.instructions().iter().map(|i| i.mnemonic).collect();
        assert_eq!(names, vec!["ldc.i4.1", "ret"]);
        assert_eq!(b.count_targets(), 0);
        assert!(!blocks.contains(ids[2]));
        assert_eq!(blocks.children(blocks.root()).unwrap(), &[ids[0], ids[1]]);
        blocks.verify().unwrap();

        assert!(matches!(
            blocks.merge(ids[0], ids[2]),
            Err(Error::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_merge_keeps_entry() {
        let (mut blocks, ids) = blocks_with(2);
        blocks.set_fallthrough(ids[1], Some(ids[0])).unwrap();
        assert!(blocks.can_append(ids[1], ids[0]).unwrap());
        assert!(!blocks.can_merge(ids[1], ids[0]).unwrap());
    }

    #[test]
    fn test_merge_rejects_shared_successor() {
        let (mut blocks, ids) = blocks_with(3);
        blocks.set_fallthrough(ids[0], Some(ids[2])).unwrap();
        blocks.set_fallthrough(ids[1], Some(ids[2])).unwrap();
        assert!(blocks.can_append(ids[1], ids[2]).unwrap());
        assert!(!blocks.can_merge(ids[1], ids[2]).unwrap());
        assert!(matches!(
            blocks.merge(ids[1], ids[2]),
            Err(Error::NotMergeable { .. })
        ));
    }

    #[test]
    fn test_can_append_rejects_leave() {
        let (mut blocks, ids) = blocks_with(2);
        blocks.push_instruction(ids[0], target_instr("leave", 0)).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[1]])).unwrap();
        assert!(!blocks.can_append(ids[0], ids[1]).unwrap());
    }

    #[test]
    fn test_replace_last_non_branch_skips_br() {
        let (mut blocks, ids) = blocks_with(3);
        for mnemonic in ["ldc.i4.0", "pop"] {
            blocks.push_instruction(ids[0], instr(mnemonic)).unwrap();
        }
        blocks.push_instruction(ids[0], target_instr("br", 0)).unwrap();
        blocks.set_targets(ids[0], Some(vec![ids[1]])).unwrap();

        blocks
            .replace_last_non_branch_with_branch(ids[0], 2, ids[2])
            .unwrap();
        let a = blocks.block(ids[0]).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.fallthrough(), Some(ids[2]));
        assert!(a.targets().is_none());
        assert!(blocks.block(ids[1]).unwrap().sources().is_empty());
        assert_eq!(blocks.block(ids[2]).unwrap().sources(), &[ids[0]]);
        blocks.verify().unwrap();
    }

    #[test]
    fn test_insert_instruction_bounds() {
        let (mut blocks, ids) = blocks_with(1);
        blocks.insert_instruction(ids[0], 0, instr("ldnull")).unwrap();
        blocks.insert_instruction(ids[0], 2, instr("pop")).unwrap();
        let listing: Vec<&str> = blocks
            .block(ids[0])
            .unwrap()
            .instructions()
            .iter()
            .map(|i| i.mnemonic)
            .collect();
        assert_eq!(listing, vec!["ldnull", "nop", "pop"]);
        assert!(matches!(
            blocks.insert_instruction(ids[0], 9, instr("nop")),
            Err(Error::BoundsError(_))
        ));
    }
}
