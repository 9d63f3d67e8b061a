//! Removal of code that no path from the method entry reaches.
//!
//! Liveness is computed over the whole tree at once. Exception handlers are always kept as
//! long as their protected region is live, because the runtime enters them without any
//! edge pointing at them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    blocks::{MethodBlocks, NodeKind},
    utils::graph::NodeId,
    Error, Result,
};

/// Reachability sweep over a [`MethodBlocks`] tree.
pub struct DeadCodeEliminator<'a> {
    blocks: &'a mut MethodBlocks,
}

impl<'a> DeadCodeEliminator<'a> {
    /// Creates an eliminator working on `blocks`.
    pub fn new(blocks: &'a mut MethodBlocks) -> Self {
        DeadCodeEliminator { blocks }
    }

    /// Computes the set of live nodes, root included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the tree contains stale handles.
    pub fn live_nodes(&self) -> Result<FxHashSet<NodeId>> {
        let blocks = &*self.blocks;
        let root = blocks.root();
        let mut live = FxHashSet::default();
        let mut worklist = vec![root];
        live.insert(root);

        while let Some(node) = worklist.pop() {
            match blocks.node(node)?.kind() {
                NodeKind::Block(block) => {
                    for target in block.successors() {
                        // entering a block makes every region around it live
                        let mut current = Some(target);
                        while let Some(id) = current {
                            if !live.insert(id) {
                                break;
                            }
                            worklist.push(id);
                            current = blocks.parent(id)?;
                        }
                    }
                }
                NodeKind::RegionHandler(handler) => {
                    for scope in handler.filter().into_iter().chain([handler.handler()]) {
                        if live.insert(scope) {
                            worklist.push(scope);
                        }
                    }
                }
                kind => {
                    let mut reached: Vec<NodeId> = blocks.entry(node)?.into_iter().collect();
                    if let NodeKind::ProtectedRegion(_) = kind {
                        reached.extend_from_slice(blocks.handlers(node)?);
                    }
                    for id in reached {
                        if live.insert(id) {
                            worklist.push(id);
                        }
                    }
                }
            }
        }
        Ok(live)
    }

    /// Removes every node that isn't live and returns the number of removed blocks.
    ///
    /// Dead nodes are grouped by their parent, and each parent drops all of its dead children
    /// at once, so the tree is consistent again as soon as the call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeRegionRemoval`] if live code still branches into a dead node and
    /// [`Error::OwnershipViolation`] if a dead node's parent doesn't list it.
    pub fn run(&mut self) -> Result<usize> {
        let live = self.live_nodes()?;
        let all = self.blocks.descendants(self.blocks.root())?;
        let dead: FxHashSet<NodeId> = all.iter().copied().filter(|id| !live.contains(id)).collect();
        if dead.is_empty() {
            return Ok(0);
        }

        let mut dead_blocks = Vec::new();
        let mut dead_roots: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for &node in all.iter().filter(|id| dead.contains(id)) {
            if self.blocks.is_block(node) {
                let block = self.blocks.block(node)?;
                if let Some(&referrer) = block.sources().iter().find(|s| !dead.contains(s)) {
                    return Err(Error::UnsafeRegionRemoval {
                        region: node,
                        referrer,
                    });
                }
                dead_blocks.push(node);
            }

            let Some(parent) = self.blocks.parent(node)? else {
                return Err(Error::OwnershipViolation {
                    node,
                    message: "dead node has no parent".to_string(),
                });
            };
            if live.contains(&parent) {
                dead_roots.entry(parent).or_default().push(node);
            }
        }

        for &block in &dead_blocks {
            self.blocks.disconnect_from_fallthrough_and_targets(block)?;
        }

        for (parent, nodes) in dead_roots {
            if !self.blocks.contains(parent) {
                return Err(Error::OwnershipViolation {
                    node: parent,
                    message: "parent of dead code was already removed".to_string(),
                });
            }
            let owned = self.blocks.owned(parent)?;
            if let Some(&stray) = nodes.iter().find(|node| !owned.contains(node)) {
                return Err(Error::OwnershipViolation {
                    node: stray,
                    message: format!("not owned by its parent {parent}"),
                });
            }
            match &mut self.blocks.node_mut(parent)?.kind {
                NodeKind::ProtectedRegion(protected) => {
                    protected.children.retain(|child| !dead.contains(child));
                    protected.handlers.retain(|handler| !dead.contains(handler));
                }
                NodeKind::MethodScope(scope)
                | NodeKind::FilterScope(scope)
                | NodeKind::HandlerScope(scope) => {
                    scope.children.retain(|child| !dead.contains(child));
                }
                kind => {
                    return Err(Error::OwnershipViolation {
                        node: parent,
                        message: format!("{} can't drop children", kind.name()),
                    })
                }
            }
        }

        for &node in all.iter().filter(|id| dead.contains(id)) {
            self.blocks.release(node)?;
        }
        Ok(dead_blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blocks::GraphBuilder,
        metadata::{
            method::{ExceptionHandler, MethodBody},
            token::Token,
        },
        test::{instr, target_instr},
    };

    #[test]
    fn test_removes_unreachable_block() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ret")]);
        let orphan = blocks.new_block(vec![instr("nop")]);
        let orphan_tail = blocks.new_block(vec![instr("ret")]);
        for id in [entry, orphan, orphan_tail] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(orphan, Some(orphan_tail)).unwrap();

        let removed = DeadCodeEliminator::new(&mut blocks).run().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(blocks.children(root).unwrap(), &[entry]);
        assert!(!blocks.contains(orphan));
        blocks.verify().unwrap();
    }

    #[test]
    fn test_unreachable_loop_is_removed() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ret")]);
        let a = blocks.new_block(vec![instr("nop")]);
        let b = blocks.new_block(vec![instr("nop")]);
        for id in [entry, a, b] {
            blocks.add(root, id).unwrap();
        }
        blocks.set_fallthrough(a, Some(b)).unwrap();
        blocks.set_fallthrough(b, Some(a)).unwrap();

        assert_eq!(DeadCodeEliminator::new(&mut blocks).run().unwrap(), 2);
        blocks.verify().unwrap();
    }

    #[test]
    fn test_keeps_handlers_of_live_region() {
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
        let mut blocks = GraphBuilder::new(&body).build().unwrap();
        let before = blocks.all_blocks().unwrap().len();
        assert_eq!(DeadCodeEliminator::new(&mut blocks).run().unwrap(), 0);
        assert_eq!(blocks.all_blocks().unwrap().len(), before);
    }

    #[test]
    fn test_removes_unreachable_region() {
        // ret; try { nop; leave } finally { endfinally }; ret
        let body = MethodBody::new(
            vec![
                instr("ret"),
                instr("nop"),
                target_instr("leave", 4),
                instr("endfinally"),
                instr("ret"),
            ],
            vec![ExceptionHandler::finally(1..3, 3..4)],
        );
        let mut blocks = GraphBuilder::new(&body).build().unwrap();
        let removed = DeadCodeEliminator::new(&mut blocks).run().unwrap();
        assert_eq!(removed, 3);
        assert_eq!(blocks.all_blocks().unwrap().len(), 1);
        assert_eq!(blocks.children(blocks.root()).unwrap().len(), 1);
        blocks.verify().unwrap();
    }

    #[test]
    fn test_live_nodes() {
        let mut blocks = MethodBlocks::new();
        let root = blocks.root();
        let entry = blocks.new_block(vec![instr("ret")]);
        let dead = blocks.new_block(vec![instr("ret")]);
        blocks.add(root, entry).unwrap();
        blocks.add(root, dead).unwrap();

        let live = DeadCodeEliminator::new(&mut blocks).live_nodes().unwrap();
        assert!(live.contains(&entry));
        assert!(!live.contains(&dead));
        assert!(live.contains(&root));
    }
}
