//! Linear ordering of the direct children of one region.
//!
//! The scheduler lays out a region so that control mostly flows forward:
//!
//! - the children are split into strongly connected components over the region's own edges
//!   (edges into nested regions are attributed to the nested region, edges leaving the region
//!   are ignored)
//! - components are emitted in topological order, starting from the entry
//! - a loop (a component with more than one member) is laid out contiguously: it is scheduled
//!   again without its first member, which is put in front, and the member reached most often
//!   from outside the loop is moved to its end
//!
//! The entry always ends up first. The result is only a preference;
//! [`crate::blocks::StackOrderFixup`] repairs it where the evaluation stack requires it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    blocks::{MethodBlocks, NodeKind},
    utils::graph::{algorithms::TarjanState, GraphBase, NodeId, Successors},
    Error, Result,
};

/// Successor lists of a region's children, in local indices.
struct ChildGraph {
    successors: Vec<Vec<NodeId>>,
}

/// A [`ChildGraph`] restricted to a subset of its nodes.
struct Restricted<'a> {
    graph: &'a ChildGraph,
    allowed: &'a [bool],
}

impl GraphBase for Restricted<'_> {
    fn node_count(&self) -> usize {
        self.graph.successors.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.node_count()).map(NodeId::new)
    }
}

impl Successors for Restricted<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors[node.index()]
            .iter()
            .copied()
            .filter(|succ| self.allowed[succ.index()])
    }
}

/// One entry of a level's layout.
enum Item {
    Single(usize),
    /// Members of a loop in discovery order
    Loop(Vec<usize>),
}

/// A loop being laid out.
struct Frame {
    items: std::vec::IntoIter<Item>,
    placed: Vec<usize>,
    /// The loop member put in front of the loop's layout
    head: Option<usize>,
}

/// Computes the preferred order of a region's children.
pub struct BlockScheduler<'a> {
    blocks: &'a MethodBlocks,
    scope: NodeId,
    children: Vec<NodeId>,
    graph: ChildGraph,
}

impl<'a> BlockScheduler<'a> {
    /// Prepares the scheduler for the children of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] if `scope` has no child list and
    /// [`Error::InvalidHandle`] for stale handles in the tree.
    pub fn new(blocks: &'a MethodBlocks, scope: NodeId) -> Result<Self> {
        let children = blocks.children(scope)?.to_vec();
        let index_of: FxHashMap<NodeId, usize> = children
            .iter()
            .enumerate()
            .map(|(index, &child)| (child, index))
            .collect();

        let mut successors = Vec::with_capacity(children.len());
        for &child in &children {
            let mut local = Vec::new();
            for target in Self::targets(blocks, child)? {
                if let Some(near) = blocks.nearest_child(scope, target)? {
                    if let Some(&index) = index_of.get(&near) {
                        local.push(NodeId::new(index));
                    }
                }
            }
            successors.push(local);
        }

        Ok(BlockScheduler {
            blocks,
            scope,
            children,
            graph: ChildGraph { successors },
        })
    }

    /// Edges leaving `child` in visiting order: the reverse of `[fallthrough, targets...]`
    /// for a block, and the same for every block nested in a region.
    fn targets(blocks: &MethodBlocks, child: NodeId) -> Result<Vec<NodeId>> {
        let inner = match blocks.node(child)?.kind() {
            NodeKind::Block(_) => vec![child],
            _ => blocks
                .descendants(child)?
                .into_iter()
                .filter(|&id| blocks.is_block(id))
                .collect(),
        };

        let mut targets = Vec::new();
        for block in inner {
            targets.extend(blocks.block(block)?.successors().into_iter().rev());
        }
        Ok(targets)
    }

    /// Returns the children in scheduled order, entry first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderingInvariantViolation`] if the layout lost a child, which means
    /// the tree changed underneath the scheduler.
    pub fn schedule(&self) -> Result<Vec<NodeId>> {
        let count = self.children.len();
        if count <= 1 {
            return Ok(self.children.clone());
        }

        let members: Vec<usize> = (0..count).collect();
        let mut frames = vec![Frame {
            items: self.layout(&members, None).into_iter(),
            placed: Vec::with_capacity(count),
            head: None,
        }];

        let mut order = Vec::new();
        while let Some(frame) = frames.last_mut() {
            match frame.items.next() {
                Some(Item::Single(index)) => frame.placed.push(index),
                Some(Item::Loop(members)) => {
                    let head = members[0];
                    frames.push(Frame {
                        items: self.layout(&members, Some(head)).into_iter(),
                        placed: Vec::with_capacity(members.len()),
                        head: Some(head),
                    });
                }
                None => {
                    let mut placed = std::mem::take(&mut frame.placed);
                    if let Some(head) = frame.head {
                        placed.insert(0, head);
                        self.move_loop_start_last(&mut placed)?;
                    }
                    frames.pop();
                    match frames.last_mut() {
                        Some(parent) => parent.placed.extend(placed),
                        None => order = placed,
                    }
                }
            }
        }

        if order.len() != count {
            return Err(Error::OrderingInvariantViolation(format!(
                "scheduled {} of {} children",
                order.len(),
                count
            )));
        }
        if let Some(position) = order.iter().position(|&index| index == 0) {
            let entry = order.remove(position);
            order.insert(0, entry);
        }
        Ok(order.into_iter().map(|index| self.children[index]).collect())
    }

    /// Lays out `members` one level deep. With a `head`, the head is left out and the
    /// members it reaches are visited first.
    fn layout(&self, members: &[usize], head: Option<usize>) -> Vec<Item> {
        let count = self.children.len();
        let mut allowed = vec![false; count];
        for &member in members {
            allowed[member] = true;
        }
        if let Some(head) = head {
            allowed[head] = false;
        }

        let graph = Restricted {
            graph: &self.graph,
            allowed: &allowed,
        };
        let mut roots: Vec<NodeId> = Vec::new();
        if let Some(head) = head {
            roots.extend(graph.successors(NodeId::new(head)));
        }
        roots.extend(
            members
                .iter()
                .filter(|&&member| allowed[member])
                .map(|&member| NodeId::new(member)),
        );

        let mut state = TarjanState::new(count);
        let mut items = Vec::new();
        for root in roots {
            let components = state.visit(&graph, root);
            // components complete sinks first; emit them sources first
            for mut component in components.into_iter().rev() {
                if component.len() == 1 {
                    items.push(Item::Single(component[0].index()));
                } else {
                    component.reverse();
                    items.push(Item::Loop(
                        component.into_iter().map(|node| node.index()).collect(),
                    ));
                }
            }
        }
        items
    }

    /// Moves the loop block with the most predecessors outside the loop to the end, keeping
    /// the loop condition at the bottom. Ties go to the earlier block. A predecessor nested in
    /// a region counts as the region's child.
    fn move_loop_start_last(&self, placed: &mut Vec<usize>) -> Result<()> {
        let members: FxHashSet<NodeId> = placed.iter().map(|&index| self.children[index]).collect();

        let mut best: Option<(usize, usize)> = None;
        for (position, &index) in placed.iter().enumerate() {
            let child = self.children[index];
            if !self.blocks.is_block(child) {
                continue;
            }
            let mut external = 0;
            for &source in self.blocks.block(child)?.sources() {
                let near = self.blocks.nearest_child(self.scope, source)?;
                if !near.is_some_and(|near| members.contains(&near)) {
                    external += 1;
                }
            }
            if external > 0 && best.map_or(true, |(_, max)| external > max) {
                best = Some((position, external));
            }
        }

        if let Some((position, _)) = best {
            let start = placed.remove(position);
            placed.push(start);
        }
        Ok(())
    }
}
