//! The per-method arena that owns every block and region.
//!
//! Control flow is cyclic and every node points back at its parent, so nodes are not linked
//! by references. Instead [`MethodBlocks`] stores them in a vector of slots and hands out
//! [`NodeId`] handles. Child and handler lists are the only ownership edges; `parent` and
//! the block edges (`fallthrough`, `targets`, `sources`) are plain handles used for lookup.
//! Removing a node leaves an empty slot behind, so a stale handle fails with
//! [`Error::InvalidHandle`] instead of silently naming a different node.

use rustc_hash::FxHashMap;
use strum::IntoStaticStr;

use crate::{
    blocks::{Block, ProtectedRegion, RegionHandler, Scope},
    utils::graph::NodeId,
    Error, Result,
};

/// The payload of an arena node.
///
/// `MethodScope`, `ProtectedRegion`, `FilterScope` and `HandlerScope` own an ordered child
/// list whose first element is the region's entry. A `ProtectedRegion` additionally owns its
/// `RegionHandler`s, and a `RegionHandler` owns its optional `FilterScope` and its
/// `HandlerScope`.
#[derive(Debug, Clone, IntoStaticStr)]
pub enum NodeKind {
    /// A basic block
    Block(Block),
    /// The root region of a method
    MethodScope(Scope),
    /// A try region
    ProtectedRegion(ProtectedRegion),
    /// A catch/filter/finally/fault clause of a try region
    RegionHandler(RegionHandler),
    /// The filter code of a filter clause
    FilterScope(Scope),
    /// The handler code of a clause
    HandlerScope(Scope),
}

impl NodeKind {
    /// The variant name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns `true` for blocks.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, NodeKind::Block(_))
    }

    /// Returns `true` for regions that own an ordered child list.
    #[must_use]
    pub fn has_children(&self) -> bool {
        matches!(
            self,
            NodeKind::MethodScope(_)
                | NodeKind::ProtectedRegion(_)
                | NodeKind::FilterScope(_)
                | NodeKind::HandlerScope(_)
        )
    }
}

/// A slot of the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    /// The owning region, `None` for the root and for detached nodes.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The node payload.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

/// Arena holding the block graph and region tree of one method.
///
/// Created by [`crate::blocks::GraphBuilder`], mutated through the block and region
/// operations, reordered by [`crate::blocks::repartition`] and finally consumed by
/// [`crate::blocks::CodeGenerator`].
///
/// A `MethodBlocks` is [`Send`]; independent methods can be processed on different threads,
/// but a single tree is never shared.
#[derive(Debug, Clone)]
pub struct MethodBlocks {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Default for MethodBlocks {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBlocks {
    /// Creates an arena containing only an empty method scope.
    #[must_use]
    pub fn new() -> Self {
        MethodBlocks {
            nodes: vec![Some(Node {
                parent: None,
                kind: NodeKind::MethodScope(Scope::default()),
            })],
            root: NodeId::new(0),
        }
    }

    /// The method scope at the root of the region tree.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(Node { parent: None, kind }));
        id
    }

    /// Empties the slot of a node; its handle becomes invalid.
    pub(crate) fn release(&mut self, id: NodeId) -> Result<Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(Error::InvalidHandle(id))
    }

    /// Returns `true` if `id` names a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    /// Number of live nodes, the root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Looks up a live node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for removed or unknown handles.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle(id))
    }

    /// The owning region of a node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for removed or unknown handles.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    /// Returns `true` if `id` names a live block.
    #[must_use]
    pub fn is_block(&self, id: NodeId) -> bool {
        self.node(id).is_ok_and(|node| node.kind.is_block())
    }

    /// Looks up a live block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `id` doesn't name a live block.
    pub fn block(&self, id: NodeId) -> Result<&Block> {
        match &self.node(id)?.kind {
            NodeKind::Block(block) => Ok(block),
            _ => Err(Error::InvalidHandle(id)),
        }
    }

    pub(crate) fn block_mut(&mut self, id: NodeId) -> Result<&mut Block> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Block(block) => Ok(block),
            _ => Err(Error::InvalidHandle(id)),
        }
    }

    /// The ordered child list of a region. For a `ProtectedRegion` this is the try body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] for blocks and region handlers, which have no
    /// child list.
    pub fn children(&self, scope: NodeId) -> Result<&[NodeId]> {
        match &self.node(scope)?.kind {
            NodeKind::MethodScope(s) | NodeKind::FilterScope(s) | NodeKind::HandlerScope(s) => {
                Ok(&s.children)
            }
            NodeKind::ProtectedRegion(p) => Ok(&p.children),
            kind => Err(Error::InvalidRegionShape(format!(
                "{} {scope} has no child list",
                kind.name()
            ))),
        }
    }

    pub(crate) fn children_mut(&mut self, scope: NodeId) -> Result<&mut Vec<NodeId>> {
        match &mut self.node_mut(scope)?.kind {
            NodeKind::MethodScope(s) | NodeKind::FilterScope(s) | NodeKind::HandlerScope(s) => {
                Ok(&mut s.children)
            }
            NodeKind::ProtectedRegion(p) => Ok(&mut p.children),
            kind => Err(Error::InvalidRegionShape(format!(
                "{} {scope} has no child list",
                kind.name()
            ))),
        }
    }

    /// The entry (first child) of a region, `None` if it's empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] if `scope` has no child list.
    pub fn entry(&self, scope: NodeId) -> Result<Option<NodeId>> {
        Ok(self.children(scope)?.first().copied())
    }

    /// The handlers of a protected region, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] if `protected` isn't a `ProtectedRegion`.
    pub fn handlers(&self, protected: NodeId) -> Result<&[NodeId]> {
        match &self.node(protected)?.kind {
            NodeKind::ProtectedRegion(p) => Ok(&p.handlers),
            kind => Err(Error::InvalidRegionShape(format!(
                "{} {protected} is not a protected region",
                kind.name()
            ))),
        }
    }

    /// Looks up a region handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `id` doesn't name a live `RegionHandler`.
    pub fn region_handler(&self, id: NodeId) -> Result<&RegionHandler> {
        match &self.node(id)?.kind {
            NodeKind::RegionHandler(handler) => Ok(handler),
            _ => Err(Error::InvalidHandle(id)),
        }
    }

    /// Every node directly owned by `id`: children, then handlers for a protected region;
    /// filter then handler scope for a region handler; nothing for a block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for removed or unknown handles.
    pub fn owned(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(match &self.node(id)?.kind {
            NodeKind::Block(_) => Vec::new(),
            NodeKind::MethodScope(s) | NodeKind::FilterScope(s) | NodeKind::HandlerScope(s) => {
                s.children.clone()
            }
            NodeKind::ProtectedRegion(p) => {
                p.children.iter().chain(&p.handlers).copied().collect()
            }
            NodeKind::RegionHandler(h) => h.filter.iter().copied().chain([h.handler]).collect(),
        })
    }

    /// All nodes below `id` in layout order (pre-order, try bodies before their handlers),
    /// not including `id` itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if a handle on the way is stale.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.owned(id)?.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.owned(node)?.into_iter().rev());
        }
        Ok(result)
    }

    /// Every block of the method in layout order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if a handle in the tree is stale.
    pub fn all_blocks(&self) -> Result<Vec<NodeId>> {
        Ok(self
            .descendants(self.root)?
            .into_iter()
            .filter(|&id| self.is_block(id))
            .collect())
    }

    /// Every region with a child list (root included) in layout order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if a handle in the tree is stale.
    pub fn regions(&self) -> Result<Vec<NodeId>> {
        let mut regions = vec![self.root];
        for id in self.descendants(self.root)? {
            if self.node(id)?.kind.has_children() {
                regions.push(id);
            }
        }
        Ok(regions)
    }

    /// Returns `true` if `ancestor` is `id` or one of its parents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the parent chain contains a stale handle.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> Result<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(true);
            }
            current = self.parent(node)?;
        }
        Ok(false)
    }

    /// Checks every structural invariant of the tree.
    ///
    /// - every non-root node is listed exactly once by the region its `parent` names,
    ///   and every listed node names that region as its parent
    /// - `sources` of every block is exactly the multiset of edges pointing at it
    /// - every protected region has at least one handler
    /// - an edge into a region other than the source's own or an enclosing one enters it at
    ///   its entry, and never enters a filter or handler
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`], [`Error::DanglingEdge`] or
    /// [`Error::InvalidRegionShape`] describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        if self.node(self.root)?.parent.is_some() {
            return Err(Error::OwnershipViolation {
                node: self.root,
                message: "root has a parent".to_string(),
            });
        }

        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let id = NodeId::new(index);

            for child in self.owned(id)? {
                if self.parent(child)? != Some(id) {
                    return Err(Error::OwnershipViolation {
                        node: child,
                        message: format!("listed by {id} but parent is {:?}", self.parent(child)?),
                    });
                }
            }

            if id == self.root {
                continue;
            }
            let Some(parent) = node.parent else {
                return Err(Error::OwnershipViolation {
                    node: id,
                    message: "detached node left in the arena".to_string(),
                });
            };
            let listed = self.owned(parent)?.iter().filter(|&&c| c == id).count();
            if listed != 1 {
                return Err(Error::OwnershipViolation {
                    node: id,
                    message: format!("listed {listed} times by its parent {parent}"),
                });
            }

            if let NodeKind::ProtectedRegion(p) = &node.kind {
                if p.handlers.is_empty() {
                    return Err(Error::InvalidRegionShape(format!(
                        "protected region {id} has no handlers"
                    )));
                }
            }
        }

        self.verify_edges()
    }

    fn verify_edges(&self) -> Result<()> {
        let mut edges: FxHashMap<(NodeId, NodeId), isize> = FxHashMap::default();
        for source in self.all_blocks()? {
            let block = self.block(source)?;
            for target in block.successors() {
                if !self.is_block(target) {
                    return Err(Error::DanglingEdge {
                        from: source,
                        target,
                    });
                }
                *edges.entry((source, target)).or_default() += 1;
                self.check_region_entry(source, target)?;
            }
        }
        for target in self.all_blocks()? {
            for &source in self.block(target)?.sources() {
                *edges.entry((source, target)).or_default() -= 1;
            }
        }

        match edges.into_iter().find(|&(_, count)| count != 0) {
            Some(((from, target), _)) => Err(Error::DanglingEdge { from, target }),
            None => Ok(()),
        }
    }

    pub(crate) fn check_region_entry(&self, source: NodeId, target: NodeId) -> Result<()> {
        let Some(source_scope) = self.parent(source)? else {
            return Ok(());
        };

        let mut current = target;
        while let Some(scope) = self.parent(current)? {
            if self.is_ancestor_or_self(scope, source_scope)? {
                return Ok(());
            }
            let entered_at_entry = match &self.node(scope)?.kind {
                NodeKind::ProtectedRegion(_) => self.entry(scope)? == Some(current),
                _ => false,
            };
            if !entered_at_entry {
                return Err(Error::InvalidRegionShape(format!(
                    "edge {source} -> {target} enters {} {scope} at {current}",
                    self.node(scope)?.kind.name()
                )));
            }
            current = scope;
        }
        Ok(())
    }
}
