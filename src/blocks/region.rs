//! Region nodes and the operations that reshape the region tree.
//!
//! Regions mirror the nesting of the exception handler table:
//!
//! ```text
//! MethodScope
//! ├── Block
//! ├── ProtectedRegion           try body = children
//! │   ├── Block ...
//! │   └── handlers
//! │       └── RegionHandler
//! │           ├── FilterScope   (filter clauses only)
//! │           └── HandlerScope
//! └── Block
//! ```
//!
//! Child lists hold only blocks and protected regions; the first child is the region's
//! entry and is the only child that code outside the region may branch to.

use rustc_hash::FxHashSet;

use crate::{
    blocks::{MethodBlocks, NodeKind},
    metadata::{method::ExceptionHandlerFlags, token::Token},
    utils::graph::NodeId,
    Error, Result,
};

/// Maximum number of redirect rounds of [`MethodBlocks::merge_nop_blocks`].
const MAX_NOP_ROUNDS: usize = 10;

/// A plain ordered child list (method, filter and handler scopes).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub(crate) children: Vec<NodeId>,
}

/// A try region: its body and the clauses that protect it.
#[derive(Debug, Clone, Default)]
pub struct ProtectedRegion {
    pub(crate) children: Vec<NodeId>,
    pub(crate) handlers: Vec<NodeId>,
}

/// One clause of a try region.
#[derive(Debug, Clone)]
pub struct RegionHandler {
    pub(crate) filter: Option<NodeId>,
    pub(crate) handler: NodeId,
    pub(crate) flags: ExceptionHandlerFlags,
    pub(crate) catch_type: Option<Token>,
}

impl RegionHandler {
    /// The filter scope of a filter clause.
    #[must_use]
    pub fn filter(&self) -> Option<NodeId> {
        self.filter
    }

    /// The handler scope.
    #[must_use]
    pub fn handler(&self) -> NodeId {
        self.handler
    }

    /// The clause kind.
    #[must_use]
    pub fn flags(&self) -> ExceptionHandlerFlags {
        self.flags
    }

    /// The class caught by a typed clause.
    #[must_use]
    pub fn catch_type(&self) -> Option<Token> {
        self.catch_type
    }

    /// Returns `true` if the runtime pushes the exception object when the handler starts.
    #[must_use]
    pub fn pushes_exception(&self) -> bool {
        self.flags.is_empty() || self.flags.contains(ExceptionHandlerFlags::FILTER)
    }
}

impl MethodBlocks {
    /// Allocates a detached protected region with no body and no handlers.
    pub fn new_protected_region(&mut self) -> NodeId {
        self.alloc(NodeKind::ProtectedRegion(ProtectedRegion::default()))
    }

    /// Allocates a detached, empty filter scope.
    pub fn new_filter_scope(&mut self) -> NodeId {
        self.alloc(NodeKind::FilterScope(Scope::default()))
    }

    /// Allocates a detached, empty handler scope.
    pub fn new_handler_scope(&mut self) -> NodeId {
        self.alloc(NodeKind::HandlerScope(Scope::default()))
    }

    /// Allocates a region handler that takes ownership of `filter` and `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] if the scopes have the wrong kind and
    /// [`Error::OwnershipViolation`] if either is already owned.
    pub fn new_region_handler(
        &mut self,
        filter: Option<NodeId>,
        handler: NodeId,
        flags: ExceptionHandlerFlags,
        catch_type: Option<Token>,
    ) -> Result<NodeId> {
        if let Some(filter) = filter {
            self.expect_detached(filter, |kind| matches!(kind, NodeKind::FilterScope(_)))?;
        }
        self.expect_detached(handler, |kind| matches!(kind, NodeKind::HandlerScope(_)))?;

        let id = self.alloc(NodeKind::RegionHandler(RegionHandler {
            filter,
            handler,
            flags,
            catch_type,
        }));
        if let Some(filter) = filter {
            self.set_parent(filter, Some(id))?;
        }
        self.set_parent(handler, Some(id))?;
        Ok(id)
    }

    /// Appends a region handler to the handler list of `protected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionShape`] for wrong node kinds and
    /// [`Error::OwnershipViolation`] if `handler` is already owned.
    pub fn add_handler(&mut self, protected: NodeId, handler: NodeId) -> Result<()> {
        self.expect_detached(handler, |kind| matches!(kind, NodeKind::RegionHandler(_)))?;
        match &mut self.node_mut(protected)?.kind {
            NodeKind::ProtectedRegion(region) => region.handlers.push(handler),
            kind => {
                return Err(Error::InvalidRegionShape(format!(
                    "{} {protected} cannot own handlers",
                    kind.name()
                )))
            }
        }
        self.set_parent(handler, Some(protected))
    }

    /// Appends `child` to the child list of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `child` already has a parent and
    /// [`Error::InvalidRegionShape`] if `scope` can't own children or `child` is not a block
    /// or protected region.
    pub fn add(&mut self, scope: NodeId, child: NodeId) -> Result<()> {
        let index = self.children(scope)?.len();
        self.insert_child(scope, index, child)
    }

    pub(crate) fn insert_child(&mut self, scope: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.children(scope)?;
        self.expect_detached(child, |kind| {
            matches!(kind, NodeKind::Block(_) | NodeKind::ProtectedRegion(_))
        })?;
        self.children_mut(scope)?.insert(index, child);
        self.set_parent(child, Some(scope))
    }

    fn expect_detached(&self, id: NodeId, kind_ok: impl Fn(&NodeKind) -> bool) -> Result<()> {
        let node = self.node(id)?;
        if id == self.root() || node.parent.is_some() {
            return Err(Error::OwnershipViolation {
                node: id,
                message: format!("already owned by {:?}", node.parent),
            });
        }
        if !kind_ok(&node.kind) {
            return Err(Error::InvalidRegionShape(format!(
                "{} {id} cannot be placed here",
                node.kind.name()
            )));
        }
        Ok(())
    }

    /// Maps `node` to the direct child of `scope` that contains it.
    ///
    /// Returns `node` itself if it is a direct child, the enclosing direct child if it is
    /// nested deeper, and `None` if it lies outside `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the ancestor chain holds a stale handle.
    pub fn nearest_child(&self, scope: NodeId, node: NodeId) -> Result<Option<NodeId>> {
        let mut current = node;
        while let Some(parent) = self.parent(current)? {
            if parent == scope {
                return Ok(Some(current));
            }
            current = parent;
        }
        Ok(None)
    }

    /// Removes the blocks of `scope` that became unreachable, starting from `seeds`.
    ///
    /// A candidate without sources (other than the entry) is disconnected and removed, and its
    /// successors in the same scope become candidates in turn. Returns the number of removed
    /// blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if a candidate isn't a child of `scope` and
    /// [`Error::InvalidRegionShape`] if a seed isn't a block.
    pub fn remove_dead(&mut self, scope: NodeId, seeds: &[NodeId]) -> Result<usize> {
        let entry = self.entry(scope)?;
        let mut candidates: Vec<NodeId> = seeds.iter().rev().copied().collect();
        let mut removed = 0;

        while let Some(candidate) = candidates.pop() {
            if !self.contains(candidate) || Some(candidate) == entry {
                continue;
            }
            if !self.is_block(candidate) {
                return Err(Error::InvalidRegionShape(format!(
                    "{} {candidate} can't be removed as dead code",
                    self.node(candidate)?.kind.name()
                )));
            }
            let block = self.block(candidate)?;
            if !block.sources().is_empty() {
                continue;
            }
            if self.parent(candidate)? != Some(scope) {
                return Err(Error::OwnershipViolation {
                    node: candidate,
                    message: format!("dead block is not a child of {scope}"),
                });
            }

            for successor in block.successors() {
                if self.parent(successor)? == Some(scope) {
                    candidates.push(successor);
                }
            }
            self.detach_child(scope, candidate)?;
            self.disconnect_from_fallthrough_and_targets(candidate)?;
            self.release(candidate)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Runs [`MethodBlocks::remove_dead`] seeded with every block child of `scope`.
    ///
    /// # Errors
    ///
    /// See [`MethodBlocks::remove_dead`].
    pub fn remove_all_dead(&mut self, scope: NodeId) -> Result<usize> {
        let seeds: Vec<NodeId> = self
            .children(scope)?
            .iter()
            .copied()
            .filter(|&child| self.is_block(child))
            .collect();
        self.remove_dead(scope, &seeds)
    }

    pub(crate) fn detach_child(&mut self, scope: NodeId, child: NodeId) -> Result<usize> {
        let children = self.children_mut(scope)?;
        let index = children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| Error::OwnershipViolation {
                node: child,
                message: format!("missing from the child list of {scope}"),
            })?;
        children.remove(index);
        self.set_parent(child, None)?;
        Ok(index)
    }

    /// Merges every block of `scope` into its predecessor where that is possible, until no
    /// merge applies. Returns the number of merges.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`MethodBlocks::merge`].
    pub fn merge_blocks(&mut self, scope: NodeId) -> Result<usize> {
        let mut merged = 0;
        let mut index = 0;
        while let Some(&child) = self.children(scope)?.get(index) {
            let next = self
                .block(child)
                .ok()
                .and_then(|block| block.only_target());
            match next {
                Some(next) if self.can_merge(child, next)? => {
                    self.merge(child, next)?;
                    merged += 1;
                    // the absorbed block may have preceded this one
                    index = self
                        .children(scope)?
                        .iter()
                        .position(|&c| c == child)
                        .unwrap_or(0);
                }
                _ => index += 1,
            }
        }
        Ok(merged)
    }

    /// Routes edges entering chains of `nop`-only blocks straight to the block the chain falls
    /// into, then removes the `nop` blocks that became unreachable. Chains that loop back on
    /// themselves are left alone. Returns the number of redirected
    /// edges.
    ///
    /// # Errors
    ///
    /// Propagates edge bookkeeping failures.
    pub fn merge_nop_blocks(&mut self) -> Result<usize> {
        let mut redirected = 0;
        for _ in 0..MAX_NOP_ROUNDS {
            let mut changed = false;
            for nop_block in self.all_blocks()? {
                let Some(next) = self.nop_chain_end(nop_block)? else {
                    continue;
                };
                let mut sources = self.block(nop_block)?.sources().to_vec();
                sources.sort_unstable();
                sources.dedup();
                for source in sources {
                    // upstream nop blocks go dead once their own sources are redirected
                    if source == next || self.nop_redirect_target(source)?.is_some() {
                        continue;
                    }
                    let count = self.redirect_edges(source, nop_block, next)?;
                    redirected += count;
                    changed |= count > 0;
                }
            }
            if !changed {
                break;
            }
        }

        let mut dead: Vec<(NodeId, NodeId)> = Vec::new();
        for block in self.all_blocks()? {
            let data = self.block(block)?;
            if data.is_nop_block() && data.sources().is_empty() {
                if let Some(parent) = self.parent(block)? {
                    dead.push((parent, block));
                }
            }
        }
        for (parent, block) in dead {
            self.remove_dead(parent, &[block])?;
        }
        Ok(redirected)
    }

    fn nop_redirect_target(&self, block: NodeId) -> Result<Option<NodeId>> {
        let data = self.block(block)?;
        let (true, Some(next)) = (data.is_nop_block(), data.fallthrough()) else {
            return Ok(None);
        };
        let parent = self.parent(block)?;
        let eligible = next != block
            && self.parent(next)? == parent
            && match parent {
                Some(scope) => self.entry(scope)? != Some(block),
                None => false,
            };
        Ok(eligible.then_some(next))
    }

    /// Follows redirectable `nop` blocks from `block` to the first block that isn't one.
    /// `None` if `block` isn't redirectable or the chain runs in a circle.
    fn nop_chain_end(&self, block: NodeId) -> Result<Option<NodeId>> {
        let mut seen = FxHashSet::default();
        let mut current = block;
        while let Some(next) = self.nop_redirect_target(current)? {
            if !seen.insert(current) {
                return Ok(None);
            }
            current = next;
        }
        Ok((current != block).then_some(current))
    }

    fn redirect_edges(&mut self, source: NodeId, from: NodeId, to: NodeId) -> Result<usize> {
        let mut count = 0;
        if self.block(source)?.fallthrough() == Some(from) {
            self.set_fallthrough(source, Some(to))?;
            count += 1;
        }
        let slots: Vec<usize> = self
            .block(source)?
            .targets()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter(|&(_, &target)| target == from)
            .map(|(index, _)| index)
            .collect();
        for index in slots {
            self.set_target(source, index, to)?;
            count += 1;
        }
        Ok(count)
    }

    /// Dissolves the try region `protected`, a direct child of `scope`.
    ///
    /// The try body takes the region's place in `scope`; the handlers and everything they own
    /// are deleted. Nothing is changed unless no block outside the handlers still has an edge
    /// into them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `protected` is not a child of `scope`,
    /// [`Error::InvalidRegionShape`] if it's not a protected region, and
    /// [`Error::UnsafeRegionRemoval`] if handler code is still referenced.
    pub fn splice_out(&mut self, scope: NodeId, protected: NodeId) -> Result<()> {
        if self.parent(protected)? != Some(scope) {
            return Err(Error::OwnershipViolation {
                node: protected,
                message: format!("not a child of {scope}"),
            });
        }

        let mut handler_nodes = Vec::new();
        for &handler in self.handlers(protected)? {
            handler_nodes.push(handler);
            handler_nodes.extend(self.descendants(handler)?);
        }
        let doomed: FxHashSet<NodeId> = handler_nodes.iter().copied().collect();

        for block in self.all_blocks()? {
            if doomed.contains(&block) {
                continue;
            }
            if self
                .block(block)?
                .successors()
                .iter()
                .any(|target| doomed.contains(target))
            {
                return Err(Error::UnsafeRegionRemoval {
                    region: protected,
                    referrer: block,
                });
            }
        }

        for &node in &handler_nodes {
            if self.is_block(node) {
                self.disconnect_from_fallthrough_and_targets(node)?;
            }
        }
        for node in handler_nodes {
            self.release(node)?;
        }

        let index = self.detach_child(scope, protected)?;
        let body = std::mem::take(self.children_mut(protected)?);
        for (offset, child) in body.into_iter().enumerate() {
            self.set_parent(child, None)?;
            self.insert_child(scope, index + offset, child)?;
        }
        self.release(protected)?;
        Ok(())
    }
}
