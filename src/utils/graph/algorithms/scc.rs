//! Strongly Connected Components (SCC) using Tarjan's algorithm.
//!
//! A strongly connected component is a maximal set of vertices such that there is a path from
//! every vertex to every other vertex in the set. In a control-flow graph every SCC with more
//! than one member (or with a self-loop) is a loop.
//!
//! The implementation is iterative: each DFS activation is an explicit [`VisitFrame`] that
//! remembers which successor to look at next, so visiting a method with tens of thousands of
//! blocks never touches the native stack. [`TarjanState`] can be driven root by root, which the
//! block scheduler relies on to control the order in which components are discovered.

use crate::utils::graph::{NodeId, Successors};

/// Computes the strongly connected components of a directed graph.
///
/// Roots are tried in ascending node order.
///
/// # Returns
///
/// A vector of SCCs, where each SCC is a vector of `NodeId`s. The SCCs are returned in
/// **reverse topological order** (if there's an edge from SCC A to SCC B, then A appears after
/// B in the result). The members of each SCC are listed with the SCC root last.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V + E)
pub fn strongly_connected_components<G>(graph: &G) -> Vec<Vec<NodeId>>
where
    G: Successors,
{
    let node_count = graph.node_count();
    if node_count == 0 {
        return Vec::new();
    }

    let mut state = TarjanState::new(node_count);
    let mut sccs = Vec::new();
    for node in graph.node_ids() {
        if !state.is_visited(node) {
            sccs.extend(state.visit(graph, node));
        }
    }

    sccs
}

/// One suspended activation of the Tarjan DFS.
struct VisitFrame {
    node: NodeId,
    successors: Vec<NodeId>,
    next: usize,
}

/// Resumable state of Tarjan's algorithm.
///
/// The state survives across calls to [`TarjanState::visit`], so nodes discovered from an
/// earlier root are never reported again.
pub struct TarjanState {
    /// Discovery index for each node (None if not yet visited)
    index: Vec<Option<usize>>,
    /// Lowlink value for each node
    lowlink: Vec<usize>,
    /// Whether a node is currently on the stack
    on_stack: Vec<bool>,
    /// The component stack
    stack: Vec<NodeId>,
    /// Current index counter
    current_index: usize,
}

impl TarjanState {
    /// Creates fresh state for a graph with `node_count` dense nodes.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self {
            index: vec![None; node_count],
            lowlink: vec![0; node_count],
            on_stack: vec![false; node_count],
            stack: Vec::new(),
            current_index: 0,
        }
    }

    /// Returns `true` if `node` was discovered by an earlier visit.
    #[must_use]
    pub fn is_visited(&self, node: NodeId) -> bool {
        self.index[node.index()].is_some()
    }

    /// Runs the DFS from `root` and returns the components completed by this visit.
    ///
    /// Components are returned in completion order; the members of each component are listed
    /// in the order they were popped off the component stack, i.e. the component root last.
    /// Visiting an already discovered root returns an empty list.
    pub fn visit<G: Successors>(&mut self, graph: &G, root: NodeId) -> Vec<Vec<NodeId>> {
        let mut sccs = Vec::new();
        if self.is_visited(root) {
            return sccs;
        }

        let mut frames = vec![self.enter(graph, root)];
        while let Some(frame) = frames.last_mut() {
            let v = frame.node.index();
            if let Some(&w) = frame.successors.get(frame.next) {
                frame.next += 1;
                match self.index[w.index()] {
                    None => {
                        let child = self.enter(graph, w);
                        frames.push(child);
                    }
                    Some(w_index) if self.on_stack[w.index()] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.node.index();
                self.lowlink[p] = self.lowlink[p].min(self.lowlink[v]);
            }

            if self.index[v] == Some(self.lowlink[v]) {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w.index()] = false;
                    scc.push(w);
                    if w.index() == v {
                        break;
                    }
                }
                sccs.push(scc);
            }
        }

        sccs
    }

    fn enter<G: Successors>(&mut self, graph: &G, node: NodeId) -> VisitFrame {
        let i = node.index();
        self.index[i] = Some(self.current_index);
        self.lowlink[i] = self.current_index;
        self.current_index += 1;
        self.stack.push(node);
        self.on_stack[i] = true;

        VisitFrame {
            node,
            successors: graph.successors(node).collect(),
            next: 0,
        }
    }
}
