//! Service dependency graph: who calls whom in the mesh.
//!
//! Edges are stored in call direction (`start -> end`); upstream questions are
//! answered by walking incoming edges, which gives the reverse adjacency
//! `graph[end] = { start | start calls end }` without a second copy of the data.
//! The graph is only ever constructed through [`DependencyGraph::build`] and
//! exposes no mutation afterwards.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::types::{Edge, ServiceNode};

/// Transitive set of callers of a fault target.
pub type UpstreamSet = BTreeSet<ServiceNode>;

/// Immutable call graph of the mesh.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ServiceNode, ()>,
    name_index: HashMap<ServiceNode, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a sequence of call edges.
    ///
    /// Self-loops are kept and duplicate edges collapse into one.
    pub fn build<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = &'a Edge>,
    {
        let mut graph = Self::default();
        for edge in edges {
            let start = graph.intern(&edge.start);
            let end = graph.intern(&edge.end);
            graph.graph.update_edge(start, end, ());
        }
        graph
    }

    fn intern(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.name_index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.name_index.insert(name.to_string(), idx);
        idx
    }

    /// Direct callers of `target`. Unknown targets have no callers.
    pub fn upstream_of(&self, target: &str) -> BTreeSet<ServiceNode> {
        let Some(&idx) = self.name_index.get(target) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Whether `name` appears as either end of any edge.
    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// All services seen while building, in sorted order.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.graph.node_weights().map(String::as_str).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Every service with a call path of any length into `target`.
///
/// The visited guard is checked before a node is queued, so a service reachable
/// along several paths is expanded once, and call cycles terminate. `target`
/// itself only appears in the result when it sits on such a cycle.
pub fn resolve_transitive_upstream(graph: &DependencyGraph, target: &str) -> UpstreamSet {
    let mut visited: HashSet<ServiceNode> = HashSet::new();
    let mut frontier: VecDeque<ServiceNode> = VecDeque::new();

    for caller in graph.upstream_of(target) {
        if visited.insert(caller.clone()) {
            frontier.push_back(caller);
        }
    }

    while let Some(node) = frontier.pop_front() {
        for caller in graph.upstream_of(&node) {
            if visited.insert(caller.clone()) {
                frontier.push_back(caller);
            }
        }
    }

    visited.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(s, e)| Edge::new(*s, *e)).collect()
    }

    fn set(names: &[&str]) -> UpstreamSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build(&Vec::<Edge>::new());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.upstream_of("Z").is_empty());
    }

    #[test]
    fn test_upstream_of_is_direct_only() {
        let graph = DependencyGraph::build(&edges(&[("A", "B"), ("B", "C"), ("X", "C")]));
        assert_eq!(graph.upstream_of("C"), set(&["B", "X"]));
        assert_eq!(graph.upstream_of("B"), set(&["A"]));
        assert!(graph.upstream_of("A").is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = DependencyGraph::build(&edges(&[("A", "B"), ("A", "B"), ("A", "B")]));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.upstream_of("B"), set(&["A"]));
    }

    #[test]
    fn test_self_loop_is_kept() {
        let graph = DependencyGraph::build(&edges(&[("A", "A")]));
        assert_eq!(graph.upstream_of("A"), set(&["A"]));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let graph = DependencyGraph::build(&edges(&[("auth", "db"), ("Auth", "db")]));
        assert_eq!(graph.upstream_of("db"), set(&["Auth", "auth"]));
        assert!(graph.upstream_of("DB").is_empty());
    }

    #[test]
    fn test_resolve_chain_and_fan_in() {
        let graph = DependencyGraph::build(&edges(&[("A", "B"), ("B", "C"), ("X", "C")]));
        assert_eq!(resolve_transitive_upstream(&graph, "C"), set(&["A", "B", "X"]));
    }

    #[test]
    fn test_resolve_empty_graph() {
        let graph = DependencyGraph::build(&Vec::<Edge>::new());
        assert!(resolve_transitive_upstream(&graph, "Z").is_empty());
    }

    #[test]
    fn test_resolve_target_without_callers() {
        let graph = DependencyGraph::build(&edges(&[("frontend", "cart")]));
        assert!(resolve_transitive_upstream(&graph, "frontend").is_empty());
    }

    #[test]
    fn test_resolve_terminates_on_cycle() {
        // A -> B -> C -> A, and D -> C
        let graph = DependencyGraph::build(&edges(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "A"),
            ("D", "C"),
        ]));
        assert_eq!(
            resolve_transitive_upstream(&graph, "B"),
            set(&["A", "B", "C", "D"])
        );
    }

    #[test]
    fn test_resolve_diamond_visits_shared_ancestor_once() {
        // root calls both left and right, which both call sink
        let graph = DependencyGraph::build(&edges(&[
            ("root", "left"),
            ("root", "right"),
            ("left", "sink"),
            ("right", "sink"),
        ]));
        assert_eq!(
            resolve_transitive_upstream(&graph, "sink"),
            set(&["left", "right", "root"])
        );
    }

    #[test]
    fn test_resolve_excludes_downstream() {
        let graph = DependencyGraph::build(&edges(&[
            ("frontend", "checkout"),
            ("checkout", "payment"),
            ("checkout", "email"),
        ]));
        assert_eq!(
            resolve_transitive_upstream(&graph, "payment"),
            set(&["checkout", "frontend"])
        );
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let input = edges(&[("A", "B"), ("B", "C"), ("X", "C"), ("C", "A")]);
        let first = DependencyGraph::build(&input);
        let second = DependencyGraph::build(&input);
        for node in first.nodes() {
            assert_eq!(first.upstream_of(node), second.upstream_of(node));
        }
        assert_eq!(first.nodes(), second.nodes());
    }
}
