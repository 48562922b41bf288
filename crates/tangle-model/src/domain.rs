//! Domain-aware topological ordering.
//!
//! Before sorting, every edge is classified by [`DomainEdge::role`]:
//!
//! | relationship                         | role      |
//! |--------------------------------------|-----------|
//! | to-many, or nullable to-one          | unlink    |
//! | required cascade (containment)       | reverse   |
//! | inheritance (unlabelled)             | reverse   |
//! | anything else                        | keep      |
//!
//! Self-loops and supertype loops are stripped first. After the sort the
//! journal is replayed, so the graph again reflects the true model while
//! keeping the new order ids.
//!
//! With edges pointing from the referencing vertex to the referenced one,
//! ascending order id is a safe *deletion* order; creation runs the other
//! way.

#![allow(clippy::module_name_repetitions)]

use tangle_graph::{CyclePolicy, Edge, EdgeId, Graph, GraphError, TopoOrder, Vertex, topological_sort};
use tracing::{debug, instrument};

/// How an edge takes part in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingRole {
    Keep,
    Unlink,
    Reverse,
}

/// Edge payload that knows its ordering role and how to flip itself.
pub trait DomainEdge: Edge + Sized {
    fn role(&self) -> OrderingRole;

    /// Payload for the reversed edge.
    #[must_use]
    fn flipped(&self) -> Self;
}

/// Sort with the domain pre-pass and restore afterwards, even on failure.
#[instrument(skip(graph))]
pub fn domain_sort<V: Vertex, E: DomainEdge>(
    graph: &mut Graph<V, E>,
    policy: CyclePolicy,
) -> Result<TopoOrder, GraphError> {
    let sorted = prepare(graph).and_then(|()| topological_sort(graph, policy));
    graph.restore()?;
    sorted
}

fn prepare<V: Vertex, E: DomainEdge>(graph: &mut Graph<V, E>) -> Result<(), GraphError> {
    let loops = graph.unlink_self_loops()?;
    let supertype_loops = graph.unlink_supertype_loops()?;

    let edges: Vec<EdgeId> = graph.edges().map(|(edge, _)| edge).collect();
    let (mut unlinked, mut reversed) = (0usize, 0usize);
    for edge in edges {
        let Some(role) = graph.edge(edge).map(DomainEdge::role) else {
            continue;
        };
        match role {
            OrderingRole::Keep => {}
            OrderingRole::Unlink => {
                graph.unlink_edge(edge)?;
                unlinked += 1;
            }
            OrderingRole::Reverse => {
                graph.reverse_edge(edge, DomainEdge::flipped)?;
                reversed += 1;
            }
        }
    }
    debug!(loops, supertype_loops, unlinked, reversed, "domain pre-pass");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_graph::START;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Rel {
        name: Option<&'static str>,
        role: OrderingRole,
    }

    impl Edge for Rel {
        fn label(&self) -> Option<&str> {
            self.name
        }
    }

    impl DomainEdge for Rel {
        fn role(&self) -> OrderingRole {
            self.role
        }

        fn flipped(&self) -> Self {
            self.clone()
        }
    }

    const fn rel(name: &'static str, role: OrderingRole) -> Rel {
        Rel {
            name: Some(name),
            role,
        }
    }

    #[test]
    fn unlinked_edges_do_not_constrain_and_come_back() {
        let mut graph: Graph<String, Rel> = Graph::new();
        let a = graph.add_vertex("A".into());
        let b = graph.add_vertex("B".into());
        graph.add_edge(a, b, rel("ab", OrderingRole::Keep)).expect("ab");
        graph.add_edge(b, a, rel("ba", OrderingRole::Unlink)).expect("ba");
        let before = graph.fingerprint();

        domain_sort(&mut graph, CyclePolicy::Strict).expect("sort");
        assert_eq!(graph.id(a), Some(START));
        assert_eq!(graph.fingerprint(), before);
        assert!(graph.journal().is_empty());
    }

    #[test]
    fn reversed_edges_flip_the_order() {
        let mut graph: Graph<String, Rel> = Graph::new();
        let a = graph.add_vertex("A".into());
        let b = graph.add_vertex("B".into());
        graph.add_edge(a, b, rel("ab", OrderingRole::Reverse)).expect("ab");
        domain_sort(&mut graph, CyclePolicy::Strict).expect("sort");
        assert!(graph.id(b) < graph.id(a));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn failure_still_restores() {
        let mut graph: Graph<String, Rel> = Graph::new();
        let a = graph.add_vertex("A".into());
        let b = graph.add_vertex("B".into());
        graph.add_edge(a, b, rel("ab", OrderingRole::Keep)).expect("ab");
        graph.add_edge(b, a, rel("ba", OrderingRole::Keep)).expect("ba");
        graph.add_edge(a, a, rel("aa", OrderingRole::Keep)).expect("aa");
        let before = graph.fingerprint();

        let err = domain_sort(&mut graph, CyclePolicy::Strict).expect_err("cycle");
        assert!(matches!(err, GraphError::Cycle(_)));
        assert_eq!(graph.fingerprint(), before);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut graph: Graph<String, Rel> = Graph::new();
        let a = graph.add_vertex("A".into());
        graph.add_edge(a, a, rel("parent", OrderingRole::Keep)).expect("aa");
        let sorted = domain_sort(&mut graph, CyclePolicy::Strict).expect("sort");
        assert_eq!(sorted.order, vec![a]);
        assert_eq!(graph.edge_count(), 1);
    }
}
