//! Elementary circuit enumeration (Johnson).
//!
//! # Overview
//!
//! [`find_circuits`] visits vertices in order-id order. For each vertex `s`
//! it reports the self-loops on `s`, recomputes the strongly connected
//! components of the vertices from `s` onwards, and, if `s` sits in a
//! non-trivial component, runs the block/unblock search for every circuit
//! through `s` inside that component. `s` is then unlinked before moving on.
//!
//! Every circuit is reported exactly once, both as a vertex sequence and as
//! the edges walked. Parallel edges yield distinct circuits.
//!
//! The run unlinks edges through the journal. [`find_circuits`] leaves them
//! unlinked; [`Graph::circuits`] restores before returning.

#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeSet;
use std::fmt::Write as _;

use tracing::{debug, instrument};

use crate::error::GraphError;
use crate::graph::{Edge, EdgeId, Graph, Vertex, VertexId};
use crate::scc::strongly_connected;

/// One simple cycle.
///
/// `edges[i]` runs from `vertices[i]` to `vertices[(i + 1) % len]`; the
/// closing vertex is not repeated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Circuit {
    pub vertices: Vec<VertexId>,
    pub edges: Vec<EdgeId>,
}

impl Circuit {
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }
}

/// Render a circuit as `A -[name]-> B -[name]-> A`. Unlabelled edges render
/// as `-[^]->`.
#[must_use]
pub fn circuit_labels<V: Vertex, E: Edge>(graph: &Graph<V, E>, circuit: &Circuit) -> String {
    let label = |v: VertexId| graph.vertex(v).map_or_else(|| v.to_string(), Vertex::label);
    let mut out = String::new();
    for (vertex, edge) in circuit.vertices.iter().zip(&circuit.edges) {
        let name = graph.edge(*edge).and_then(Edge::label).unwrap_or("^");
        let _ = write!(out, "{} -[{name}]-> ", label(*vertex));
    }
    if let Some(&first) = circuit.vertices.first() {
        out.push_str(&label(first));
    }
    out
}

/// Enumerate every simple cycle of the linked graph.
///
/// Leaves the graph partially unlinked; call [`Graph::restore`] afterwards.
#[instrument(skip(graph), fields(vertices = graph.vertex_count(), edges = graph.edge_count()))]
pub fn find_circuits<V: Vertex, E: Edge>(graph: &mut Graph<V, E>) -> Result<Vec<Circuit>, GraphError> {
    let order = graph.vertices_by_id();
    let mut circuits = Vec::new();

    for (pos, &start) in order.iter().enumerate() {
        for edge in graph.edges_between(start, start) {
            circuits.push(Circuit {
                vertices: vec![start],
                edges: vec![edge],
            });
        }

        let components = strongly_connected(graph, &order[pos..])?;
        if let Some(component) = components.iter().find(|c| c.contains(&start)) {
            let before = circuits.len();
            circuits_through(graph, start, component, &mut circuits);
            debug!(
                start = %start,
                component = component.len(),
                found = circuits.len() - before,
                "searched component"
            );
        }

        graph.unlink_vertex(start)?;
    }

    Ok(circuits)
}

impl<V: Vertex, E: Edge> Graph<V, E> {
    /// Every simple cycle, with the graph restored afterwards.
    ///
    /// Restoring replays the whole journal, including mutations recorded
    /// before this call.
    pub fn circuits(&mut self) -> Result<Vec<Circuit>, GraphError> {
        let found = find_circuits(self);
        self.restore()?;
        found
    }
}

struct Frame {
    vertex: VertexId,
    edges: Vec<EdgeId>,
    cursor: usize,
    closed: bool,
}

/// Block/unblock search for circuits through `start` inside `component`.
fn circuits_through<V: Vertex, E: Edge>(
    graph: &Graph<V, E>,
    start: VertexId,
    component: &[VertexId],
    circuits: &mut Vec<Circuit>,
) {
    let n = graph.vertex_count();
    let mut inside = vec![false; n];
    for &v in component {
        inside[v.index()] = true;
    }
    let mut blocked = vec![false; n];
    let mut blocked_by: Vec<BTreeSet<VertexId>> = vec![BTreeSet::new(); n];

    let mut path_vertices = vec![start];
    let mut path_edges: Vec<EdgeId> = Vec::new();
    blocked[start.index()] = true;
    let mut frames = vec![Frame {
        vertex: start,
        edges: graph.out_edges(start).collect(),
        cursor: 0,
        closed: false,
    }];

    while let Some(frame) = frames.last_mut() {
        let v = frame.vertex;
        if let Some(&edge) = frame.edges.get(frame.cursor) {
            frame.cursor += 1;
            let Some(pair) = graph.endpoints(edge) else {
                continue;
            };
            let w = pair.end;
            if w == v || !inside[w.index()] {
                continue;
            }
            if w == start {
                let mut edges = path_edges.clone();
                edges.push(edge);
                circuits.push(Circuit {
                    vertices: path_vertices.clone(),
                    edges,
                });
                frame.closed = true;
            } else if !blocked[w.index()] {
                blocked[w.index()] = true;
                path_vertices.push(w);
                path_edges.push(edge);
                frames.push(Frame {
                    vertex: w,
                    edges: graph.out_edges(w).collect(),
                    cursor: 0,
                    closed: false,
                });
            }
            continue;
        }

        let closed = frame.closed;
        frames.pop();
        if closed {
            unblock(v, &mut blocked, &mut blocked_by);
        } else {
            for edge in graph.out_edges(v) {
                if let Some(pair) = graph.endpoints(edge) {
                    if inside[pair.end.index()] && pair.end != v {
                        blocked_by[pair.end.index()].insert(v);
                    }
                }
            }
        }
        if let Some(parent) = frames.last_mut() {
            parent.closed |= closed;
            path_vertices.pop();
            path_edges.pop();
        }
    }
}

fn unblock(vertex: VertexId, blocked: &mut [bool], blocked_by: &mut [BTreeSet<VertexId>]) {
    let mut pending = vec![vertex];
    while let Some(v) = pending.pop() {
        if !blocked[v.index()] {
            continue;
        }
        blocked[v.index()] = false;
        pending.extend(std::mem::take(&mut blocked_by[v.index()]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Link;

    fn graph_of(names: &[&str], edges: &[(usize, usize, &str)]) -> (Graph<String, Link>, Vec<VertexId>) {
        let mut graph = Graph::new();
        let ids: Vec<VertexId> = names.iter().map(|n| graph.add_vertex((*n).to_string())).collect();
        for &(a, b, name) in edges {
            graph.add_edge(ids[a], ids[b], Link::named(name)).expect("edge");
        }
        (graph, ids)
    }

    #[test]
    fn triangle_has_one_circuit() {
        let (mut graph, ids) = graph_of(&["A", "B", "C"], &[(0, 1, "b"), (1, 2, "c"), (2, 0, "a")]);
        let circuits = graph.circuits().expect("circuits");
        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].vertices, ids);
        assert_eq!(circuit_labels(&graph, &circuits[0]), "A -[b]-> B -[c]-> C -[a]-> A");
    }

    #[test]
    fn self_loops_are_one_edge_circuits() {
        let (mut graph, ids) = graph_of(&["A", "B"], &[(0, 0, "me"), (0, 1, "b")]);
        let circuits = graph.circuits().expect("circuits");
        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].vertices, vec![ids[0]]);
        assert_eq!(circuit_labels(&graph, &circuits[0]), "A -[me]-> A");
    }

    #[test]
    fn parallel_edges_give_distinct_circuits() {
        let (mut graph, _) = graph_of(&["A", "B"], &[(0, 1, "x"), (0, 1, "y"), (1, 0, "back")]);
        let circuits = graph.circuits().expect("circuits");
        assert_eq!(circuits.len(), 2);
        assert_ne!(circuits[0].edges, circuits[1].edges);
    }

    #[test]
    fn complete_graph_on_four_vertices() {
        // K4 (directed, no self-loops) has 6 two-cycles, 8 three-cycles and
        // 6 four-cycles.
        let mut edges = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                if a != b {
                    edges.push((a, b, "e"));
                }
            }
        }
        let (mut graph, _) = graph_of(&["A", "B", "C", "D"], &edges);
        let circuits = graph.circuits().expect("circuits");
        assert_eq!(circuits.len(), 20);
    }

    #[test]
    fn circuits_restore_the_graph() {
        let (mut graph, _) = graph_of(
            &["A", "B", "C", "D"],
            &[(0, 1, "ab"), (1, 0, "ba"), (1, 2, "bc"), (2, 3, "cd"), (3, 1, "db"), (3, 3, "dd")],
        );
        let before = graph.fingerprint();
        let circuits = graph.circuits().expect("circuits");
        assert_eq!(circuits.len(), 3);
        assert_eq!(graph.fingerprint(), before);
        assert!(graph.journal().is_empty());
        graph.check_consistency().expect("consistent");
    }

    #[test]
    fn raw_finder_leaves_edges_unlinked_until_restore() {
        let (mut graph, _) = graph_of(&["A", "B"], &[(0, 1, "ab"), (1, 0, "ba")]);
        let circuits = find_circuits(&mut graph).expect("circuits");
        assert_eq!(circuits.len(), 1);
        assert_eq!(graph.edge_count(), 0);
        graph.restore().expect("restore");
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn circuit_edges_follow_the_vertex_sequence() {
        let (mut graph, _) = graph_of(
            &["A", "B", "C"],
            &[(0, 1, "ab"), (1, 2, "bc"), (2, 0, "ca"), (2, 1, "cb")],
        );
        for circuit in graph.circuits().expect("circuits") {
            let k = circuit.vertices.len();
            for (i, edge) in circuit.edges.iter().enumerate() {
                let pair = graph.endpoints(*edge).expect("linked after restore");
                assert_eq!(pair.start, circuit.vertices[i]);
                assert_eq!(pair.end, circuit.vertices[(i + 1) % k]);
            }
        }
    }
}
