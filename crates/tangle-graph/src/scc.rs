//! Strongly connected components (Tarjan).
//!
//! [`strongly_connected`] runs an iterative Tarjan search restricted to a
//! caller-supplied vertex set and reports the non-trivial components (two or
//! more vertices). As each component is discovered, every edge crossing its
//! boundary is unlinked through the journal, which isolates the component
//! for the circuit finder. Callers that only want the decomposition must
//! call [`Graph::restore`] afterwards.
//!
//! Components come back upstream first: if some vertex of component `B` is
//! reachable from component `A`, then `A` precedes `B`.

#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeSet;

use crate::error::GraphError;
use crate::graph::{Edge, EdgeId, Graph, Vertex, VertexId};

const UNVISITED: usize = usize::MAX;

struct Frame {
    vertex: VertexId,
    successors: Vec<VertexId>,
    cursor: usize,
}

/// Non-trivial strongly connected components among `vertices`, each sorted
/// by order id. Boundary edges of every reported component are unlinked.
pub fn strongly_connected<V: Vertex, E: Edge>(
    graph: &mut Graph<V, E>,
    vertices: &[VertexId],
) -> Result<Vec<Vec<VertexId>>, GraphError> {
    let n = graph.vertex_count();
    let mut member = vec![false; n];
    for &vertex in vertices {
        if vertex.index() >= n {
            return Err(GraphError::UnknownVertex(vertex));
        }
        member[vertex.index()] = true;
    }

    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<VertexId> = Vec::new();
    let mut counter = 0usize;
    let mut found: Vec<Vec<VertexId>> = Vec::new();

    for &root in vertices {
        if index[root.index()] != UNVISITED {
            continue;
        }
        index[root.index()] = counter;
        low[root.index()] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root.index()] = true;
        let mut frames = vec![Frame {
            vertex: root,
            successors: successors(graph, root, &member),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            let v = frame.vertex;
            let next = frame.successors.get(frame.cursor).copied();
            frame.cursor += 1;

            if let Some(w) = next {
                if index[w.index()] == UNVISITED {
                    index[w.index()] = counter;
                    low[w.index()] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w.index()] = true;
                    frames.push(Frame {
                        vertex: w,
                        successors: successors(graph, w, &member),
                        cursor: 0,
                    });
                } else if on_stack[w.index()] {
                    low[v.index()] = low[v.index()].min(index[w.index()]);
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.vertex.index();
                low[p] = low[p].min(low[v.index()]);
            }
            if low[v.index()] != index[v.index()] {
                continue;
            }

            let mut component = Vec::new();
            while let Some(w) = stack.pop() {
                on_stack[w.index()] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            if component.len() >= 2 {
                component.sort_by_key(|&w| graph.id(w));
                isolate(graph, &component)?;
                found.push(component);
            }
        }
    }

    // Tarjan completes sinks first.
    found.reverse();
    Ok(found)
}

fn successors<V: Vertex, E: Edge>(graph: &Graph<V, E>, vertex: VertexId, member: &[bool]) -> Vec<VertexId> {
    graph
        .out_edges(vertex)
        .filter_map(|edge| graph.endpoints(edge))
        .map(|pair| pair.end)
        .filter(|end| member[end.index()])
        .collect()
}

/// Unlink every edge with exactly one endpoint inside `component`.
fn isolate<V: Vertex, E: Edge>(graph: &mut Graph<V, E>, component: &[VertexId]) -> Result<(), GraphError> {
    let inside: BTreeSet<VertexId> = component.iter().copied().collect();
    let mut crossing: BTreeSet<EdgeId> = BTreeSet::new();
    for &vertex in component {
        for edge in graph.out_edges(vertex).chain(graph.in_edges(vertex)) {
            if let Some(pair) = graph.endpoints(edge) {
                if !(inside.contains(&pair.start) && inside.contains(&pair.end)) {
                    crossing.insert(edge);
                }
            }
        }
    }
    for edge in crossing {
        graph.unlink_edge(edge)?;
    }
    Ok(())
}
