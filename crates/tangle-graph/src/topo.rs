//! Cycle-aware topological sort.
//!
//! # Ordering
//!
//! Edges point from the vertex that must come first to the vertex that
//! depends on it. After a successful sort every linked edge `u -> v`
//! satisfies `id(u) < id(v)` and the graph is renumbered in sorted order.
//!
//! The search is a post-order DFS that follows *incoming* edges, so each
//! vertex is emitted after everything it depends on. Roots are taken in
//! current order-id order, which makes a second sort of an already sorted
//! graph a no-op.
//!
//! # Cycles
//!
//! Reaching a vertex that is still on the DFS stack closes a cycle:
//!
//! - if that vertex is abstract, the step is abandoned silently;
//! - otherwise [`CyclePolicy::Strict`] fails with a [`CycleTrace`] and
//!   [`CyclePolicy::Tolerant`] skips the edge and records the trace.

#![allow(clippy::module_name_repetitions)]

use tracing::{instrument, trace, warn};

use crate::error::{CycleTrace, GraphError};
use crate::graph::{Edge, EdgeId, Graph, Vertex, VertexId};

/// What to do with a cycle through a concrete vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Fail with [`GraphError::Cycle`].
    #[default]
    Strict,
    /// Skip the closing edge and report the cycle in [`TopoOrder::skipped`].
    Tolerant,
}

/// Result of a successful sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopoOrder {
    /// Vertices in sorted order; `order[k]` now has id `START + k`.
    pub order: Vec<VertexId>,
    /// Concrete cycles skipped under [`CyclePolicy::Tolerant`].
    pub skipped: Vec<CycleTrace>,
    /// Cycle steps into abstract vertices that were abandoned.
    pub abandoned: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    Active,
    Done,
}

struct Frame {
    vertex: VertexId,
    via: Option<EdgeId>,
    preds: Vec<EdgeId>,
    cursor: usize,
}

/// Sort the linked graph and renumber it.
#[instrument(skip(graph), fields(vertices = graph.vertex_count(), edges = graph.edge_count()))]
pub fn topological_sort<V: Vertex, E: Edge>(
    graph: &mut Graph<V, E>,
    policy: CyclePolicy,
) -> Result<TopoOrder, GraphError> {
    let mut marks = vec![Mark::Unseen; graph.vertex_count()];
    let mut result = TopoOrder::default();

    for root in graph.vertices_by_id() {
        if marks[root.index()] != Mark::Unseen {
            continue;
        }
        marks[root.index()] = Mark::Active;
        let mut frames = vec![Frame {
            vertex: root,
            via: None,
            preds: graph.in_edges(root).collect(),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            let Some(&edge) = frame.preds.get(frame.cursor) else {
                marks[frame.vertex.index()] = Mark::Done;
                result.order.push(frame.vertex);
                frames.pop();
                continue;
            };
            frame.cursor += 1;
            let Some(pair) = graph.endpoints(edge) else {
                continue;
            };
            let w = pair.start;
            match marks[w.index()] {
                Mark::Done => {}
                Mark::Unseen => {
                    marks[w.index()] = Mark::Active;
                    frames.push(Frame {
                        vertex: w,
                        via: Some(edge),
                        preds: graph.in_edges(w).collect(),
                        cursor: 0,
                    });
                }
                Mark::Active => {
                    let is_abstract = graph.vertex(w).is_some_and(Vertex::is_abstract);
                    if is_abstract {
                        result.abandoned += 1;
                        trace!(vertex = %w, edge = %edge, "abandoned cycle step into abstract vertex");
                        continue;
                    }
                    let cycle = trace_cycle(graph, &frames, w, edge);
                    match policy {
                        CyclePolicy::Strict => return Err(GraphError::Cycle(cycle)),
                        CyclePolicy::Tolerant => {
                            warn!(%cycle, "skipping cycle edge");
                            result.skipped.push(cycle);
                        }
                    }
                }
            }
        }
    }

    graph.renumber(&result.order)?;
    Ok(result)
}

/// Build the cycle closed by `edge` (`w -> top of stack`), in edge direction.
fn trace_cycle<V: Vertex, E: Edge>(
    graph: &Graph<V, E>,
    frames: &[Frame],
    w: VertexId,
    edge: EdgeId,
) -> CycleTrace {
    let label = |v: VertexId| graph.vertex(v).map_or_else(|| v.to_string(), Vertex::label);
    let crumb = |e: EdgeId| {
        graph
            .edge(e)
            .and_then(Edge::label)
            .map_or_else(|| "^".to_string(), str::to_string)
    };

    let pos = frames.iter().rposition(|f| f.vertex == w).unwrap_or(0);
    let mut vertices = vec![label(w)];
    let mut breadcrumbs = vec![crumb(edge)];
    for frame in frames[pos + 1..].iter().rev() {
        vertices.push(label(frame.vertex));
        if let Some(via) = frame.via {
            breadcrumbs.push(crumb(via));
        }
    }
    vertices.push(label(w));
    CycleTrace {
        vertices,
        breadcrumbs,
    }
}
