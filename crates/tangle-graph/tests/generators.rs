use proptest::prelude::*;
use tangle_graph::{Graph, Link, VertexId};

/// Vertex count plus an edge list over indices `0..vertices`.
#[derive(Debug, Clone)]
pub struct Shape {
    pub vertices: usize,
    pub edges: Vec<(usize, usize)>,
}

/// Arbitrary multigraph shape; self-loops and parallel edges allowed.
pub fn arb_shape(max_vertices: usize, max_edges: usize) -> impl Strategy<Value = Shape> {
    (1..=max_vertices).prop_flat_map(move |n| {
        prop::collection::vec((0..n, 0..n), 0..=max_edges)
            .prop_map(move |edges| Shape { vertices: n, edges })
    })
}

/// Acyclic shape (every edge goes from a lower to a higher index) plus a
/// shuffled insertion order so the sorter has real work to do.
pub fn arb_dag(max_vertices: usize, max_edges: usize) -> impl Strategy<Value = (Shape, Vec<usize>)> {
    (2..=max_vertices).prop_flat_map(move |n| {
        (
            prop::collection::vec((0..n, 0..n), 0..=max_edges),
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        )
            .prop_map(move |(pairs, insertion)| {
                let edges = pairs
                    .into_iter()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| (a.min(b), a.max(b)))
                    .collect();
                (Shape { vertices: n, edges }, insertion)
            })
    })
}

/// Mutation script for unlink/reverse/restore properties.
#[derive(Debug, Clone, Copy)]
pub enum Mutation {
    UnlinkEdge(usize),
    UnlinkVertex(usize),
    Reverse(usize),
}

pub fn arb_mutations(max: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(
        prop_oneof![
            any::<usize>().prop_map(Mutation::UnlinkEdge),
            any::<usize>().prop_map(Mutation::UnlinkVertex),
            any::<usize>().prop_map(Mutation::Reverse),
        ],
        0..=max,
    )
}

/// Build the graph with vertices inserted in index order.
pub fn build(shape: &Shape) -> (Graph<String, Link>, Vec<VertexId>) {
    let order: Vec<usize> = (0..shape.vertices).collect();
    build_in_order(shape, &order)
}

/// Build the graph inserting vertices in `insertion` order. The returned
/// handles are indexed by logical vertex index.
pub fn build_in_order(shape: &Shape, insertion: &[usize]) -> (Graph<String, Link>, Vec<VertexId>) {
    let mut graph = Graph::new();
    let mut ids = vec![None; shape.vertices];
    for &logical in insertion {
        ids[logical] = Some(graph.add_vertex(format!("v{logical}")));
    }
    let ids: Vec<VertexId> = ids.into_iter().map(|id| id.expect("every vertex inserted")).collect();
    for (k, &(a, b)) in shape.edges.iter().enumerate() {
        graph
            .add_edge(ids[a], ids[b], Link::named(format!("e{k}")))
            .expect("edge between known vertices");
    }
    (graph, ids)
}

/// Count elementary circuits by exhaustive search. Each circuit is counted
/// from its lowest vertex; parallel edges multiply.
pub fn brute_force_circuits(shape: &Shape) -> usize {
    let n = shape.vertices;
    let mut mult = vec![vec![0usize; n]; n];
    for &(a, b) in &shape.edges {
        mult[a][b] += 1;
    }

    fn extend(
        mult: &[Vec<usize>],
        start: usize,
        v: usize,
        visited: &mut [bool],
        ways: usize,
        count: &mut usize,
    ) {
        for w in start..mult.len() {
            let m = mult[v][w];
            if m == 0 {
                continue;
            }
            if w == start {
                if v != start {
                    *count += ways * m;
                }
            } else if !visited[w] {
                visited[w] = true;
                extend(mult, start, w, visited, ways * m, count);
                visited[w] = false;
            }
        }
    }

    let mut count = 0;
    for start in 0..n {
        count += mult[start][start];
        let mut visited = vec![false; n];
        visited[start] = true;
        extend(&mult, start, start, &mut visited, 1, &mut count);
    }
    count
}

/// Vertices reachable from `from` (including itself).
pub fn reachable(shape: &Shape, from: usize) -> Vec<bool> {
    let mut seen = vec![false; shape.vertices];
    let mut stack = vec![from];
    seen[from] = true;
    while let Some(v) = stack.pop() {
        for &(a, b) in &shape.edges {
            if a == v && !seen[b] {
                seen[b] = true;
                stack.push(b);
            }
        }
    }
    seen
}
