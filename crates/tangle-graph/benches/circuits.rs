use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tangle_graph::{CyclePolicy, Graph, Link, VertexId, topological_sort};

const SIZES: [usize; 3] = [8, 32, 128];

/// Ring of `n` vertices with a backward chord every third vertex, so each
/// chord closes one short cycle next to the long ring.
fn ring_with_chords(n: usize) -> Graph<String, Link> {
    let mut graph = Graph::new();
    let ids: Vec<VertexId> = (0..n).map(|i| graph.add_vertex(format!("t{i}"))).collect();
    for i in 0..n {
        let next = ids[(i + 1) % n];
        let _ = graph.add_edge(ids[i], next, Link::named(format!("next{i}")));
        if i % 3 == 0 {
            let chord = ids[(i + n - 2) % n];
            let _ = graph.add_edge(ids[i], chord, Link::named(format!("skip{i}")));
        }
    }
    graph
}

/// Layered DAG: each vertex points at the two vertices of the next layer.
fn layered_dag(n: usize) -> Graph<String, Link> {
    let mut graph = Graph::new();
    let ids: Vec<VertexId> = (0..n).map(|i| graph.add_vertex(format!("t{i}"))).collect();
    for i in 0..n {
        for j in [i * 2 + 1, i * 2 + 2] {
            if j < n {
                let _ = graph.add_edge(ids[j], ids[i], Link::named(format!("r{i}_{j}")));
            }
        }
    }
    graph
}

fn bench_circuits(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph.circuits");
    for n in SIZES {
        let graph = ring_with_chords(n);
        group.throughput(Throughput::Elements(graph.edge_count() as u64));
        group.bench_with_input(BenchmarkId::new("ring_with_chords", n), &graph, |b, graph| {
            b.iter(|| {
                let mut working = graph.clone();
                black_box(working.circuits().map(|found| found.len()))
            });
        });
    }
    group.finish();
}

fn bench_topo(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph.topo");
    for n in SIZES {
        let graph = layered_dag(n * 8);
        group.throughput(Throughput::Elements(graph.vertex_count() as u64));
        group.bench_with_input(BenchmarkId::new("layered_dag", n * 8), &graph, |b, graph| {
            b.iter(|| {
                let mut working = graph.clone();
                black_box(topological_sort(&mut working, CyclePolicy::Strict).map(|o| o.order.len()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_circuits, bench_topo);
criterion_main!(benches);
