//! Textual graph export for visualization.
//!
//! Both renderings list vertices in order-id order and linked edges sorted
//! by `(start id, end id, edge handle)`, so two graphs with the same content
//! render byte-for-byte identically. Unlabelled edges are marked as
//! inheritance and qualified edges are flagged.

use std::fmt::Write as _;

use crate::graph::{Edge, EdgeId, Graph, Pair, Vertex};

/// Render the graph as Graphviz DOT.
#[must_use]
pub fn to_dot<V: Vertex, E: Edge>(graph: &Graph<V, E>) -> String {
    let mut out = String::new();
    out.push_str("digraph tangle {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, fontname=\"Helvetica\"];\n");

    for vertex in graph.vertices_by_id() {
        let Some(payload) = graph.vertex(vertex) else {
            continue;
        };
        let id = graph.id(vertex).unwrap_or_default();
        let style = if payload.is_abstract() { ", style=dashed" } else { "" };
        let _ = writeln!(out, "  n{id} [label=\"{}\"{style}];", escape(&payload.label()));
    }

    for (edge, pair) in sorted_edges(graph) {
        let (Some(start), Some(end)) = (graph.id(pair.start), graph.id(pair.end)) else {
            continue;
        };
        let Some(payload) = graph.edge(edge) else {
            continue;
        };
        let mut attrs = vec![format!("label=\"{}\"", escape(payload.label().unwrap_or("")))];
        if payload.is_unlabelled() {
            attrs.push("style=dashed".to_string());
            attrs.push("arrowhead=empty".to_string());
        }
        if payload.is_qualified() {
            attrs.push("color=gray".to_string());
        }
        let _ = writeln!(out, "  n{start} -> n{end} [{}];", attrs.join(", "));
    }

    out.push_str("}\n");
    out
}

/// Render the graph as GraphML.
#[must_use]
pub fn to_graphml<V: Vertex, E: Edge>(graph: &Graph<V, E>) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    out.push_str("  <key id=\"label\" for=\"all\" attr.name=\"label\" attr.type=\"string\"/>\n");
    out.push_str("  <key id=\"abstract\" for=\"node\" attr.name=\"abstract\" attr.type=\"boolean\"/>\n");
    out.push_str("  <key id=\"kind\" for=\"edge\" attr.name=\"kind\" attr.type=\"string\"/>\n");
    out.push_str("  <key id=\"qualified\" for=\"edge\" attr.name=\"qualified\" attr.type=\"boolean\"/>\n");
    out.push_str("  <graph id=\"tangle\" edgedefault=\"directed\">\n");

    for vertex in graph.vertices_by_id() {
        let Some(payload) = graph.vertex(vertex) else {
            continue;
        };
        let id = graph.id(vertex).unwrap_or_default();
        let _ = writeln!(out, "    <node id=\"n{id}\">");
        let _ = writeln!(out, "      <data key=\"label\">{}</data>", escape(&payload.label()));
        let _ = writeln!(out, "      <data key=\"abstract\">{}</data>", payload.is_abstract());
        out.push_str("    </node>\n");
    }

    for (edge, pair) in sorted_edges(graph) {
        let (Some(start), Some(end)) = (graph.id(pair.start), graph.id(pair.end)) else {
            continue;
        };
        let Some(payload) = graph.edge(edge) else {
            continue;
        };
        let kind = if payload.is_unlabelled() { "inheritance" } else { "property" };
        let _ = writeln!(
            out,
            "    <edge id=\"{edge}\" source=\"n{start}\" target=\"n{end}\">"
        );
        let _ = writeln!(
            out,
            "      <data key=\"label\">{}</data>",
            escape(payload.label().unwrap_or(""))
        );
        let _ = writeln!(out, "      <data key=\"kind\">{kind}</data>");
        let _ = writeln!(out, "      <data key=\"qualified\">{}</data>", payload.is_qualified());
        out.push_str("    </edge>\n");
    }

    out.push_str("  </graph>\n");
    out.push_str("</graphml>\n");
    out
}

fn sorted_edges<V: Vertex, E: Edge>(graph: &Graph<V, E>) -> Vec<(EdgeId, Pair)> {
    let mut edges: Vec<(EdgeId, Pair)> = graph.edges().collect();
    edges.sort_by_key(|(edge, pair)| (graph.id(pair.start), graph.id(pair.end), *edge));
    edges
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Link;

    fn sample() -> Graph<String, Link> {
        let mut graph = Graph::new();
        graph.connect("Order".into(), "Customer".into(), Link::named("customer"));
        graph.connect("VipCustomer".into(), "Customer".into(), Link::unlabelled());
        graph.connect("Order".into(), "Line<1>".into(), Link::named("lines").qualified());
        graph
    }

    #[test]
    fn dot_lists_vertices_and_edges() {
        let dot = to_dot(&sample());
        assert!(dot.starts_with("digraph tangle {"));
        assert!(dot.contains("n1 [label=\"Order\"];"), "{dot}");
        assert!(dot.contains("n1 -> n2 [label=\"customer\"];"), "{dot}");
        assert!(dot.contains("n3 -> n2 [label=\"\", style=dashed, arrowhead=empty];"), "{dot}");
        assert!(dot.contains("label=\"Line&lt;1&gt;\""), "{dot}");
        assert!(dot.contains("color=gray"), "{dot}");
    }

    #[test]
    fn graphml_marks_edge_kinds() {
        let xml = to_graphml(&sample());
        assert!(xml.contains("<data key=\"kind\">inheritance</data>"));
        assert!(xml.contains("<data key=\"kind\">property</data>"));
        assert!(xml.contains("<data key=\"qualified\">true</data>"));
        assert!(xml.contains("source=\"n1\" target=\"n2\""));
        assert!(xml.trim_end().ends_with("</graphml>"));
    }

    #[test]
    fn export_is_deterministic_and_follows_order_ids() {
        let mut graph = sample();
        let first = to_dot(&graph);
        assert_eq!(first, to_dot(&graph.clone()));

        let order: Vec<_> = graph.vertices_by_id().into_iter().rev().collect();
        graph.renumber(&order).expect("renumber");
        let renumbered = to_dot(&graph);
        assert!(renumbered.contains("n1 [label=\"Line&lt;1&gt;\"];"), "{renumbered}");
    }

    #[test]
    fn unlinked_edges_are_not_exported() {
        let mut graph = sample();
        let edge = graph.edges().next().map(|(e, _)| e).expect("an edge");
        graph.unlink_edge(edge).expect("unlink");
        assert!(!to_dot(&graph).contains("label=\"customer\""));
    }
}
