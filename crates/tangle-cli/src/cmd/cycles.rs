//! `tangle cycles`: every elementary circuit among the model's types.

use std::io::Write;

use clap::Args;
use serde::Serialize;
use tangle_graph::circuit_labels;

use super::ModelArgs;
use crate::output::{OutputMode, pretty_section, render};

#[derive(Args, Debug)]
pub struct CyclesArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Debug, Serialize)]
struct CycleEntry {
    /// Types on the circuit, first type repeated at the end.
    types: Vec<String>,
    /// Rendered `A -[prop]-> B` chain.
    path: String,
}

#[derive(Debug, Serialize)]
struct CyclesOutput {
    cycles: Vec<CycleEntry>,
}

pub fn run_cycles(args: &CyclesArgs, output: OutputMode) -> anyhow::Result<()> {
    let mut types = args.model.type_graph()?;
    let circuits = types.circuits()?;

    let graph = types.graph();
    let cycles = circuits
        .iter()
        .map(|circuit| {
            let mut names: Vec<String> = circuit
                .vertices
                .iter()
                .filter_map(|&v| graph.vertex(v).map(|s| s.type_name.clone()))
                .collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            CycleEntry {
                types: names,
                path: circuit_labels(graph, circuit),
            }
        })
        .collect();

    render(output, &CyclesOutput { cycles }, render_cycles_human)
}

fn render_cycles_human(payload: &CyclesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.cycles.is_empty() {
        writeln!(w, "No type cycles found.")?;
        return Ok(());
    }
    pretty_section(w, &format!("Type cycles: {}", payload.cycles.len()))?;
    for (idx, cycle) in payload.cycles.iter().enumerate() {
        writeln!(w, "Cycle {}: {}", idx + 1, cycle.path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_no_cycles() {
        let mut out = Vec::new();
        render_cycles_human(&CyclesOutput { cycles: Vec::new() }, &mut out).expect("render");
        assert!(String::from_utf8(out).expect("utf8").contains("No type cycles found."));
    }

    #[test]
    fn render_lists_each_circuit() {
        let payload = CyclesOutput {
            cycles: vec![CycleEntry {
                types: vec!["Customer".into(), "Order".into(), "Customer".into()],
                path: "Customer -[orders]-> Order -[customer]-> Customer".into(),
            }],
        };
        let mut out = Vec::new();
        render_cycles_human(&payload, &mut out).expect("render");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains("Type cycles: 1"));
        assert!(rendered.contains("Cycle 1: Customer -[orders]-> Order"));
    }
}
