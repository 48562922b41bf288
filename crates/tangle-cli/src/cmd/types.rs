//! `tangle types`: dependency order of the types reachable from a root.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use super::ModelArgs;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct TypesArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Debug, Serialize)]
struct TypeEntry {
    id: usize,
    name: String,
    #[serde(rename = "abstract")]
    is_abstract: bool,
}

#[derive(Debug, Serialize)]
struct TypesOutput {
    root: String,
    types: Vec<TypeEntry>,
    /// Cycle steps into abstract types dropped during the sort.
    abandoned: usize,
}

pub fn run_types(args: &TypesArgs, output: OutputMode) -> anyhow::Result<()> {
    let mut types = args.model.type_graph()?;
    let order = types.sort()?;

    let graph = types.graph();
    let entries = order
        .order
        .iter()
        .filter_map(|&v| {
            let state = graph.vertex(v)?;
            Some(TypeEntry {
                id: graph.id(v)?,
                name: state.type_name.clone(),
                is_abstract: state.is_abstract,
            })
        })
        .collect();

    let payload = TypesOutput {
        root: args.model.root.clone(),
        types: entries,
        abandoned: order.abandoned,
    };
    render_mode(output, &payload, render_types_text, render_types_pretty)
}

fn render_types_text(payload: &TypesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for entry in &payload.types {
        let kind = if entry.is_abstract { "abstract" } else { "concrete" };
        writeln!(w, "{}\t{}\t{kind}", entry.id, entry.name)?;
    }
    Ok(())
}

fn render_types_pretty(payload: &TypesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Types reachable from {}", payload.root))?;
    for entry in &payload.types {
        let marker = if entry.is_abstract { " (abstract)" } else { "" };
        writeln!(w, "{:>4}  {}{marker}", entry.id, entry.name)?;
    }
    if payload.abandoned > 0 {
        writeln!(w)?;
        pretty_kv(w, "abandoned", payload.abandoned.to_string())?;
    }
    Ok(())
}
