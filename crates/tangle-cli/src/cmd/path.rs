//! `tangle path`: check that a dotted property path walks from the root type.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use super::ModelArgs;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct PathArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Dot-separated property names, e.g. `orders.customer.address`.
    pub path: String,
}

#[derive(Debug, Serialize)]
struct PathOutput {
    root: String,
    path: String,
    reachable: bool,
}

pub fn run_path(args: &PathArgs, output: OutputMode) -> anyhow::Result<()> {
    let types = args.model.type_graph()?;
    let reachable = types.has_path(&args.path)?;
    let payload = PathOutput {
        root: args.model.root.clone(),
        path: args.path.clone(),
        reachable,
    };
    render(output, &payload, render_path_human)
}

fn render_path_human(payload: &PathOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let verdict = if payload.reachable { "reachable" } else { "not reachable" };
    writeln!(w, "{}.{}: {verdict}", payload.root, payload.path)
}
