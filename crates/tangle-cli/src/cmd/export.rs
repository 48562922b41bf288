//! `tangle export`: render the type graph as DOT or GraphML.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Serialize;
use tangle_graph::{to_dot, to_graphml};

use super::ModelArgs;
use crate::output::{OutputMode, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Dot,
    Graphml,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Document format.
    #[arg(long = "to", value_enum, default_value_t = ExportFormat::Dot)]
    pub to: ExportFormat,

    /// Renumber vertices in dependency order before rendering.
    #[arg(long)]
    pub sorted: bool,

    /// Write the document to a file instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    format: ExportFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<String>,
}

pub fn run_export(args: &ExportArgs, output: OutputMode) -> anyhow::Result<()> {
    let mut types = args.model.type_graph()?;
    if args.sorted {
        types.sort()?;
    }
    let document = match args.to {
        ExportFormat::Dot => to_dot(types.graph()),
        ExportFormat::Graphml => to_graphml(types.graph()),
    };

    let payload = match &args.out {
        Some(path) => {
            std::fs::write(path, &document).with_context(|| format!("Failed to write {}", path.display()))?;
            ExportOutput {
                format: args.to,
                path: Some(path.display().to_string()),
                document: None,
            }
        }
        None => ExportOutput {
            format: args.to,
            path: None,
            document: Some(document),
        },
    };
    render(output, &payload, render_export_human)
}

fn render_export_human(payload: &ExportOutput, w: &mut dyn Write) -> std::io::Result<()> {
    match (&payload.document, &payload.path) {
        (Some(document), _) => write!(w, "{document}"),
        (None, Some(path)) => writeln!(w, "wrote {path}"),
        (None, None) => Ok(()),
    }
}
