pub mod cycles;
pub mod export;
pub mod load;
pub mod path;
pub mod plan;
pub mod sample;
pub mod types;

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tangle_model::{Schema, TypeGraph, TypeGraphOptions, load_schema};

/// Model selection shared by the type-graph commands.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model file (TOML, one `[types.<Name>]` table per entity type).
    #[arg(short, long)]
    pub model: PathBuf,

    /// Type the graph is built from.
    #[arg(short, long)]
    pub root: String,

    /// Copy inherited relationships into each subtype as qualified edges.
    #[arg(long)]
    pub extend_scope: bool,
}

impl ModelArgs {
    pub fn schema(&self) -> anyhow::Result<Schema> {
        load_schema(&self.model)
    }

    /// Load the model and build the type graph rooted at `--root`.
    pub fn type_graph(&self) -> anyhow::Result<TypeGraph> {
        let schema = self.schema()?;
        let options = TypeGraphOptions {
            extend_scope: self.extend_scope,
        };
        TypeGraph::build(&schema, &self.root, options)
            .with_context(|| format!("Failed to build type graph from {}", self.root))
    }
}
