//! `tangle sample`: generate a sample aggregate and show its persist order.

use std::io::Write;

use clap::Args;
use serde::Serialize;
use tangle_model::{Aggregate, ObjectId, SampleOptions, generate, plan};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Model file.
    #[arg(short, long)]
    pub model: std::path::PathBuf,

    /// Type of the sample's root object.
    #[arg(short, long)]
    pub root: String,

    /// Elements generated per collection property.
    #[arg(long, default_value_t = SampleOptions::default().collection_size)]
    pub collection_size: usize,

    /// Relationship depth below the root; deeper references stay null.
    #[arg(long, default_value_t = SampleOptions::default().max_depth)]
    pub depth: usize,
}

#[derive(Debug, Serialize)]
struct SwizzleEntry {
    owner: String,
    property: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct SampleOutput {
    objects: usize,
    creation: Vec<String>,
    deletion: Vec<String>,
    swizzled: Vec<SwizzleEntry>,
    unresolved: Vec<String>,
}

fn label(aggregate: &Aggregate, id: ObjectId) -> String {
    aggregate
        .get(id)
        .map_or_else(|| id.to_string(), |instance| format!("{}{id}", instance.type_name))
}

pub fn run_sample(args: &SampleArgs, output: OutputMode) -> anyhow::Result<()> {
    let schema = tangle_model::load_schema(&args.model)?;
    let options = SampleOptions {
        collection_size: args.collection_size,
        max_depth: args.depth,
    };
    let (mut aggregate, _root) = generate(&schema, &args.root, options)?;
    let members: Vec<ObjectId> = aggregate.ids().collect();
    let objects = members.len();
    let persist = plan(&schema, &mut aggregate, &members)?;

    let payload = SampleOutput {
        objects,
        creation: persist.creation.iter().map(|&id| label(&aggregate, id)).collect(),
        deletion: persist.deletion().into_iter().map(|id| label(&aggregate, id)).collect(),
        swizzled: persist
            .swizzle
            .swizzled
            .iter()
            .map(|s| SwizzleEntry {
                owner: label(&aggregate, s.owner),
                property: s.property.clone(),
                target: label(&aggregate, s.target),
            })
            .collect(),
        unresolved: persist.swizzle.unresolved,
    };
    render_mode(output, &payload, render_sample_text, render_sample_pretty)
}

fn render_sample_text(payload: &SampleOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for (idx, object) in payload.creation.iter().enumerate() {
        writeln!(w, "{}\t{object}", idx + 1)?;
    }
    Ok(())
}

fn render_sample_pretty(payload: &SampleOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Sample aggregate")?;
    pretty_kv(w, "objects", payload.objects.to_string())?;
    pretty_kv(w, "roots", payload.creation.len().to_string())?;
    pretty_kv(w, "create", payload.creation.join(", "))?;
    pretty_kv(w, "delete", payload.deletion.join(", "))?;
    for swizzle in &payload.swizzled {
        pretty_kv(
            w,
            "swizzled",
            format!("{}.{} -> {}", swizzle.owner, swizzle.property, swizzle.target),
        )?;
    }
    for cycle in &payload.unresolved {
        pretty_kv(w, "unresolved", cycle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_args_default_to_sample_options() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: SampleArgs,
        }

        let parsed = Wrapper::parse_from(["test", "-m", "shop.toml", "-r", "Customer"]);
        let defaults = SampleOptions::default();
        assert_eq!(parsed.args.collection_size, defaults.collection_size);
        assert_eq!(parsed.args.depth, defaults.max_depth);
    }

    #[test]
    fn labels_combine_type_and_id() {
        let mut aggregate = Aggregate::new();
        let id = aggregate.create("Order");
        assert_eq!(label(&aggregate, id), "Order#0");
        assert_eq!(label(&aggregate, ObjectId::new(9)), "#9");
    }

    #[test]
    fn pretty_lists_swizzles() {
        let payload = SampleOutput {
            objects: 3,
            creation: vec!["Customer#0".into()],
            deletion: vec!["Customer#0".into()],
            swizzled: vec![SwizzleEntry {
                owner: "Order#1".into(),
                property: "customer".into(),
                target: "Customer#0".into(),
            }],
            unresolved: Vec::new(),
        };
        let mut out = Vec::new();
        render_sample_pretty(&payload, &mut out).expect("render");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains("Order#1.customer -> Customer#0"));
        assert!(rendered.contains("objects:     3"));
    }
}
