//! `tangle plan`: resolve a load plan and show its table order.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tangle_load::{LoadPlan, LoaderSettings, PartialLoaderSettings, PlanFile, resolve_settings};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Plan file and the settings that can be overridden on the command line.
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Load plan (TOML with `[loader]` and `[[table]]` entries).
    #[arg(short, long)]
    pub plan: PathBuf,

    /// Parallel workers.
    #[arg(long)]
    pub shards: Option<usize>,

    /// Rows per commit within a worker.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Skip `depends_on` entries naming tables outside the plan.
    #[arg(long)]
    pub tolerant: bool,
}

impl PlanArgs {
    fn overrides(&self) -> PartialLoaderSettings {
        PartialLoaderSettings {
            batch_size: self.batch_size,
            shards: self.shards,
            tolerant: self.tolerant.then_some(true),
            channel_capacity: None,
        }
    }

    /// Read the plan file, resolve settings and order the tables.
    pub fn resolve(&self, project_root: &Path) -> anyhow::Result<(LoadPlan, LoaderSettings)> {
        let file = PlanFile::load(&self.plan)?;
        let settings = resolve_settings(self.overrides(), file.loader, project_root)?;
        let tables = file.into_tables(&settings);
        let plan = LoadPlan::build(tables, settings.tolerant)
            .with_context(|| format!("Failed to order tables in {}", self.plan.display()))?;
        Ok((plan, settings))
    }
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    table: String,
    dependency: String,
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    insert_order: Vec<String>,
    update_tables: Vec<String>,
    skipped: Vec<SkippedEntry>,
    settings: LoaderSettings,
}

pub fn run_plan(args: &PlanArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let (plan, settings) = args.resolve(project_root)?;
    let payload = PlanOutput {
        insert_order: plan.table_names().into_iter().map(str::to_string).collect(),
        update_tables: plan.update_tables().map(|t| t.name().to_string()).collect(),
        skipped: plan
            .skipped()
            .iter()
            .map(|s| SkippedEntry {
                table: s.table.clone(),
                dependency: s.dependency.clone(),
            })
            .collect(),
        settings,
    };
    render_mode(output, &payload, render_plan_text, render_plan_pretty)
}

fn render_plan_text(payload: &PlanOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for table in &payload.insert_order {
        writeln!(w, "insert\t{table}")?;
    }
    for table in &payload.update_tables {
        writeln!(w, "update\t{table}")?;
    }
    Ok(())
}

fn render_plan_pretty(payload: &PlanOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Load plan")?;
    for (idx, table) in payload.insert_order.iter().enumerate() {
        writeln!(w, "{:>4}  {table}", idx + 1)?;
    }
    writeln!(w)?;
    let updates = if payload.update_tables.is_empty() {
        "(none)".to_string()
    } else {
        payload.update_tables.join(", ")
    };
    pretty_kv(w, "updates", updates)?;
    pretty_kv(w, "shards", payload.settings.shards.to_string())?;
    pretty_kv(w, "batch size", payload.settings.batch_size.to_string())?;
    for skipped in &payload.skipped {
        pretty_kv(w, "skipped", format!("{} -> {}", skipped.table, skipped.dependency))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(clap::Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: PlanArgs,
    }

    #[test]
    fn unset_flags_do_not_override() {
        use clap::Parser;
        let parsed = Wrapper::parse_from(["test", "--plan", "plan.toml"]);
        assert_eq!(parsed.args.overrides(), PartialLoaderSettings::default());
    }

    #[test]
    fn flags_become_overrides() {
        use clap::Parser;
        let parsed = Wrapper::parse_from(["test", "-p", "plan.toml", "--shards", "4", "--batch-size", "50", "--tolerant"]);
        let overrides = parsed.args.overrides();
        assert_eq!(overrides.shards, Some(4));
        assert_eq!(overrides.batch_size, Some(50));
        assert_eq!(overrides.tolerant, Some(true));
    }

    #[test]
    fn resolve_reads_plan_relative_to_its_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.csv"), "id\n1\n").expect("csv");
        let plan = dir.path().join("plan.toml");
        std::fs::write(
            &plan,
            r#"
[loader]
batch_size = 3

[[table]]
name = "b"
columns = [{ name = "id" }]
depends_on = ["a", "ghost"]

[[table]]
name = "a"
columns = [{ name = "id" }]
source = { kind = "csv", path = "a.csv" }
"#,
        )
        .expect("plan");

        let args = PlanArgs {
            plan,
            shards: None,
            batch_size: None,
            tolerant: true,
        };
        let (plan, settings) = args.resolve(dir.path()).expect("resolve");
        assert_eq!(plan.table_names(), vec!["a", "b"]);
        assert_eq!(plan.skipped().len(), 1);
        assert_eq!(settings.batch_size, 3);
    }

    #[test]
    fn text_lists_passes() {
        let payload = PlanOutput {
            insert_order: vec!["t3".into(), "t1".into()],
            update_tables: vec!["t3".into()],
            skipped: Vec::new(),
            settings: LoaderSettings::default(),
        };
        let mut out = Vec::new();
        render_plan_text(&payload, &mut out).expect("render");
        assert_eq!(String::from_utf8(out).expect("utf8"), "insert\tt3\ninsert\tt1\nupdate\tt3\n");
    }
}
