//! `tangle load`: run a load plan into a SQLite database.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use tangle_load::{LoadReport, Loader, SqliteStore};
use tracing::info;

use super::plan::PlanArgs;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Target SQLite database; created if missing.
    #[arg(long)]
    pub db: PathBuf,

    /// Create each planned table (untyped columns) before loading.
    #[arg(long)]
    pub create_tables: bool,
}

pub fn run_load(args: &LoadArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let (plan, settings) = args.plan.resolve(project_root)?;

    let mut store = SqliteStore::open(&args.db)?;
    if args.create_tables {
        for table in plan.order() {
            store.ensure_table(table.name(), &table.spec.all_columns())?;
        }
    }

    let loader = Loader::new(&plan, settings);
    let report = if settings.shards > 1 {
        drop(store);
        loader.run_sharded(|_| SqliteStore::open(&args.db))?
    } else {
        loader.run(&mut store)?
    };
    info!(
        inserted = report.inserted(),
        updated = report.updated(),
        commits = report.commits,
        "load finished"
    );
    render_mode(output, &report, render_load_text, render_load_pretty)
}

fn render_load_text(report: &LoadReport, w: &mut dyn Write) -> std::io::Result<()> {
    for (table, counts) in &report.tables {
        writeln!(
            w,
            "{table}\t{}\t{}\t{}",
            counts.inserted, counts.updated, counts.unresolved
        )?;
    }
    Ok(())
}

fn render_load_pretty(report: &LoadReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Load report")?;
    writeln!(w, "{:<20} {:>10} {:>10} {:>10}", "table", "inserted", "updated", "unresolved")?;
    for (table, counts) in &report.tables {
        writeln!(
            w,
            "{table:<20} {:>10} {:>10} {:>10}",
            counts.inserted, counts.updated, counts.unresolved
        )?;
    }
    writeln!(w)?;
    pretty_kv(w, "inserted", report.inserted().to_string())?;
    pretty_kv(w, "updated", report.updated().to_string())?;
    pretty_kv(w, "commits", report.commits.to_string())
}
