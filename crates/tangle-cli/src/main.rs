#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tangle_load::{load_project_config, load_user_config};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tangle: dependency graphs for type models and bulk loads",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format (pretty, text, json). Overrides FORMAT and config.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Show the dependency order of a model's types",
        long_about = "Build the type graph reachable from --root and sort it so every \
                      referenced type precedes the types that reference it. Cycles \
                      through concrete types are reported as errors.",
        after_help = "EXAMPLES:\n    # Order the types reachable from Customer\n    tangle types --model shop.toml --root Customer\n\n    # Include inherited relationships\n    tangle types -m shop.toml -r Customer --extend-scope"
    )]
    Types(cmd::types::TypesArgs),

    #[command(
        about = "List every elementary cycle among a model's types",
        after_help = "EXAMPLES:\n    tangle cycles --model shop.toml --root Customer\n\n    # Machine-readable\n    tangle cycles -m shop.toml -r Customer --format json"
    )]
    Cycles(cmd::cycles::CyclesArgs),

    #[command(
        about = "Render the type graph as DOT or GraphML",
        after_help = "EXAMPLES:\n    tangle export -m shop.toml -r Customer | dot -Tsvg > shop.svg\n\n    tangle export -m shop.toml -r Customer --to graphml --out shop.graphml"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        about = "Check that a property path can be walked from the root type",
        after_help = "EXAMPLES:\n    tangle path -m shop.toml -r Order customer.address"
    )]
    Path(cmd::path::PathArgs),

    #[command(
        about = "Generate a sample aggregate and show its persist order",
        long_about = "Create one sample object per visited type, break reference cycles \
                      with stubs, and print the creation and deletion order of the \
                      aggregate roots.",
        after_help = "EXAMPLES:\n    tangle sample -m shop.toml -r Customer --collection-size 3 --depth 2"
    )]
    Sample(cmd::sample::SampleArgs),

    #[command(
        about = "Resolve a load plan and show its table order",
        after_help = "EXAMPLES:\n    tangle plan --plan load.toml\n\n    # Ignore depends_on entries outside the plan\n    tangle plan --plan load.toml --tolerant"
    )]
    Plan(cmd::plan::PlanArgs),

    #[command(
        about = "Load tables into SQLite in dependency order",
        long_about = "Insert every table after the tables its required foreign keys \
                      point at, then fill nullable foreign keys in a second pass \
                      matched by natural key.",
        after_help = "EXAMPLES:\n    tangle load --plan load.toml --db shop.db --create-tables\n\n    # Four workers, 1000 rows per commit\n    tangle load -p load.toml --db shop.db --shards 4 --batch-size 1000"
    )]
    Load(cmd::load::LoadArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TANGLE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tangle=debug,info"
        } else {
            "tangle=info,warn"
        })
    });

    let format = env::var("TANGLE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

/// Preferred output mode from `.tangle/config.toml`, then the user config.
fn configured_output(project_root: &Path) -> Option<String> {
    let project = load_project_config(project_root).ok().and_then(|c| c.output);
    project.or_else(|| load_user_config().ok().and_then(|c| c.output))
}

fn run(cli: &Cli, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Types(args) => cmd::types::run_types(args, output),
        Commands::Cycles(args) => cmd::cycles::run_cycles(args, output),
        Commands::Export(args) => cmd::export::run_export(args, output),
        Commands::Path(args) => cmd::path::run_path(args, output),
        Commands::Sample(args) => cmd::sample::run_sample(args, output),
        Commands::Plan(args) => cmd::plan::run_plan(args, output, project_root),
        Commands::Load(args) => cmd::load::run_load(args, output, project_root),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: cannot read current directory: {err}");
            return ExitCode::FAILURE;
        }
    };
    let output = resolve_output_mode(cli.format, cli.json, configured_output(&project_root).as_deref());

    match run(&cli, output, &project_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(render_err) = render_error(output, &CliError::from(&err)) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}
