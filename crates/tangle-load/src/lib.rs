#![forbid(unsafe_code)]
//! tangle-load: dependency-ordered bulk loading.
//!
//! # Overview
//!
//! ```text
//! PlanFile (TOML) ─► TableLoad* ─► LoadPlan (tangle-graph strict sort)
//!                                     │
//!                         Loader ─────┤ insert pass: required FKs, generators
//!                                     └ update pass: nullable FKs by natural key
//!                                          │
//!                                   Datastore (SqliteStore, MemoryStore)
//! ```
//!
//! # Conventions
//!
//! - **Errors**: typed [`LoadError`] with a stable [`tangle_graph::ErrorCode`];
//!   sources and datastores return `anyhow::Result` and are wrapped with the
//!   table they failed on.
//! - **Logging**: `tracing`. Pass and table boundaries at `info`, commits and
//!   nullable lookup misses at `debug`, skipped dependencies at `warn`.

pub mod config;
pub mod error;
pub mod generator;
pub mod loader;
pub mod plan;
pub mod source;
pub mod spec;
pub mod store;
pub mod value;

pub use config::{
    LoaderSettings, PartialLoaderSettings, PlanFile, SourceConfig, TableConfig, TangleConfig, load_project_config,
    load_user_config, resolve_settings,
};
pub use error::LoadError;
pub use generator::{GenerationContext, GeneratorOverlay, GeneratorSpec, ValueGenerator};
pub use loader::{LoadReport, Loader, PhaseGate, TableReport};
pub use plan::{LoadPass, LoadPlan, SkippedDependency, TableLoad};
pub use source::{CsvSource, GeneratedSource, MemorySource, Record, RowIter, RowSource, row};
pub use spec::{ColumnSpec, ForeignKey, LookupPair, TableSpec};
pub use store::{Datastore, MemoryStore, SqliteStore, open_database, quote_ident};
pub use value::{Row, Value};
