//! The two-pass loader.
//!
//! # Passes
//!
//! 1. **Insert**: tables in dependency order. Required foreign keys are
//!    resolved by lookup against already-loaded tables; nullable ones are
//!    left empty. Missing required column values come from generators.
//! 2. **Update**: tables with nullable foreign keys, revisited once every
//!    table has rows. Resolved columns are written by natural key; a miss
//!    leaves the column empty.
//!
//! # Sharding
//!
//! With `shards > 1` every worker opens each source itself and handles the
//! rows whose sequence number modulo the shard count equals its slot. Each
//! worker writes through its own [`Datastore`]. Workers flush and meet at a
//! [`PhaseGate`] after every table, so a table's rows are committed before
//! any worker starts on the next table. The first failure aborts the gate
//! and is the error returned.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::LoaderSettings;
use crate::error::LoadError;
use crate::generator::{GenerationContext, GeneratorOverlay};
use crate::plan::{LoadPass, LoadPlan, TableLoad};
use crate::source::Record;
use crate::spec::ForeignKey;
use crate::store::Datastore;
use crate::value::{Row, Value, render_pairs};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub inserted: u64,
    pub updated: u64,
    /// Nullable foreign keys whose lookup found nothing.
    pub unresolved: u64,
    /// Updates whose natural key matched no row.
    pub update_misses: u64,
    /// Schema marker lines skipped, counted once per table.
    pub schema_lines: u64,
}

impl TableReport {
    fn merge(&mut self, other: &Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unresolved += other.unresolved;
        self.update_misses += other.update_misses;
        self.schema_lines += other.schema_lines;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub tables: BTreeMap<String, TableReport>,
    pub commits: u64,
}

impl LoadReport {
    fn table(&mut self, name: &str) -> &mut TableReport {
        self.tables.entry(name.to_string()).or_default()
    }

    fn merge(&mut self, other: Self) {
        for (name, report) in other.tables {
            self.table(&name).merge(&report);
        }
        self.commits += other.commits;
    }

    #[must_use]
    pub fn inserted(&self) -> u64 {
        self.tables.values().map(|t| t.inserted).sum()
    }

    #[must_use]
    pub fn updated(&self) -> u64 {
        self.tables.values().map(|t| t.updated).sum()
    }
}

// ---------------------------------------------------------------------------
// Phase gate
// ---------------------------------------------------------------------------

/// A reusable barrier that can be aborted.
#[derive(Debug)]
pub struct PhaseGate {
    parties: usize,
    state: Mutex<GateState>,
    turned: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

impl PhaseGate {
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(GateState::default()),
            turned: Condvar::new(),
        }
    }

    /// Block until every party arrives. Returns `false` if the gate was
    /// aborted before the phase completed.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.aborted {
            return false;
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.turned.notify_all();
            return true;
        }
        while state.generation == generation && !state.aborted {
            state = self.turned.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.generation != generation
    }

    /// Release every waiter; later waits return `false` immediately.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aborted = true;
        self.turned.notify_all();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).aborted
    }
}

/// Aborts the gate when the owning worker unwinds, so the other workers stop
/// waiting for it.
struct AbortOnUnwind<'a>(&'a PhaseGate);

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

pub struct Loader<'p> {
    plan: &'p LoadPlan,
    settings: LoaderSettings,
    overlay: GeneratorOverlay,
}

struct Worker<'a, 'p> {
    loader: &'a Loader<'p>,
    slot: usize,
    shards: usize,
    gate: Option<&'a PhaseGate>,
    report: LoadReport,
    pending: usize,
}

impl<'p> Loader<'p> {
    #[must_use]
    pub fn new(plan: &'p LoadPlan, settings: LoaderSettings) -> Self {
        Self {
            plan,
            settings,
            overlay: GeneratorOverlay::new(),
        }
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay: GeneratorOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Run both passes on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the first row, source or datastore failure.
    #[instrument(skip_all, fields(tables = self.plan.len()))]
    pub fn run(&self, store: &mut dyn Datastore) -> Result<LoadReport, LoadError> {
        let mut worker = Worker::new(self, 0, 1, None);
        worker.run(store)?;
        Ok(worker.report)
    }

    /// Run both passes on `settings.shards` worker threads, each writing
    /// through the datastore `open(slot)` returns.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Workers still running when it happens
    /// stop at their next table boundary. A panicking worker aborts the
    /// others the same way and is reported as [`LoadError::Panicked`].
    #[instrument(skip_all, fields(tables = self.plan.len(), shards = self.settings.shards))]
    pub fn run_sharded<S, F>(&self, open: F) -> Result<LoadReport, LoadError>
    where
        S: Datastore,
        F: Fn(usize) -> anyhow::Result<S> + Sync,
    {
        let shards = self.settings.shards.max(1);
        let gate = PhaseGate::new(shards);

        let results: Vec<Result<LoadReport, LoadError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..shards)
                .map(|slot| {
                    let gate = &gate;
                    let open = &open;
                    scope.spawn(move || {
                        let _unwind = AbortOnUnwind(gate);
                        let result = open(slot)
                            .map_err(|err| LoadError::datastore("*", err))
                            .and_then(|mut store| {
                                let mut worker = Worker::new(self, slot, shards, Some(gate));
                                worker.run(&mut store).map(|()| worker.report)
                            });
                        if result.is_err() {
                            gate.abort();
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(slot, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        gate.abort();
                        Err(LoadError::Panicked { slot })
                    })
                })
                .collect()
        });

        let mut report = LoadReport::default();
        let mut secondary = None;
        for result in results {
            match result {
                Ok(part) => report.merge(part),
                Err(err) if err.is_secondary() => {
                    secondary.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        match secondary {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn generate(&self, table: &TableLoad, column: &str, seq: u64) -> Option<Value> {
        let declared = table.spec.column_spec(column).and_then(|c| c.generator.as_ref());
        self.overlay.resolve(&table.spec.name, column, declared).map(|generator| {
            generator.generate(&GenerationContext {
                table: &table.spec.name,
                column,
                seq,
            })
        })
    }
}

impl<'a, 'p> Worker<'a, 'p> {
    fn new(loader: &'a Loader<'p>, slot: usize, shards: usize, gate: Option<&'a PhaseGate>) -> Self {
        Self {
            loader,
            slot,
            shards,
            gate,
            report: LoadReport::default(),
            pending: 0,
        }
    }

    fn run(&mut self, store: &mut dyn Datastore) -> Result<(), LoadError> {
        let mut pass = None;
        for (step, table) in self.loader.plan.steps() {
            if pass != Some(step) {
                info!(slot = self.slot, pass = %step, "starting pass");
                pass = Some(step);
            }
            self.table(step, table, store)?;
        }
        info!(
            slot = self.slot,
            inserted = self.report.inserted(),
            updated = self.report.updated(),
            commits = self.report.commits,
            "load finished"
        );
        Ok(())
    }

    fn table(&mut self, pass: LoadPass, table: &TableLoad, store: &mut dyn Datastore) -> Result<(), LoadError> {
        let name = table.name();
        self.report.table(name);
        if let Some(source) = &table.source {
            info!(slot = self.slot, table = name, %pass, "loading table");
            let rows = source.open().map_err(|err| LoadError::source(name, err))?;
            let mut seq = 0u64;
            for record in rows {
                match record.map_err(|err| LoadError::source(name, err))? {
                    Record::Schema(line) => {
                        debug!(table = name, %line, "skipping schema line");
                        if pass == LoadPass::Insert && self.slot == 0 {
                            self.report.table(name).schema_lines += 1;
                        }
                    }
                    Record::Row(row) => {
                        let mine = usize::try_from(seq).is_ok_and(|s| s % self.shards == self.slot);
                        if mine {
                            match pass {
                                LoadPass::Insert => self.insert(table, seq, row, store)?,
                                LoadPass::Update => self.update(table, seq, &row, store)?,
                            }
                            self.pending += 1;
                            if self.pending >= self.loader.settings.batch_size {
                                self.flush(name, store)?;
                            }
                        }
                        seq += 1;
                    }
                }
            }
        } else {
            debug!(table = name, %pass, "no source, nothing to load");
        }
        self.flush(name, store)?;
        self.barrier()
    }

    fn insert(&mut self, table: &TableLoad, seq: u64, mut row: Row, store: &mut dyn Datastore) -> Result<(), LoadError> {
        let spec = &table.spec;
        for fk in spec.required_fks() {
            let (found, attempted) = resolve(fk, &row, spec.name.as_str(), store)?;
            let Some(value) = found else {
                return Err(LoadError::UnresolvedForeignKey {
                    table: spec.name.clone(),
                    row: seq,
                    column: fk.column.clone(),
                    target: fk.target.clone(),
                    attempted: render_pairs(&attempted),
                });
            };
            row.insert(fk.column.clone(), value);
        }

        let columns = spec.insert_columns();
        let values = columns
            .iter()
            .map(|column| self.value_for(table, column, seq, &row))
            .collect::<Result<Vec<_>, _>>()?;
        store
            .insert(&spec.name, &columns, &values)
            .map_err(|err| LoadError::datastore(&spec.name, err))?;
        self.report.table(&spec.name).inserted += 1;
        Ok(())
    }

    fn update(&mut self, table: &TableLoad, seq: u64, row: &Row, store: &mut dyn Datastore) -> Result<(), LoadError> {
        let spec = &table.spec;
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for fk in spec.nullable_fks() {
            let (found, attempted) = resolve(fk, row, spec.name.as_str(), store)?;
            if let Some(value) = found {
                columns.push(fk.column.clone());
                values.push(value);
            } else {
                debug!(
                    table = %spec.name,
                    row = seq,
                    column = %fk.column,
                    target = %fk.target,
                    tried = %render_pairs(&attempted),
                    "nullable foreign key not found, left empty"
                );
                self.report.table(&spec.name).unresolved += 1;
            }
        }
        if columns.is_empty() {
            return Ok(());
        }

        let key = spec
            .natural_key
            .iter()
            .map(|column| Ok((column.clone(), self.value_for(table, column, seq, row)?)))
            .collect::<Result<Vec<_>, LoadError>>()?;
        let affected = store
            .update(&spec.name, &columns, &values, &key)
            .map_err(|err| LoadError::datastore(&spec.name, err))?;
        let report = self.report.table(&spec.name);
        if affected == 0 {
            debug!(table = %spec.name, row = seq, key = %render_pairs(&key), "update matched no row");
            report.update_misses += 1;
        } else {
            report.updated += 1;
        }
        Ok(())
    }

    /// The value written for `column`: the row's own value, else a generated
    /// one. Required columns with neither are an error; others are null.
    fn value_for(&self, table: &TableLoad, column: &str, seq: u64, row: &Row) -> Result<Value, LoadError> {
        if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
            return Ok(value.clone());
        }
        if let Some(value) = self.loader.generate(table, column, seq) {
            return Ok(value);
        }
        let required = table.spec.column_spec(column).is_some_and(|c| c.required)
            || table.spec.natural_key.iter().any(|k| k == column);
        if required {
            return Err(LoadError::MissingValue {
                table: table.spec.name.clone(),
                row: seq,
                column: column.to_string(),
            });
        }
        Ok(Value::Null)
    }

    /// Commit the open batch. Runs after every full batch and at the end of
    /// every table; an empty batch has nothing to commit.
    fn flush(&mut self, table: &str, store: &mut dyn Datastore) -> Result<(), LoadError> {
        if self.pending == 0 {
            return Ok(());
        }
        store.flush().map_err(|err| LoadError::datastore(table, err))?;
        debug!(slot = self.slot, table, rows = self.pending, "batch committed");
        self.report.commits += 1;
        self.pending = 0;
        Ok(())
    }

    fn barrier(&self) -> Result<(), LoadError> {
        match self.gate {
            Some(gate) if !gate.wait() => Err(LoadError::Aborted { slot: self.slot }),
            _ => Ok(()),
        }
    }
}

/// Look up the row `fk` points at. Returns the target key value, if found,
/// and the criteria tried. A criterion with no value is not looked up.
fn resolve(
    fk: &ForeignKey,
    row: &Row,
    table: &str,
    store: &mut dyn Datastore,
) -> Result<(Option<Value>, Vec<(String, Value)>), LoadError> {
    let criteria: Vec<(String, Value)> = fk
        .lookup_pairs()
        .into_iter()
        .map(|pair| {
            let value = row.get(&pair.source).cloned().unwrap_or_default();
            (pair.target, value)
        })
        .collect();
    if criteria.iter().any(|(_, v)| v.is_null()) {
        return Ok((None, criteria));
    }
    let found = store
        .lookup(&fk.target, &criteria)
        .map_err(|err| LoadError::datastore(table, err))?
        .and_then(|mut target| target.remove(&fk.target_key))
        .filter(|v| !v.is_null());
    Ok((found, criteria))
}
