//! Row sources.
//!
//! A source is restartable: every call to [`RowSource::open`] starts a fresh
//! iteration from the first row. Sharded loads open each source once per
//! worker.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use anyhow::Context as _;
use tracing::{debug, warn};

use crate::generator::{GenerationContext, GeneratorSpec, ValueGenerator};
use crate::value::{Row, Value};

/// One item produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Row(Row),
    /// A schema/type marker line. Skipped by the loader and not counted as a row.
    Schema(String),
}

pub type RowIter = Box<dyn Iterator<Item = anyhow::Result<Record>> + Send>;

pub trait RowSource: Send + Sync + fmt::Debug {
    /// Start a fresh pass over the rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying data cannot be opened.
    fn open(&self) -> anyhow::Result<RowIter>;
}

// ---------------------------------------------------------------------------
// In-memory rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Arc<Vec<Row>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: Arc::new(rows) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemorySource {
    fn open(&self) -> anyhow::Result<RowIter> {
        let rows = Arc::clone(&self.rows);
        Ok(Box::new((0..rows.len()).map(move |i| Ok(Record::Row(rows[i].clone())))))
    }
}

/// Build a row from `(column, value)` pairs.
#[must_use]
pub fn row<K, V, I>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

// ---------------------------------------------------------------------------
// CSV files
// ---------------------------------------------------------------------------

/// A CSV file with a header line.
///
/// When `schema_marker` is set, any record whose first field starts with the
/// marker is reported as [`Record::Schema`] instead of a row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    schema_marker: Option<String>,
}

impl CsvSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema_marker: None,
        }
    }

    #[must_use]
    pub fn with_schema_marker(mut self, marker: impl Into<String>) -> Self {
        self.schema_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for CsvSource {
    fn open(&self) -> anyhow::Result<RowIter> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open CSV file: {}", self.path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header: {}", self.path.display()))?
            .clone();
        let marker = self.schema_marker.clone();
        let path = self.path.clone();

        Ok(Box::new(reader.into_records().map(move |record| {
            let record = record.with_context(|| format!("Failed to read CSV record: {}", path.display()))?;
            let first = record.get(0).unwrap_or_default();
            if marker.as_deref().is_some_and(|m| first.starts_with(m)) {
                return Ok(Record::Schema(record.iter().collect::<Vec<_>>().join(",")));
            }
            Ok(Record::Row(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(column, field)| (column.to_string(), Value::from_field(field)))
                    .collect(),
            ))
        })))
    }
}

// ---------------------------------------------------------------------------
// Generated rows
// ---------------------------------------------------------------------------

/// Rows produced on a background thread from column generators.
///
/// The producer feeds a bounded channel of `capacity` rows. Dropping the
/// iterator before it is exhausted stops the producer and joins it.
#[derive(Debug, Clone)]
pub struct GeneratedSource {
    table: String,
    columns: Vec<(String, GeneratorSpec)>,
    rows: u64,
    capacity: usize,
}

impl GeneratedSource {
    #[must_use]
    pub fn new(table: impl Into<String>, rows: u64) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows,
            capacity: 64,
        }
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, generator: GeneratorSpec) -> Self {
        self.columns.push((name.into(), generator));
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl RowSource for GeneratedSource {
    fn open(&self) -> anyhow::Result<RowIter> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let cancel = Arc::new(AtomicBool::new(false));
        let producer = Producer {
            table: self.table.clone(),
            columns: self.columns.clone(),
            rows: self.rows,
            cancel: Arc::clone(&cancel),
        };
        let handle = std::thread::Builder::new()
            .name(format!("tangle-gen-{}", self.table))
            .spawn(move || producer.run(&tx))
            .context("Failed to spawn row generator thread")?;
        Ok(Box::new(GeneratedRows {
            rx: Some(rx),
            cancel,
            handle: Some(handle),
        }))
    }
}

struct Producer {
    table: String,
    columns: Vec<(String, GeneratorSpec)>,
    rows: u64,
    cancel: Arc<AtomicBool>,
}

impl Producer {
    fn run(&self, tx: &SyncSender<anyhow::Result<Record>>) {
        for seq in 0..self.rows {
            if self.cancel.load(Ordering::Relaxed) {
                debug!(table = %self.table, seq, "row generator cancelled");
                return;
            }
            let row = self
                .columns
                .iter()
                .map(|(column, generator)| {
                    let ctx = GenerationContext {
                        table: &self.table,
                        column,
                        seq,
                    };
                    (column.clone(), generator.generate(&ctx))
                })
                .collect();
            if tx.send(Ok(Record::Row(row))).is_err() {
                debug!(table = %self.table, seq, "row consumer went away");
                return;
            }
        }
    }
}

struct GeneratedRows {
    rx: Option<Receiver<anyhow::Result<Record>>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for GeneratedRows {
    type Item = anyhow::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for GeneratedRows {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks a producer waiting on a full channel.
        drop(self.rx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("row generator thread panicked");
            }
        }
    }
}
