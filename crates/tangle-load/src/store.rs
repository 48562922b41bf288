//! Datastores the loader writes into.
//!
//! # Overview
//!
//! - [`Datastore`]: lookup / insert / update / flush, one instance per worker.
//! - [`SqliteStore`]: a SQLite file in WAL mode. A write transaction opens
//!   lazily on the first write and commits on [`Datastore::flush`].
//! - [`MemoryStore`]: shared in-memory tables; clones see the same data.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::value::{Row, Value};

/// Busy timeout applied to every SQLite connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Datastore {
    /// First row of `table` whose columns equal every `(column, value)` criterion.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn lookup(&mut self, table: &str, criteria: &[(String, Value)]) -> Result<Option<Row>>;

    /// Insert one row with an explicit column list.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()>;

    /// Update `columns` on the rows matching `key`. Returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn update(&mut self, table: &str, columns: &[String], values: &[Value], key: &[(String, Value)]) -> Result<usize>;

    /// Commit pending writes. The loader skips the call when a batch is
    /// empty, since an empty batch needs no commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn flush(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Quote an identifier for SQLite.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn where_clause(key: &[(String, Value)], first_param: usize) -> String {
    key.iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), first_param + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Open (or create) a SQLite database for loading.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the database
/// cannot be opened, or pragma configuration fails.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create db parent dir {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("PRAGMA foreign_keys = ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("PRAGMA synchronous = NORMAL")?;

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("PRAGMA journal_mode = WAL")?;
    if !journal_mode.eq_ignore_ascii_case("wal") && !journal_mode.eq_ignore_ascii_case("memory") {
        bail!("expected WAL journal mode, sqlite reported '{journal_mode}'");
    }

    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("set sqlite busy timeout")?;
    Ok(())
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteStore {
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_database(path)?))
    }

    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create `table` with untyped columns if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn ensure_table(&self, table: &str, columns: &[String]) -> Result<()> {
        let columns = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let sql = format!("CREATE TABLE IF NOT EXISTS {} ({columns})", quote_ident(table));
        self.conn
            .execute_batch(&sql)
            .with_context(|| format!("create table {table}"))
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .context("BEGIN IMMEDIATE")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Datastore for SqliteStore {
    fn lookup(&mut self, table: &str, criteria: &[(String, Value)]) -> Result<Option<Row>> {
        let sql = format!("SELECT * FROM {} WHERE {} LIMIT 1", quote_ident(table), where_clause(criteria, 1));
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .with_context(|| format!("prepare lookup on {table}"))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt
            .query(params_from_iter(criteria.iter().map(|(_, v)| v)))
            .with_context(|| format!("lookup on {table}"))?;
        let Some(found) = rows.next().with_context(|| format!("read lookup row from {table}"))? else {
            return Ok(None);
        };
        let mut out = Row::new();
        for (i, name) in names.into_iter().enumerate() {
            out.insert(name, found.get::<_, Value>(i)?);
        }
        Ok(Some(out))
    }

    fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.begin()?;
        let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        );
        self.conn
            .prepare_cached(&sql)
            .with_context(|| format!("prepare insert into {table}"))?
            .execute(params_from_iter(values))
            .with_context(|| format!("insert into {table}"))?;
        Ok(())
    }

    fn update(&mut self, table: &str, columns: &[String], values: &[Value], key: &[(String, Value)]) -> Result<usize> {
        self.begin()?;
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {}",
            quote_ident(table),
            where_clause(key, columns.len() + 1)
        );
        let params = values.iter().chain(key.iter().map(|(_, v)| v));
        let affected = self
            .conn
            .prepare_cached(&sql)
            .with_context(|| format!("prepare update on {table}"))?
            .execute(params_from_iter(params))
            .with_context(|| format!("update {table}"))?;
        Ok(affected)
    }

    fn flush(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT").context("COMMIT")?;
            self.in_transaction = false;
            debug!("sqlite transaction committed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory tables. Writes are visible immediately; `flush` only counts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTables>>,
}

#[derive(Debug, Default)]
struct MemoryTables {
    tables: BTreeMap<String, Vec<Row>>,
    flushes: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryTables) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Snapshot of a table's rows, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.with(|t| t.tables.get(table).cloned().unwrap_or_default())
    }

    #[must_use]
    pub fn flushes(&self) -> usize {
        self.with(|t| t.flushes)
    }
}

fn matches(row: &Row, criteria: &[(String, Value)]) -> bool {
    criteria
        .iter()
        .all(|(column, value)| row.get(column).is_some_and(|v| !v.is_null() && v == value))
}

impl Datastore for MemoryStore {
    fn lookup(&mut self, table: &str, criteria: &[(String, Value)]) -> Result<Option<Row>> {
        Ok(self.with(|t| {
            t.tables
                .get(table)
                .and_then(|rows| rows.iter().find(|row| matches(row, criteria)).cloned())
        }))
    }

    fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        if columns.len() != values.len() {
            bail!("insert into {table}: {} columns but {} values", columns.len(), values.len());
        }
        let row: Row = columns.iter().cloned().zip(values.iter().cloned()).collect();
        self.with(|t| t.tables.entry(table.to_string()).or_default().push(row));
        Ok(())
    }

    fn update(&mut self, table: &str, columns: &[String], values: &[Value], key: &[(String, Value)]) -> Result<usize> {
        Ok(self.with(|t| {
            let Some(rows) = t.tables.get_mut(table) else {
                return 0;
            };
            let mut affected = 0;
            for row in rows.iter_mut().filter(|row| matches(row, key)) {
                for (column, value) in columns.iter().zip(values) {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
            affected
        }))
    }

    fn flush(&mut self) -> Result<()> {
        self.with(|t| t.flushes += 1);
        Ok(())
    }
}
