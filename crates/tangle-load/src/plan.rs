//! Table ordering for a load.
//!
//! Every required foreign key and every `depends_on` entry adds an edge from
//! the referenced table to the referencing one, so a strict topological sort
//! yields a safe insert order. Nullable foreign keys add no edge: they are
//! filled by the update pass once every table has rows.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tangle_graph::{CyclePolicy, Graph, Link, topological_sort};
use tracing::{debug, instrument, warn};

use crate::error::LoadError;
use crate::source::RowSource;
use crate::spec::TableSpec;

/// Table metadata plus where its rows come from.
#[derive(Clone)]
pub struct TableLoad {
    pub spec: TableSpec,
    pub source: Option<Arc<dyn RowSource>>,
}

impl TableLoad {
    #[must_use]
    pub const fn new(spec: TableSpec) -> Self {
        Self { spec, source: None }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl RowSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl fmt::Debug for TableLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLoad")
            .field("spec", &self.spec)
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPass {
    Insert,
    Update,
}

impl fmt::Display for LoadPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
        })
    }
}

/// A dependency declaration dropped in tolerant mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDependency {
    pub table: String,
    pub dependency: String,
}

#[derive(Debug)]
pub struct LoadPlan {
    tables: Vec<TableLoad>,
    /// Indices into `tables`, dependencies first.
    order: Vec<usize>,
    skipped: Vec<SkippedDependency>,
}

impl LoadPlan {
    /// Validate `tables` and compute the insert order.
    ///
    /// With `tolerant`, a `depends_on` entry naming a table outside the plan
    /// is logged and skipped instead of failing.
    ///
    /// # Errors
    ///
    /// Fails on duplicate table names, required self references, missing
    /// dependencies (strict mode), nullable foreign keys without a natural
    /// key, and dependency cycles.
    #[instrument(skip(tables), fields(tables = tables.len()))]
    pub fn build(tables: Vec<TableLoad>, tolerant: bool) -> Result<Self, LoadError> {
        let mut index = BTreeMap::new();
        for (i, table) in tables.iter().enumerate() {
            if index.insert(table.name().to_string(), i).is_some() {
                return Err(LoadError::Plan(format!("table `{}` declared twice", table.name())));
            }
        }

        let mut graph: Graph<String, Link> = Graph::new();
        for table in &tables {
            graph.add_vertex(table.name().to_string());
        }

        let mut skipped = Vec::new();
        for table in &tables {
            let spec = &table.spec;
            let name = spec.name.clone();

            if spec.has_nullable_fks() && spec.natural_key.is_empty() {
                return Err(LoadError::MissingNaturalKey(name));
            }

            for fk in spec.required_fks() {
                if fk.target == spec.name {
                    return Err(LoadError::Plan(format!(
                        "required foreign key `{}.{}` references its own table; declare it nullable",
                        spec.name, fk.column
                    )));
                }
                if index.contains_key(&fk.target) {
                    graph.connect(fk.target.clone(), name.clone(), Link::named(fk.column.clone()));
                } else {
                    debug!(table = %spec.name, target = %fk.target, "foreign key target outside plan, assumed loaded");
                }
            }

            for dependency in &spec.depends_on {
                if index.contains_key(dependency) {
                    graph.connect(dependency.clone(), name.clone(), Link::named("depends_on"));
                } else if tolerant {
                    warn!(table = %spec.name, %dependency, "dependency not in plan, skipping");
                    skipped.push(SkippedDependency {
                        table: name.clone(),
                        dependency: dependency.clone(),
                    });
                } else {
                    return Err(LoadError::MissingDependency {
                        table: name,
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let sorted = topological_sort(&mut graph, CyclePolicy::Strict)?;
        let order = sorted
            .order
            .iter()
            .filter_map(|&v| graph.vertex(v))
            .filter_map(|name| index.get(name).copied())
            .collect();

        Ok(Self {
            tables,
            order,
            skipped,
        })
    }

    /// Tables in insert order.
    pub fn order(&self) -> impl Iterator<Item = &TableLoad> + '_ {
        self.order.iter().map(|&i| &self.tables[i])
    }

    /// Table names in insert order.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.order().map(TableLoad::name).collect()
    }

    /// Tables revisited by the update pass, in insert order.
    pub fn update_tables(&self) -> impl Iterator<Item = &TableLoad> + '_ {
        self.order().filter(|t| t.spec.has_nullable_fks())
    }

    /// Every `(pass, table)` step of a run: all inserts, then all updates.
    #[must_use]
    pub fn steps(&self) -> Vec<(LoadPass, &TableLoad)> {
        self.order()
            .map(|t| (LoadPass::Insert, t))
            .chain(self.update_tables().map(|t| (LoadPass::Update, t)))
            .collect()
    }

    #[must_use]
    pub fn skipped(&self) -> &[SkippedDependency] {
        &self.skipped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
