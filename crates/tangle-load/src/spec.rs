//! Table metadata: columns, foreign keys, natural keys, dependencies.

use serde::{Deserialize, Serialize};

use crate::generator::GeneratorSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorSpec>,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            generator: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn generated(mut self, generator: GeneratorSpec) -> Self {
        self.generator = Some(generator);
        self
    }
}

/// One lookup criterion: the value of `source` in the incoming row must equal
/// column `target` of the referenced table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupPair {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Column written on this table.
    pub column: String,
    /// Referenced table.
    pub target: String,
    /// Empty means "the row already carries the key in `column`".
    #[serde(default)]
    pub lookup: Vec<LookupPair>,
    #[serde(default = "default_target_key")]
    pub target_key: String,
    #[serde(default)]
    pub nullable: bool,
}

fn default_target_key() -> String {
    "id".to_string()
}

impl ForeignKey {
    #[must_use]
    pub fn new(column: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            target: target.into(),
            lookup: Vec::new(),
            target_key: default_target_key(),
            nullable: false,
        }
    }

    #[must_use]
    pub fn by(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.lookup.push(LookupPair {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The effective lookup criteria.
    #[must_use]
    pub fn lookup_pairs(&self) -> Vec<LookupPair> {
        if self.lookup.is_empty() {
            vec![LookupPair {
                source: self.column.clone(),
                target: self.target_key.clone(),
            }]
        } else {
            self.lookup.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    /// Entity type this table stores, for reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub natural_key: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TableSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            natural_key: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    #[must_use]
    pub fn key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn after(mut self, table: impl Into<String>) -> Self {
        self.depends_on.push(table.into());
        self
    }

    pub fn required_fks(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(|fk| !fk.nullable)
    }

    pub fn nullable_fks(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(|fk| fk.nullable)
    }

    #[must_use]
    pub fn has_nullable_fks(&self) -> bool {
        self.foreign_keys.iter().any(|fk| fk.nullable)
    }

    #[must_use]
    pub fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Columns named in the insert statement: declared columns followed by
    /// required foreign key columns not declared. Nullable foreign key
    /// columns are left out and filled by the update pass.
    #[must_use]
    pub fn insert_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| self.foreign_key_for(&c.name).is_none_or(|fk| !fk.nullable))
            .map(|c| c.name.clone())
            .collect();
        for fk in self.required_fks() {
            if !columns.contains(&fk.column) {
                columns.push(fk.column.clone());
            }
        }
        columns
    }

    /// Every column the table writes, in either pass.
    #[must_use]
    pub fn all_columns(&self) -> Vec<String> {
        let mut columns = self.insert_columns();
        for fk in self.nullable_fks() {
            if !columns.contains(&fk.column) {
                columns.push(fk.column.clone());
            }
        }
        columns
    }
}
