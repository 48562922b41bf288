//! Value generators for columns a source leaves empty.
//!
//! Generators are keyed on the absolute row sequence within a table, so a
//! `sequence` column regenerates the same value in the update pass as it
//! did during insert.

use std::collections::HashMap;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Where a generated value is going.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub seq: u64,
}

/// Produces a value for a column that has no data.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, ctx: &GenerationContext<'_>) -> Value;

    /// Whether the same context always yields the same value.
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Declarative generator attached to a column in a plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorSpec {
    Sequence {
        #[serde(default = "default_start")]
        start: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    Constant {
        value: Value,
    },
    RandomInt {
        min: i64,
        max: i64,
    },
    RandomText {
        #[serde(default = "default_text_len")]
        len: usize,
    },
    /// `{seq}`, `{table}` and `{column}` are substituted.
    Template {
        template: String,
    },
}

const fn default_start() -> i64 {
    1
}

const fn default_step() -> i64 {
    1
}

const fn default_text_len() -> usize {
    12
}

impl ValueGenerator for GeneratorSpec {
    fn generate(&self, ctx: &GenerationContext<'_>) -> Value {
        match self {
            Self::Sequence { start, step } => {
                let seq = i64::try_from(ctx.seq).unwrap_or(i64::MAX);
                Value::Integer(start.saturating_add(step.saturating_mul(seq)))
            }
            Self::Constant { value } => value.clone(),
            Self::RandomInt { min, max } => {
                let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
                Value::Integer(rand::thread_rng().gen_range(lo..=hi))
            }
            Self::RandomText { len } => Value::Text(
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(*len)
                    .map(char::from)
                    .collect(),
            ),
            Self::Template { template } => Value::Text(
                template
                    .replace("{seq}", &ctx.seq.to_string())
                    .replace("{table}", ctx.table)
                    .replace("{column}", ctx.column),
            ),
        }
    }

    fn is_deterministic(&self) -> bool {
        !matches!(self, Self::RandomInt { .. } | Self::RandomText { .. })
    }
}

/// Per-run generator overrides, keyed by `(table, column)`.
///
/// An override wins over the generator declared on the column.
#[derive(Default)]
pub struct GeneratorOverlay {
    overrides: HashMap<(String, String), Box<dyn ValueGenerator>>,
}

impl GeneratorOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        generator: impl ValueGenerator + 'static,
    ) -> Self {
        self.overrides.insert((table.into(), column.into()), Box::new(generator));
        self
    }

    /// The generator to use for `table.column`, if any.
    #[must_use]
    pub fn resolve<'a>(
        &'a self,
        table: &str,
        column: &str,
        declared: Option<&'a GeneratorSpec>,
    ) -> Option<&'a dyn ValueGenerator> {
        if let Some(generator) = self.overrides.get(&(table.to_string(), column.to_string())) {
            let generator: &'a dyn ValueGenerator = &**generator;
            return Some(generator);
        }
        declared.map(|spec| spec as &dyn ValueGenerator)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl std::fmt::Debug for GeneratorOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.overrides.keys().collect();
        keys.sort();
        f.debug_struct("GeneratorOverlay").field("overrides", &keys).finish()
    }
}
