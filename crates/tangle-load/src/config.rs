//! Loader settings and plan files.
//!
//! Settings resolve field by field, first hit wins: command line, the plan
//! file's `[loader]` table, `.tangle/config.toml` in the project, the user's
//! `tangle/config.toml`, then defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::plan::TableLoad;
use crate::source::{CsvSource, GeneratedSource, MemorySource};
use crate::spec::TableSpec;
use crate::value::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Rows per commit within a worker.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Parallel workers. 1 runs on the calling thread.
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Skip `depends_on` entries naming tables outside the plan.
    #[serde(default)]
    pub tolerant: bool,
    /// Bound on rows buffered by generated sources.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            shards: default_shards(),
            tolerant: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

const fn default_batch_size() -> usize {
    500
}

const fn default_shards() -> usize {
    1
}

const fn default_channel_capacity() -> usize {
    64
}

/// One configuration layer; unset fields fall through to the next layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialLoaderSettings {
    pub batch_size: Option<usize>,
    pub shards: Option<usize>,
    pub tolerant: Option<bool>,
    pub channel_capacity: Option<usize>,
}

impl PartialLoaderSettings {
    /// Fill unset fields from `lower`.
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            batch_size: self.batch_size.or(lower.batch_size),
            shards: self.shards.or(lower.shards),
            tolerant: self.tolerant.or(lower.tolerant),
            channel_capacity: self.channel_capacity.or(lower.channel_capacity),
        }
    }

    /// Apply defaults. Zero sizes are clamped to one.
    #[must_use]
    pub fn resolve(self) -> LoaderSettings {
        let defaults = LoaderSettings::default();
        LoaderSettings {
            batch_size: self.batch_size.unwrap_or(defaults.batch_size).max(1),
            shards: self.shards.unwrap_or(defaults.shards).max(1),
            tolerant: self.tolerant.unwrap_or(defaults.tolerant),
            channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity).max(1),
        }
    }
}

/// Contents of `.tangle/config.toml` and the user config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TangleConfig {
    #[serde(default)]
    pub loader: PartialLoaderSettings,
    /// Preferred output mode: `pretty`, `text` or `json`.
    #[serde(default)]
    pub output: Option<String>,
}

fn read_config(path: &Path) -> Result<TangleConfig> {
    if !path.exists() {
        return Ok(TangleConfig::default());
    }
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<TangleConfig>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<TangleConfig> {
    read_config(&project_root.join(".tangle/config.toml"))
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<TangleConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(TangleConfig::default());
    };
    read_config(&config_dir.join("tangle/config.toml"))
}

/// Resolve settings from every layer.
///
/// # Errors
///
/// Returns an error if a config file exists but is malformed.
pub fn resolve_settings(
    cli: PartialLoaderSettings,
    plan: PartialLoaderSettings,
    project_root: &Path,
) -> Result<LoaderSettings> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;
    Ok(cli.or(plan).or(project.loader).or(user.loader).resolve())
}

// ---------------------------------------------------------------------------
// Plan files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Relative paths resolve against the plan file's directory.
    Csv {
        path: PathBuf,
        #[serde(default)]
        schema_marker: Option<String>,
    },
    Inline {
        rows: Vec<Row>,
    },
    /// `rows` rows built from the table's column generators.
    Generated {
        rows: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(flatten)]
    pub spec: TableSpec,
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

/// A TOML load plan: optional `[loader]` settings and `[[table]]` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub loader: PartialLoaderSettings,
    #[serde(default, rename = "table")]
    pub tables: Vec<TableConfig>,
    /// Directory relative CSV paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl PlanFile {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut plan: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        plan.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(plan)
    }

    /// Attach row sources to each table.
    #[must_use]
    pub fn into_tables(self, settings: &LoaderSettings) -> Vec<TableLoad> {
        let base_dir = self.base_dir;
        self.tables
            .into_iter()
            .map(|table| {
                let load = TableLoad::new(table.spec);
                match table.source {
                    None => load,
                    Some(SourceConfig::Csv { path, schema_marker }) => {
                        let mut source = CsvSource::new(base_dir.join(path));
                        if let Some(marker) = schema_marker {
                            source = source.with_schema_marker(marker);
                        }
                        load.with_source(source)
                    }
                    Some(SourceConfig::Inline { rows }) => load.with_source(MemorySource::new(rows)),
                    Some(SourceConfig::Generated { rows }) => {
                        let mut source =
                            GeneratedSource::new(load.spec.name.clone(), rows).with_capacity(settings.channel_capacity);
                        for column in &load.spec.columns {
                            if let Some(generator) = &column.generator {
                                source = source.column(column.name.clone(), generator.clone());
                            }
                        }
                        load.with_source(source)
                    }
                }
            })
            .collect()
    }
}
