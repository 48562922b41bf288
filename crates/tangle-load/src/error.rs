use tangle_graph::{ErrorCode, GraphError};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while planning or running a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid plan: {0}")]
    Plan(String),

    #[error("table `{table}` depends on `{dependency}`, which is not in the plan")]
    MissingDependency { table: String, dependency: String },

    #[error("table `{0}` has nullable foreign keys but declares no natural key")]
    MissingNaturalKey(String),

    #[error("{table} row {row}: required foreign key `{column}` -> `{target}` not found (tried {attempted})")]
    UnresolvedForeignKey {
        table: String,
        row: u64,
        column: String,
        target: String,
        attempted: String,
    },

    #[error("{table} row {row}: required column `{column}` has no value")]
    MissingValue { table: String, row: u64, column: String },

    #[error("reading rows for `{table}`: {source}")]
    Source {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("datastore failed on `{table}`: {source}")]
    Datastore {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("worker {slot} aborted after a sibling worker failed")]
    Aborted { slot: usize },

    #[error("worker {slot} panicked")]
    Panicked { slot: usize },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl LoadError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Plan(_) => ErrorCode::PlanInvalid,
            Self::MissingDependency { .. } => ErrorCode::MissingDependency,
            Self::MissingNaturalKey(_) => ErrorCode::MissingNaturalKey,
            Self::UnresolvedForeignKey { .. } => ErrorCode::UnresolvedForeignKey,
            Self::MissingValue { .. } => ErrorCode::MissingValue,
            Self::Source { .. } => ErrorCode::SourceReadFailed,
            Self::Datastore { .. } => ErrorCode::DatastoreFailed,
            Self::Aborted { .. } => ErrorCode::WorkerAborted,
            Self::Panicked { .. } => ErrorCode::InternalUnexpected,
            Self::Graph(err) => err.code(),
        }
    }

    pub(crate) fn source(table: &str, err: anyhow::Error) -> Self {
        Self::Source {
            table: table.to_string(),
            source: err.into(),
        }
    }

    pub(crate) fn datastore(table: &str, err: anyhow::Error) -> Self {
        Self::Datastore {
            table: table.to_string(),
            source: err.into(),
        }
    }

    /// True for secondary errors caused by another worker's failure.
    #[must_use]
    pub const fn is_secondary(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
