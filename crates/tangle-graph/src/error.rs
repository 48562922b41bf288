use std::fmt;

use crate::graph::{EdgeId, Pair, VertexId};

/// Machine-readable error codes shared by every tangle crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ModelInvalid,
    PlanInvalid,
    UnknownVertex,
    MissingVertex,
    MissingEdge,
    PairConflict,
    ReversalMismatch,
    CycleDetected,
    InvalidPath,
    UnresolvedForeignKey,
    MissingDependency,
    MissingNaturalKey,
    MissingValue,
    SourceReadFailed,
    DatastoreFailed,
    WorkerAborted,
    PersistFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ModelInvalid => "E1002",
            Self::PlanInvalid => "E1003",
            Self::UnknownVertex => "E2001",
            Self::MissingVertex => "E2002",
            Self::MissingEdge => "E2003",
            Self::PairConflict => "E2004",
            Self::ReversalMismatch => "E2005",
            Self::CycleDetected => "E2006",
            Self::InvalidPath => "E2007",
            Self::UnresolvedForeignKey => "E3001",
            Self::MissingDependency => "E3002",
            Self::MissingNaturalKey => "E3003",
            Self::MissingValue => "E3004",
            Self::SourceReadFailed => "E4001",
            Self::DatastoreFailed => "E4002",
            Self::WorkerAborted => "E4003",
            Self::PersistFailed => "E4004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ModelInvalid => "Invalid type model",
            Self::PlanInvalid => "Invalid load plan",
            Self::UnknownVertex => "Unknown vertex handle",
            Self::MissingVertex => "No vertex with that id",
            Self::MissingEdge => "Unknown or unlinked edge",
            Self::PairConflict => "Edge claimed by two vertex pairs",
            Self::ReversalMismatch => "Edge reversal endpoint mismatch",
            Self::CycleDetected => "Dependency cycle through a concrete type",
            Self::InvalidPath => "Malformed property path",
            Self::UnresolvedForeignKey => "Required foreign key not found",
            Self::MissingDependency => "Dependency table not in plan",
            Self::MissingNaturalKey => "Natural key required for updates",
            Self::MissingValue => "Required column has no value",
            Self::SourceReadFailed => "Row source read failed",
            Self::DatastoreFailed => "Datastore operation failed",
            Self::WorkerAborted => "Worker aborted after a sibling failure",
            Self::PersistFailed => "Persistence collaborator failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix the TOML syntax and retry."),
            Self::ModelInvalid => Some("Check property targets and parent names in the model file."),
            Self::PlanInvalid => Some("Check table names and foreign key declarations in the plan."),
            Self::UnknownVertex
            | Self::MissingVertex
            | Self::MissingEdge
            | Self::PairConflict
            | Self::ReversalMismatch => Some("This is a graph contract violation; report a bug with logs."),
            Self::CycleDetected => {
                Some("Make one relationship in the reported cycle nullable, or mark the type abstract.")
            }
            Self::InvalidPath => Some("Use dot-separated property names, e.g. `customer.address`."),
            Self::UnresolvedForeignKey => {
                Some("Load the referenced table first or fix the lookup values in the source.")
            }
            Self::MissingDependency => Some("Add the table to the plan or rerun with --tolerant."),
            Self::MissingNaturalKey => Some("Declare `natural_key` for tables with nullable foreign keys."),
            Self::MissingValue => Some("Supply the column in the source or attach a generator."),
            Self::SourceReadFailed => Some("Check the source file path and format."),
            Self::DatastoreFailed => Some("Check the database schema and write permissions."),
            Self::WorkerAborted => None,
            Self::PersistFailed => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The vertex chain and edge names of a cycle found during a topological sort.
///
/// `vertices` is closed: the first and last entries name the same vertex.
/// `breadcrumbs[i]` is the name of the edge from `vertices[i]` to
/// `vertices[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleTrace {
    pub vertices: Vec<String>,
    pub breadcrumbs: Vec<String>,
}

impl CycleTrace {
    /// Number of distinct vertices on the cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if any vertex on the cycle carries `label`.
    #[must_use]
    pub fn mentions(&self, label: &str) -> bool {
        self.vertices.iter().any(|v| v == label)
    }
}

impl fmt::Display for CycleTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle detected ({} vertices): ", self.len())?;
        for (idx, vertex) in self.vertices.iter().enumerate() {
            if idx > 0 {
                let crumb = self.breadcrumbs.get(idx - 1).map_or("?", String::as_str);
                write!(f, " -[{crumb}]-> ")?;
            }
            write!(f, "{vertex}")?;
        }
        Ok(())
    }
}

/// Structural graph errors. All of them except [`GraphError::Cycle`] are
/// contract violations by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A vertex handle that was never issued by this graph.
    #[error("unknown vertex handle {0}")]
    UnknownVertex(VertexId),

    /// No vertex currently carries the requested order id.
    #[error("no vertex with id {0}")]
    MissingVertex(usize),

    /// The edge was removed, never existed, or is not linked.
    #[error("unknown or unlinked edge {0}")]
    MissingEdge(EdgeId),

    /// An edge claimed a pair different from the one it is registered under.
    #[error("edge {edge} is registered under {recorded} but was claimed for {claimed}")]
    PairConflict {
        edge: EdgeId,
        recorded: Pair,
        claimed: Pair,
    },

    /// The endpoints recorded for an edge disagree with its pair bucket.
    #[error("cannot reverse edge {edge}: recorded endpoints {recorded}, linked under {linked}")]
    ReversalMismatch {
        edge: EdgeId,
        recorded: Pair,
        linked: Pair,
    },

    /// The internal indices disagree with each other.
    #[error("graph indices inconsistent: {0}")]
    Inconsistent(String),

    /// A cycle through a concrete vertex prevented a topological order.
    #[error("{0}")]
    Cycle(CycleTrace),
}

impl GraphError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownVertex(_) => ErrorCode::UnknownVertex,
            Self::MissingVertex(_) => ErrorCode::MissingVertex,
            Self::MissingEdge(_) => ErrorCode::MissingEdge,
            Self::PairConflict { .. } => ErrorCode::PairConflict,
            Self::ReversalMismatch { .. } => ErrorCode::ReversalMismatch,
            Self::Inconsistent(_) => ErrorCode::InternalUnexpected,
            Self::Cycle(_) => ErrorCode::CycleDetected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::ModelInvalid,
            ErrorCode::PlanInvalid,
            ErrorCode::UnknownVertex,
            ErrorCode::MissingVertex,
            ErrorCode::MissingEdge,
            ErrorCode::PairConflict,
            ErrorCode::ReversalMismatch,
            ErrorCode::CycleDetected,
            ErrorCode::InvalidPath,
            ErrorCode::UnresolvedForeignKey,
            ErrorCode::MissingDependency,
            ErrorCode::MissingNaturalKey,
            ErrorCode::MissingValue,
            ErrorCode::SourceReadFailed,
            ErrorCode::DatastoreFailed,
            ErrorCode::WorkerAborted,
            ErrorCode::PersistFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::CycleDetected.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn cycle_trace_display_lists_vertices_and_edges() {
        let trace = CycleTrace {
            vertices: vec!["Order".into(), "Customer".into(), "Order".into()],
            breadcrumbs: vec!["customer".into(), "lastOrder".into()],
        };
        assert_eq!(trace.len(), 2);
        let display = trace.to_string();
        assert!(display.contains("Order -[customer]-> Customer"), "display: {display}");
        assert!(display.contains("Customer -[lastOrder]-> Order"), "display: {display}");
    }

    #[test]
    fn cycle_error_maps_to_cycle_code() {
        let err = GraphError::Cycle(CycleTrace {
            vertices: vec!["A".into(), "A".into()],
            breadcrumbs: vec!["self".into()],
        });
        assert_eq!(err.code(), ErrorCode::CycleDetected);
    }
}
