use tangle_graph::{ErrorCode, GraphError};

use crate::object::ObjectId;

/// Errors raised by the type and object layers.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("type `{owner}` has no property `{property}`")]
    UnknownProperty { owner: String, property: String },

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error("malformed path `{0}`")]
    InvalidPath(String),

    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{action} of {object} failed: {source}")]
    Persist {
        action: &'static str,
        object: ObjectId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ModelError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownType(_) | Self::UnknownProperty { .. } | Self::Invalid(_) => ErrorCode::ModelInvalid,
            Self::InvalidPath(_) => ErrorCode::InvalidPath,
            Self::UnknownObject(_) => ErrorCode::InternalUnexpected,
            Self::Graph(err) => err.code(),
            Self::Persist { .. } => ErrorCode::PersistFailed,
        }
    }

    pub(crate) fn persist(action: &'static str, object: ObjectId, source: anyhow::Error) -> Self {
        Self::Persist {
            action,
            object,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_graph::CycleTrace;

    #[test]
    fn graph_errors_keep_their_code() {
        let err: ModelError = GraphError::Cycle(CycleTrace {
            vertices: vec!["A".into(), "B".into(), "A".into()],
            breadcrumbs: vec!["b".into(), "a".into()],
        })
        .into();
        assert_eq!(err.code(), ErrorCode::CycleDetected);
        assert!(err.to_string().contains("A -[b]-> B"));
    }

    #[test]
    fn persist_error_wraps_the_collaborator_error() {
        let err = ModelError::persist("save", ObjectId::new(3), anyhow::anyhow!("disk full"));
        assert_eq!(err.code(), ErrorCode::PersistFailed);
        assert_eq!(err.to_string(), "save of #3 failed: disk full");
    }
}
