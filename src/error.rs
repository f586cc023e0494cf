//! Error taxonomy for graph construction and execution.

use uuid::Uuid;

/// Errors raised while building or executing a task graph.
///
/// `ReferenceRejected` is the one retryable signal: the engine catches it
/// internally and resubmits the node once with materialized arguments.
/// Every other variant is terminal for the node that raised it and is
/// wrapped into `ParentFailed` for each dependent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("node {0} is already registered")]
    DuplicateNode(Uuid),

    #[error("node name '{0}' is already in use")]
    DuplicateName(String),

    #[error("dependency cycle involving nodes [{}]", format_ids(.0))]
    Cycle(Vec<Uuid>),

    #[error("input '{0}' has no supplied value and no default")]
    MissingInput(String),

    #[error("node '{node}' failed: {message}")]
    NodeExecution { node: String, message: String },

    #[error("parent node '{parent}' failed: {cause}")]
    ParentFailed {
        parent: String,
        parent_id: Uuid,
        cause: Box<TaskError>,
    },

    #[error("stored argument reference rejected: {0}")]
    ReferenceRejected(String),

    #[error("wait timed out after {0} ms")]
    Timeout(u64),

    #[error("node '{0}' was cancelled")]
    Cancelled(String),

    #[error("node '{node}' carries inline work and cannot be compiled; register the function with the remote executor instead")]
    InlineWork { node: String },

    #[error("unknown node {0}")]
    UnknownNode(Uuid),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Internal(String),
}

impl TaskError {
    /// Walk a `ParentFailed` chain down to the originating failure.
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::ParentFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// The directly failing ancestor recorded on a `ParentFailed` error.
    pub fn failed_parent(&self) -> Option<Uuid> {
        match self {
            TaskError::ParentFailed { parent_id, .. } => Some(*parent_id),
            _ => None,
        }
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_parent_chain() {
        let origin = TaskError::NodeExecution {
            node: "a".into(),
            message: "division by zero".into(),
        };
        let parent_id = Uuid::new_v4();
        let wrapped = TaskError::ParentFailed {
            parent: "a".into(),
            parent_id,
            cause: Box::new(origin.clone()),
        };
        let doubled = TaskError::ParentFailed {
            parent: "b".into(),
            parent_id: Uuid::new_v4(),
            cause: Box::new(wrapped.clone()),
        };

        assert!(matches!(
            doubled.root_cause(),
            TaskError::NodeExecution { node, .. } if node == "a"
        ));
        assert_eq!(wrapped.failed_parent(), Some(parent_id));
        assert_eq!(origin.failed_parent(), None);
    }

    #[test]
    fn cycle_error_names_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = TaskError::Cycle(vec![a, b]);
        let rendered = err.to_string();
        assert!(rendered.contains(&a.to_string()));
        assert!(rendered.contains(&b.to_string()));
    }
}
