use crate::types::{Estado, Operation, Role};

/// Errors produced by the leak-flow calculator and pressure table loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeakFlowError {
    /// The operating pressure is absent, not finite, too large to represent,
    /// or cannot be interpolated against the table without overflow.
    /// Callers must not persist a flow value in this case.
    #[error("invalid pressure input: {reason}")]
    InvalidInput { reason: String },

    /// The pressure table is empty, unsorted, has duplicate PSI keys or
    /// carries a negative flow value.
    #[error("invalid pressure table: {reason}")]
    InvalidConfiguration { reason: String },
}

/// Guard violations raised by the review workflow and the access checks.
///
/// None of these are retryable: the record is left untouched and the caller
/// decides what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// The event is not defined for the current state.
    #[error("cannot {operation} a cartilla in state {state}")]
    InvalidTransition { state: Estado, operation: Operation },

    /// The actor lacks the role or ownership required for the operation.
    #[error("actor '{actor_id}' ({role}) is not allowed to {operation} this cartilla")]
    Forbidden {
        actor_id: String,
        role: Role,
        operation: Operation,
    },

    /// Edit or delete attempted by a non-admin owner outside `BORRADOR`.
    #[error("cannot {operation} a cartilla in state {state}; only BORRADOR cartillas can be changed")]
    InvalidState { state: Estado, operation: Operation },

    /// Rejection attempted without a non-blank comment.
    #[error("a comment is required to reject a cartilla")]
    MissingComment,
}
