use cartilla_core::{LeakFlowError, WorkflowError};
use cartilla_storage::StorageError;

/// Everything a [`CartillaService`](crate::CartillaService) call can fail with.
///
/// Guard and input errors pass through from `cartilla-core` unchanged; storage
/// errors are split into the cases the boundary layer reports differently.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    LeakFlow(#[from] LeakFlowError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A required field is empty.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// Another writer changed the record between our read and our commit.
    #[error("{entity} {id} was modified concurrently; reload and try again")]
    Conflict { entity: String, id: String },

    #[error("cartilla not found: {id}")]
    NotFound { id: String },

    #[error("UOM number already in use: {uom_numero}")]
    DuplicateUom { uom_numero: String },

    /// A stored document could not be decoded or a record could not be encoded.
    #[error("cartilla {id} could not be (de)serialized: {reason}")]
    Record { id: String, reason: String },

    #[error(transparent)]
    Storage(StorageError),
}

impl ServiceError {
    /// Only a lost optimistic-concurrency race is worth retrying, after the
    /// caller reloads the record. The service itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }

    pub(crate) fn record(id: &str, reason: impl std::fmt::Display) -> Self {
        ServiceError::Record {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ConcurrentConflict { entity, id, .. } => {
                ServiceError::Conflict { entity, id }
            }
            StorageError::CartillaNotFound { id } => ServiceError::NotFound { id },
            StorageError::DuplicateUom { uom_numero } => ServiceError::DuplicateUom { uom_numero },
            other => ServiceError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartilla_core::{Estado, Operation};

    #[test]
    fn storage_errors_map_to_service_errors() {
        let conflict: ServiceError = StorageError::ConcurrentConflict {
            entity: "cartilla".to_string(),
            id: "c-1".to_string(),
            expected_version: 3,
        }
        .into();
        assert!(matches!(conflict, ServiceError::Conflict { ref id, .. } if id == "c-1"));

        let missing: ServiceError = StorageError::CartillaNotFound {
            id: "c-2".to_string(),
        }
        .into();
        assert!(matches!(missing, ServiceError::NotFound { ref id } if id == "c-2"));

        let dup: ServiceError = StorageError::DuplicateUom {
            uom_numero: "UOM-1".to_string(),
        }
        .into();
        assert!(matches!(dup, ServiceError::DuplicateUom { .. }));

        let backend: ServiceError = StorageError::Backend("down".to_string()).into();
        assert!(matches!(backend, ServiceError::Storage(_)));
    }

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = ServiceError::Conflict {
            entity: "cartilla".to_string(),
            id: "c-1".to_string(),
        };
        assert!(conflict.is_retryable());

        let not_retryable = [
            ServiceError::Workflow(WorkflowError::MissingComment),
            ServiceError::Workflow(WorkflowError::InvalidTransition {
                state: Estado::Approved,
                operation: Operation::Approve,
            }),
            ServiceError::LeakFlow(LeakFlowError::InvalidInput {
                reason: "absent".to_string(),
            }),
            ServiceError::NotFound {
                id: "c-1".to_string(),
            },
            ServiceError::Storage(StorageError::Backend("down".to_string())),
        ];
        for e in not_retryable {
            assert!(!e.is_retryable(), "{e}");
        }
    }

    #[test]
    fn core_errors_display_unchanged() {
        let e = ServiceError::from(WorkflowError::MissingComment);
        assert_eq!(e.to_string(), "a comment is required to reject a cartilla");
    }
}
