/// All errors that can be returned by a CartillaStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: the stored version no longer
    /// matches the version the caller read.
    #[error("concurrent conflict on {entity} {id}: expected version {expected_version}")]
    ConcurrentConflict {
        entity: String,
        id: String,
        expected_version: i64,
    },

    /// No cartilla with the given id.
    #[error("cartilla not found: {id}")]
    CartillaNotFound { id: String },

    /// A cartilla with this id already exists.
    #[error("cartilla already exists: {id}")]
    AlreadyExists { id: String },

    /// Another cartilla already uses this UOM number.
    #[error("UOM number already in use: {uom_numero}")]
    DuplicateUom { uom_numero: String },

    /// A backend-specific storage error (connection, serialization, lock poisoning).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrentConflict { .. })
    }
}
