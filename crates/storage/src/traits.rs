use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AuditEventRecord, CartillaQuery, CartillaRecord, PressureTableRecord};

/// The storage trait for cartilla backends.
///
/// A `CartillaStorage` implementation provides durable, transactional storage
/// for cartilla records, their audit log and the shared pressure table.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returning a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// Writes staged in a snapshot are invisible to the query methods until the
/// snapshot commits. A commit is all-or-nothing. If a `Snapshot` is dropped
/// without committing, nothing it staged may become visible.
///
/// ## OCC Conflict Detection
///
/// `update_cartilla`, `delete_cartilla` and `put_pressure_table` are
/// conditional on the caller's expected version (`UPDATE ... WHERE version =
/// expected_version`). A mismatch, whether seen when the write is staged or
/// when the snapshot commits, is `StorageError::ConcurrentConflict` and
/// leaves the stored data untouched.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// across async tasks behind an `Arc`.
#[async_trait]
pub trait CartillaStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all of its writes durable at once.
    ///
    /// Re-checks every staged version and uniqueness condition against the
    /// latest committed state; on failure nothing is written.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all staged writes.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Cartilla writes (within snapshot) ────────────────────────────────────

    /// Insert a new cartilla at version 0. The record's `version` is ignored.
    ///
    /// Returns `AlreadyExists` for a taken id and `DuplicateUom` for a taken
    /// UOM number.
    async fn insert_cartilla(
        &self,
        snapshot: &mut Self::Snapshot,
        record: CartillaRecord,
    ) -> Result<(), StorageError>;

    /// Read a cartilla as seen by this snapshot, including its version.
    ///
    /// Returns `CartillaNotFound` if it does not exist.
    async fn get_cartilla_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
    ) -> Result<CartillaRecord, StorageError>;

    /// Replace a cartilla if its stored version is `expected_version`.
    ///
    /// Returns the new version (`expected_version + 1`).
    async fn update_cartilla(
        &self,
        snapshot: &mut Self::Snapshot,
        record: CartillaRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Delete a cartilla if its stored version is `expected_version`.
    async fn delete_cartilla(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
        expected_version: i64,
    ) -> Result<(), StorageError>;

    /// Append an audit event.
    ///
    /// Must be written in the SAME snapshot as the change it describes so
    /// that no change commits without its audit entry.
    async fn insert_audit_event(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AuditEventRecord,
    ) -> Result<(), StorageError>;

    /// Replace the stored pressure table as a whole.
    ///
    /// `expected_version` is `None` when no table has been stored yet.
    /// Returns the new version (0 for the first table).
    async fn put_pressure_table(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PressureTableRecord,
        expected_version: Option<i64>,
    ) -> Result<i64, StorageError>;

    // ── Queries (committed state only) ───────────────────────────────────────

    /// Read a committed cartilla.
    async fn get_cartilla(&self, id: &str) -> Result<CartillaRecord, StorageError>;

    /// List cartillas matching `query`, newest `created_at` first.
    async fn list_cartillas(&self, query: &CartillaQuery)
        -> Result<Vec<CartillaRecord>, StorageError>;

    /// Count cartillas matching `query`'s filters, ignoring paging.
    async fn count_cartillas(&self, query: &CartillaQuery) -> Result<usize, StorageError>;

    /// Audit events in commit order, optionally for one entity id.
    async fn list_audit_events(
        &self,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEventRecord>, StorageError>;

    /// The stored pressure table, if one has ever been written.
    async fn get_pressure_table(&self) -> Result<Option<PressureTableRecord>, StorageError>;
}
