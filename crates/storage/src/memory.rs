//! In-process `CartillaStorage` backend.
//!
//! Committed state sits behind a mutex. A snapshot is a list of staged
//! writes: each write is validated when staged (against committed state
//! plus the snapshot's own earlier writes) and the whole list is validated
//! again and applied to a copy of the state at commit, which replaces the
//! committed state only if every write succeeds.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AuditEventRecord, CartillaQuery, CartillaRecord, PressureTableRecord};
use crate::traits::CartillaStorage;

#[derive(Debug, Clone)]
struct StoredCartilla {
    record: CartillaRecord,
    /// Insertion order, used to break `created_at` ties.
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    cartillas: BTreeMap<String, StoredCartilla>,
    audit: Vec<AuditEventRecord>,
    table: Option<PressureTableRecord>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
enum Write {
    Insert(CartillaRecord),
    Update {
        record: CartillaRecord,
        expected_version: i64,
    },
    Delete {
        id: String,
        expected_version: i64,
    },
    Audit(AuditEventRecord),
    Table {
        record: PressureTableRecord,
        expected_version: Option<i64>,
    },
}

impl MemoryState {
    fn uom_taken(&self, uom_numero: &str, except_id: &str) -> bool {
        self.cartillas
            .values()
            .any(|c| c.record.uom_numero == uom_numero && c.record.id != except_id)
    }

    fn conflict(entity: &str, id: &str, expected_version: i64) -> StorageError {
        StorageError::ConcurrentConflict {
            entity: entity.to_string(),
            id: id.to_string(),
            expected_version,
        }
    }

    /// Validate and apply one write. Returns the resulting version where
    /// the write has one.
    fn apply(&mut self, write: Write) -> Result<i64, StorageError> {
        match write {
            Write::Insert(mut record) => {
                if self.cartillas.contains_key(&record.id) {
                    return Err(StorageError::AlreadyExists { id: record.id });
                }
                if self.uom_taken(&record.uom_numero, &record.id) {
                    return Err(StorageError::DuplicateUom {
                        uom_numero: record.uom_numero,
                    });
                }
                record.version = 0;
                let seq = self.next_seq;
                self.next_seq += 1;
                self.cartillas
                    .insert(record.id.clone(), StoredCartilla { record, seq });
                Ok(0)
            }
            Write::Update {
                mut record,
                expected_version,
            } => {
                let current = self
                    .cartillas
                    .get(&record.id)
                    .ok_or_else(|| StorageError::CartillaNotFound {
                        id: record.id.clone(),
                    })?;
                if current.record.version != expected_version {
                    return Err(Self::conflict("cartilla", &record.id, expected_version));
                }
                if self.uom_taken(&record.uom_numero, &record.id) {
                    return Err(StorageError::DuplicateUom {
                        uom_numero: record.uom_numero,
                    });
                }
                let seq = current.seq;
                record.version = expected_version + 1;
                let version = record.version;
                self.cartillas
                    .insert(record.id.clone(), StoredCartilla { record, seq });
                Ok(version)
            }
            Write::Delete {
                id,
                expected_version,
            } => {
                let current = self
                    .cartillas
                    .get(&id)
                    .ok_or_else(|| StorageError::CartillaNotFound { id: id.clone() })?;
                if current.record.version != expected_version {
                    return Err(Self::conflict("cartilla", &id, expected_version));
                }
                self.cartillas.remove(&id);
                Ok(expected_version)
            }
            Write::Audit(record) => {
                self.audit.push(record);
                Ok(0)
            }
            Write::Table {
                mut record,
                expected_version,
            } => {
                let current = self.table.as_ref().map(|t| t.version);
                if current != expected_version {
                    return Err(Self::conflict(
                        "pressure table",
                        "psi-gph",
                        expected_version.unwrap_or(-1),
                    ));
                }
                record.version = expected_version.map_or(0, |v| v + 1);
                let version = record.version;
                self.table = Some(record);
                Ok(version)
            }
        }
    }
}

/// A transaction against [`MemoryStorage`]: the writes staged so far.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    writes: Vec<Write>,
}

/// Thread-safe in-memory storage. Cheap to create; one per test or process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    /// Committed state with `snapshot`'s writes applied on top.
    fn view(&self, snapshot: &MemorySnapshot) -> Result<MemoryState, StorageError> {
        let mut view = self.lock()?.clone();
        for write in &snapshot.writes {
            view.apply(write.clone())?;
        }
        Ok(view)
    }

    fn stage(&self, snapshot: &mut MemorySnapshot, write: Write) -> Result<i64, StorageError> {
        let mut view = self.view(snapshot)?;
        let version = view.apply(write.clone())?;
        snapshot.writes.push(write);
        Ok(version)
    }
}

#[async_trait]
impl CartillaStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let staged = snapshot.writes.len();
        for write in snapshot.writes {
            next.apply(write)?;
        }
        *state = next;
        tracing::trace!(writes = staged, "memory snapshot committed");
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        tracing::trace!(writes = snapshot.writes.len(), "memory snapshot aborted");
        Ok(())
    }

    async fn insert_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CartillaRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, Write::Insert(record)).map(|_| ())
    }

    async fn get_cartilla_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<CartillaRecord, StorageError> {
        self.view(snapshot)?
            .cartillas
            .remove(id)
            .map(|c| c.record)
            .ok_or_else(|| StorageError::CartillaNotFound { id: id.to_string() })
    }

    async fn update_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CartillaRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.stage(
            snapshot,
            Write::Update {
                record,
                expected_version,
            },
        )
    }

    async fn delete_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        self.stage(
            snapshot,
            Write::Delete {
                id: id.to_string(),
                expected_version,
            },
        )
        .map(|_| ())
    }

    async fn insert_audit_event(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AuditEventRecord,
    ) -> Result<(), StorageError> {
        snapshot.writes.push(Write::Audit(record));
        Ok(())
    }

    async fn put_pressure_table(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PressureTableRecord,
        expected_version: Option<i64>,
    ) -> Result<i64, StorageError> {
        self.stage(
            snapshot,
            Write::Table {
                record,
                expected_version,
            },
        )
    }

    async fn get_cartilla(&self, id: &str) -> Result<CartillaRecord, StorageError> {
        self.lock()?
            .cartillas
            .get(id)
            .map(|c| c.record.clone())
            .ok_or_else(|| StorageError::CartillaNotFound { id: id.to_string() })
    }

    async fn list_cartillas(
        &self,
        query: &CartillaQuery,
    ) -> Result<Vec<CartillaRecord>, StorageError> {
        let state = self.lock()?;
        let mut matching: Vec<&StoredCartilla> = state
            .cartillas
            .values()
            .filter(|c| query.matches(&c.record))
            .collect();
        matching.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit
        };
        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|c| c.record.clone())
            .collect())
    }

    async fn count_cartillas(&self, query: &CartillaQuery) -> Result<usize, StorageError> {
        Ok(self
            .lock()?
            .cartillas
            .values()
            .filter(|c| query.matches(&c.record))
            .count())
    }

    async fn list_audit_events(
        &self,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEventRecord>, StorageError> {
        Ok(self
            .lock()?
            .audit
            .iter()
            .filter(|a| entity_id.map_or(true, |id| a.entity_id == id))
            .cloned()
            .collect())
    }

    async fn get_pressure_table(&self) -> Result<Option<PressureTableRecord>, StorageError> {
        Ok(self.lock()?.table.clone())
    }
}
