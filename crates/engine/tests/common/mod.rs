#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cartilla_core::{CartillaDraft, Instalacion, LeakTestInput, ResultadoPrueba};
use cartilla_engine::CartillaService;
use cartilla_storage::{
    AuditEventRecord, CartillaQuery, CartillaRecord, CartillaStorage, MemorySnapshot,
    MemoryStorage, PressureTableRecord, StorageError,
};
use time::macros::date;
use tokio::sync::{Barrier, Notify};

pub fn draft(uom: &str, pressures: &[f64]) -> CartillaDraft {
    let mut d = CartillaDraft::new(
        uom,
        Instalacion {
            rut: "76.543.210-K".to_string(),
            nombre_sitio: "Estación Los Andes".to_string(),
            comuna: Some("Los Andes".to_string()),
            ..Default::default()
        },
        date!(2024 - 06 - 14),
        "R. Fuentes",
    );
    for (i, psi) in pressures.iter().enumerate() {
        d.pruebas.push(LeakTestInput::new(
            (i + 1).to_string(),
            format!("T{}", i + 1),
            Some(*psi),
            ResultadoPrueba::Pasa,
        ));
    }
    d
}

pub fn service() -> CartillaService<MemoryStorage> {
    CartillaService::with_table(MemoryStorage::new(), Default::default())
}

/// `MemoryStorage` whose commits can be held until a set number of
/// snapshots are ready to commit, forcing racing writers to interleave.
/// A single commit can also be held after it is durable, before its caller
/// hears back.
#[derive(Default)]
pub struct GatedStorage {
    inner: MemoryStorage,
    gate: Mutex<Option<Arc<Barrier>>>,
    hold: Mutex<Option<CommitHold>>,
    broken_abort: AtomicBool,
}

/// Signals for a held commit: `committed` fires once the writes are
/// visible; the caller is answered after `release` is notified.
#[derive(Clone, Default)]
pub struct CommitHold {
    pub committed: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedStorage {
    /// Hold the next commits until `n` of them are waiting.
    pub fn arm(&self, n: usize) {
        *self.gate.lock().unwrap() = Some(Arc::new(Barrier::new(n)));
    }

    pub fn disarm(&self) {
        *self.gate.lock().unwrap() = None;
    }

    /// Make every abort fail after discarding the snapshot.
    pub fn break_aborts(&self) {
        self.broken_abort.store(true, Ordering::SeqCst);
    }

    /// Hold the acknowledgement of the next successful commit.
    pub fn hold_next_commit(&self) -> CommitHold {
        let hold = CommitHold::default();
        *self.hold.lock().unwrap() = Some(hold.clone());
        hold
    }
}

#[async_trait]
impl CartillaStorage for GatedStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }
        self.inner.commit_snapshot(snapshot).await?;
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.committed.notify_one();
            hold.release.notified().await;
        }
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await?;
        if self.broken_abort.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("abort lost".to_string()));
        }
        Ok(())
    }

    async fn insert_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CartillaRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_cartilla(snapshot, record).await
    }

    async fn get_cartilla_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<CartillaRecord, StorageError> {
        self.inner.get_cartilla_for_update(snapshot, id).await
    }

    async fn update_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CartillaRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.inner
            .update_cartilla(snapshot, record, expected_version)
            .await
    }

    async fn delete_cartilla(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        self.inner
            .delete_cartilla(snapshot, id, expected_version)
            .await
    }

    async fn insert_audit_event(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AuditEventRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_audit_event(snapshot, record).await
    }

    async fn put_pressure_table(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PressureTableRecord,
        expected_version: Option<i64>,
    ) -> Result<i64, StorageError> {
        self.inner
            .put_pressure_table(snapshot, record, expected_version)
            .await
    }

    async fn get_cartilla(&self, id: &str) -> Result<CartillaRecord, StorageError> {
        self.inner.get_cartilla(id).await
    }

    async fn list_cartillas(
        &self,
        query: &CartillaQuery,
    ) -> Result<Vec<CartillaRecord>, StorageError> {
        self.inner.list_cartillas(query).await
    }

    async fn count_cartillas(&self, query: &CartillaQuery) -> Result<usize, StorageError> {
        self.inner.count_cartillas(query).await
    }

    async fn list_audit_events(
        &self,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEventRecord>, StorageError> {
        self.inner.list_audit_events(entity_id).await
    }

    async fn get_pressure_table(&self) -> Result<Option<PressureTableRecord>, StorageError> {
        self.inner.get_pressure_table().await
    }
}
