use std::future::Future;

use super::{insert_committed, make_cartilla, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_creates_record_at_version_0",
        insert_creates_record_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_ignores_caller_version",
        insert_ignores_caller_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_duplicate_id_rejected",
        insert_duplicate_id_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_duplicate_uom_rejected",
        insert_duplicate_uom_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_duplicate_uom_within_snapshot_rejected",
        insert_duplicate_uom_within_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "uom_reusable_after_delete",
        uom_reusable_after_delete(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "document_round_trips",
        document_round_trips(factory).await,
    ));

    results
}

async fn insert_creates_record_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 0 {
        return Err(format!("expected version 0, got {}", stored.version));
    }
    if stored.uom_numero != "UOM-1" || stored.created_by != "op-1" {
        return Err(format!("stored record mismatch: {stored:?}"));
    }
    if stored.estado != "BORRADOR" {
        return Err(format!("expected BORRADOR, got {}", stored.estado));
    }
    Ok(())
}

async fn insert_ignores_caller_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_cartilla("c-1", "UOM-1", "op-1");
    record.version = 42;
    insert_committed(&s, record).await?;

    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 0 {
        return Err(format!("expected version 0, got {}", stored.version));
    }
    Ok(())
}

async fn insert_duplicate_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let staged = s
        .insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-2", "op-1"))
        .await;
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::AlreadyExists { id }) if id == "c-1" => Ok(()),
        other => Err(format!("expected AlreadyExists for c-1, got {other:?}")),
    }
}

async fn insert_duplicate_uom_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let staged = s
        .insert_cartilla(&mut snap, make_cartilla("c-2", "UOM-1", "op-2"))
        .await;
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::DuplicateUom { uom_numero }) if uom_numero == "UOM-1" => {}
        other => return Err(format!("expected DuplicateUom for UOM-1, got {other:?}")),
    }

    match s.get_cartilla("c-2").await {
        Err(StorageError::CartillaNotFound { .. }) => Ok(()),
        other => Err(format!("c-2 should not exist, got {other:?}")),
    }
}

async fn insert_duplicate_uom_within_snapshot_rejected<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-1", "op-1"))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let second = s
        .insert_cartilla(&mut snap, make_cartilla("c-2", "UOM-1", "op-1"))
        .await;
    let result = match second {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::DuplicateUom { .. }) => Ok(()),
        other => Err(format!("expected DuplicateUom, got {other:?}")),
    }
}

async fn uom_reusable_after_delete<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.delete_cartilla(&mut snap, "c-1", 0)
        .await
        .map_err(|e| format!("delete: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit delete: {e}"))?;

    insert_committed(&s, make_cartilla("c-2", "UOM-1", "op-1")).await
}

async fn document_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_cartilla("c-1", "UOM-1", "op-1");
    record.document = serde_json::json!({
        "uomNumero": "UOM-1",
        "pruebas": [{"presionOperacionPSI": 30.5, "flujoFugaGPH": 5.3}],
        "observaciones": null
    });
    insert_committed(&s, record.clone()).await?;

    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.document != record.document {
        return Err(format!(
            "document mismatch: expected {}, got {}",
            record.document, stored.document
        ));
    }
    Ok(())
}
