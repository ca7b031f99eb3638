use std::future::Future;

use super::{insert_committed, make_audit_event, make_cartilla, make_table, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_invisible",
        uncommitted_insert_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_writes_discarded",
        aborted_writes_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discarded",
        dropped_snapshot_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "read_your_own_writes",
        read_your_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "failed_commit_writes_nothing",
        failed_commit_writes_nothing(factory).await,
    ));

    results
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-1", "op-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let before = s.get_cartilla("c-1").await;
    if !matches!(before, Err(StorageError::CartillaNotFound { .. })) {
        return Err(format!("uncommitted insert visible: {before:?}"));
    }

    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    s.get_cartilla("c-1")
        .await
        .map(|_| ())
        .map_err(|e| format!("committed insert not visible: {e}"))
}

async fn aborted_writes_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-1", "op-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.insert_audit_event(&mut snap, make_audit_event("a-1", "c-1", "CREATE"))
        .await
        .map_err(|e| format!("audit: {e}"))?;
    s.put_pressure_table(&mut snap, make_table("admin-1"), None)
        .await
        .map_err(|e| format!("table: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    if s.get_cartilla("c-1").await.is_ok() {
        return Err("aborted insert is visible".to_string());
    }
    let audit = s
        .list_audit_events(None)
        .await
        .map_err(|e| format!("audit list: {e}"))?;
    if !audit.is_empty() {
        return Err(format!("aborted audit events visible: {audit:?}"));
    }
    let table = s
        .get_pressure_table()
        .await
        .map_err(|e| format!("table get: {e}"))?;
    if table.is_some() {
        return Err("aborted table write visible".to_string());
    }
    Ok(())
}

async fn dropped_snapshot_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-1", "op-1"))
            .await
            .map_err(|e| format!("insert: {e}"))?;
        drop(snap);
    }
    match s.get_cartilla("c-1").await {
        Err(StorageError::CartillaNotFound { .. }) => Ok(()),
        other => Err(format!("dropped snapshot leaked a write: {other:?}")),
    }
}

async fn read_your_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut snap, make_cartilla("c-1", "UOM-1", "op-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let mut record = s
        .get_cartilla_for_update(&mut snap, "c-1")
        .await
        .map_err(|e| format!("read own insert: {e}"))?;
    record.estado = "EN_REVISION".to_string();
    let v1 = s
        .update_cartilla(&mut snap, record, 0)
        .await
        .map_err(|e| format!("update own insert: {e}"))?;
    if v1 != 1 {
        return Err(format!("expected version 1, got {v1}"));
    }

    let seen = s
        .get_cartilla_for_update(&mut snap, "c-1")
        .await
        .map_err(|e| format!("read own update: {e}"))?;
    if seen.version != 1 || seen.estado != "EN_REVISION" {
        return Err(format!("snapshot does not see its own update: {seen:?}"));
    }

    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 1 {
        return Err(format!("expected committed version 1, got {}", stored.version));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut record = s
        .get_cartilla_for_update(&mut snap, "c-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    record.estado = "EN_REVISION".to_string();
    s.update_cartilla(&mut snap, record, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let _ = s.abort_snapshot(snap).await;
    if outside.estado != "BORRADOR" || outside.version != 0 {
        return Err(format!("uncommitted update visible: {outside:?}"));
    }
    Ok(())
}

/// A snapshot whose insert collides at commit time leaves no trace of any
/// of its other writes.
async fn failed_commit_writes_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut late = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut late, make_cartilla("c-2", "UOM-1", "op-2"))
        .await
        .map_err(|e| format!("stage insert: {e}"))?;
    s.insert_audit_event(&mut late, make_audit_event("a-2", "c-2", "CREATE"))
        .await
        .map_err(|e| format!("stage audit: {e}"))?;

    // Another writer takes the same UOM first.
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    match s.commit_snapshot(late).await {
        Err(StorageError::DuplicateUom { .. }) => {}
        other => return Err(format!("expected DuplicateUom at commit, got {other:?}")),
    }
    if s.get_cartilla("c-2").await.is_ok() {
        return Err("failed commit left its insert behind".to_string());
    }
    let audit = s
        .list_audit_events(Some("c-2"))
        .await
        .map_err(|e| format!("audit list: {e}"))?;
    if !audit.is_empty() {
        return Err("failed commit left its audit event behind".to_string());
    }
    Ok(())
}
