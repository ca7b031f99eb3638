use std::future::Future;

use super::{insert_committed, make_cartilla, update_committed, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "update_increments_version",
        update_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_update_conflicts",
        stale_update_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_delete_conflicts",
        stale_delete_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "interleaved_snapshots_second_commit_conflicts",
        interleaved_snapshots_second_commit_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_cannot_take_another_uom",
        update_cannot_take_another_uom(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_leaves_state_untouched",
        conflict_leaves_state_untouched(factory).await,
    ));

    results
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let v1 = update_committed(&s, "c-1", "EN_REVISION", 0).await?;
    let v2 = update_committed(&s, "c-1", "APROBADA", v1).await?;
    if (v1, v2) != (1, 2) {
        return Err(format!("expected versions (1, 2), got ({v1}, {v2})"));
    }
    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 2 || stored.estado != "APROBADA" {
        return Err(format!("unexpected stored record: {stored:?}"));
    }
    Ok(())
}

async fn stale_update_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;
    update_committed(&s, "c-1", "EN_REVISION", 0).await?;

    match update_committed(&s, "c-1", "RECHAZADA", 0).await {
        Err(msg) if msg.contains("concurrent conflict") => Ok(()),
        other => Err(format!("expected conflict for stale version 0, got {other:?}")),
    }
}

async fn stale_delete_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;
    update_committed(&s, "c-1", "BORRADOR", 0).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let staged = s.delete_cartilla(&mut snap, "c-1", 0).await;
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
    s.get_cartilla("c-1")
        .await
        .map(|_| ())
        .map_err(|e| format!("record should survive stale delete: {e}"))
}

/// Two snapshots read version 0 and stage updates. The first commit wins;
/// the second must be rejected at commit even though staging succeeded.
async fn interleaved_snapshots_second_commit_conflicts<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut a = s.begin_snapshot().await.map_err(|e| format!("begin a: {e}"))?;
    let mut b = s.begin_snapshot().await.map_err(|e| format!("begin b: {e}"))?;

    let mut ra = s
        .get_cartilla_for_update(&mut a, "c-1")
        .await
        .map_err(|e| format!("read a: {e}"))?;
    let mut rb = s
        .get_cartilla_for_update(&mut b, "c-1")
        .await
        .map_err(|e| format!("read b: {e}"))?;
    ra.estado = "APROBADA".to_string();
    rb.estado = "RECHAZADA".to_string();

    s.update_cartilla(&mut a, ra, 0)
        .await
        .map_err(|e| format!("stage a: {e}"))?;
    let staged_b = s.update_cartilla(&mut b, rb, 0).await;

    s.commit_snapshot(a)
        .await
        .map_err(|e| format!("commit a: {e}"))?;

    let result_b = match staged_b {
        Ok(_) => s.commit_snapshot(b).await,
        Err(e) => {
            let _ = s.abort_snapshot(b).await;
            Err(e)
        }
    };
    if !matches!(result_b, Err(StorageError::ConcurrentConflict { .. })) {
        return Err(format!("expected second commit to conflict, got {result_b:?}"));
    }

    let stored = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.estado != "APROBADA" || stored.version != 1 {
        return Err(format!("expected first writer's state, got {stored:?}"));
    }
    Ok(())
}

async fn update_cannot_take_another_uom<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;
    insert_committed(&s, make_cartilla("c-2", "UOM-2", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut record = s
        .get_cartilla_for_update(&mut snap, "c-2")
        .await
        .map_err(|e| format!("read: {e}"))?;
    record.uom_numero = "UOM-1".to_string();
    let staged = s.update_cartilla(&mut snap, record, 0).await;
    let result = match staged {
        Ok(_) => s.commit_snapshot(snap).await,
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

async fn conflict_leaves_state_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;
    update_committed(&s, "c-1", "EN_REVISION", 0).await?;
    let before = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get before: {e}"))?;

    let _ = update_committed(&s, "c-1", "BORRADOR", 7).await;

    let after = s
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get after: {e}"))?;
    if before != after {
        return Err(format!("conflict changed state: {before:?} -> {after:?}"));
    }
    Ok(())
}
