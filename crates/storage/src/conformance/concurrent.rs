use std::future::Future;
use std::sync::Arc;

use super::{insert_committed, make_audit_event, make_cartilla, TestResult};
use crate::{CartillaStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_reviews_exactly_one_wins",
        concurrent_reviews_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_same_uom_exactly_one_wins",
        concurrent_same_uom_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_cartillas_all_succeed",
        concurrent_updates_different_cartillas_all_succeed(factory).await,
    ));

    results
}

/// Commit `snap` if staging succeeded. `Ok(true)` for a win, `Ok(false)` for
/// a lost race (conflict or duplicate, whether seen at staging or commit).
async fn settle<S: CartillaStorage>(
    s: &S,
    snap: S::Snapshot,
    staged: Result<(), StorageError>,
) -> Result<bool, StorageError> {
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Ok(()) => Ok(true),
        Err(StorageError::ConcurrentConflict { .. } | StorageError::DuplicateUom { .. }) => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn tally(outcomes: Vec<bool>) -> Result<(), String> {
    let winners = outcomes.iter().filter(|won| **won).count();
    let losers = outcomes.len() - winners;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent review: exactly one wins ─────────────────────────────────────

/// N reviewers race to move the same cartilla out of EN_REVISION from
/// version 0, each with its audit event. Exactly one commit succeeds, and
/// only the winner's audit event is stored.
async fn concurrent_reviews_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut record = make_cartilla("c-1", "UOM-1", "op-1");
    record.estado = "EN_REVISION".to_string();
    insert_committed(storage.as_ref(), record).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let (estado, action) = if i % 2 == 0 {
                ("APROBADA", "APPROVE")
            } else {
                ("RECHAZADA", "REJECT")
            };
            let mut snap = s.begin_snapshot().await?;
            let staged = async {
                let mut record = s.get_cartilla_for_update(&mut snap, "c-1").await?;
                record.estado = estado.to_string();
                s.update_cartilla(&mut snap, record, 0).await?;
                s.insert_audit_event(&mut snap, make_audit_event(&format!("a-{i}"), "c-1", action))
                    .await
            }
            .await;
            settle(s.as_ref(), snap, staged).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        outcomes.push(won);
    }
    tally(outcomes)?;

    let stored = storage
        .get_cartilla("c-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 1 {
        return Err(format!(
            "expected version 1 after single winning update, got {}",
            stored.version
        ));
    }
    let events = storage
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("audit: {e}"))?;
    if events.len() != 1 {
        return Err(format!("expected 1 audit event, got {}", events.len()));
    }
    let expected_action = if stored.estado == "APROBADA" {
        "APPROVE"
    } else {
        "REJECT"
    };
    if events[0].action != expected_action {
        return Err(format!(
            "audit says {} but cartilla is {}",
            events[0].action, stored.estado
        ));
    }
    Ok(())
}

// ── Concurrent create with the same UOM: exactly one wins ───────────────────

async fn concurrent_same_uom_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let staged = s
                .insert_cartilla(&mut snap, make_cartilla(&format!("c-{i}"), "UOM-1", "op-1"))
                .await;
            settle(s.as_ref(), snap, staged).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        outcomes.push(won);
    }
    tally(outcomes)?;

    let total = storage
        .count_cartillas(&Default::default())
        .await
        .map_err(|e| format!("count: {e}"))?;
    if total != 1 {
        return Err(format!("expected 1 stored cartilla, got {total}"));
    }
    Ok(())
}

// ── Concurrent updates to different cartillas: all succeed ──────────────────

/// No false conflicts when there is no contention.
async fn concurrent_updates_different_cartillas_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        insert_committed(
            storage.as_ref(),
            make_cartilla(&format!("c-{i}"), &format!("UOM-{i}"), "op-1"),
        )
        .await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("c-{i}");
            let mut snap = s.begin_snapshot().await?;
            let mut record = s.get_cartilla_for_update(&mut snap, &id).await?;
            record.estado = "EN_REVISION".to_string();
            s.update_cartilla(&mut snap, record, 0).await?;
            s.commit_snapshot(snap).await?;
            Ok::<(), StorageError>(())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for i in 0..N {
        let record = storage
            .get_cartilla(&format!("c-{i}"))
            .await
            .map_err(|e| format!("get c-{i}: {e}"))?;
        if record.estado != "EN_REVISION" || record.version != 1 {
            return Err(format!(
                "c-{i}: expected EN_REVISION at version 1, got {} at {}",
                record.estado, record.version
            ));
        }
    }
    Ok(())
}
