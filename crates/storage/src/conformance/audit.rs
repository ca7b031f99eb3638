use std::future::Future;

use super::{insert_committed, make_audit_event, make_cartilla, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "audit",
        "audit_commits_with_change",
        audit_commits_with_change(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "audit_rolls_back_with_conflicting_change",
        audit_rolls_back_with_conflicting_change(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "audit_events_in_commit_order",
        audit_events_in_commit_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "audit_filter_by_entity",
        audit_filter_by_entity(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "audit_survives_delete",
        audit_survives_delete(factory).await,
    ));

    results
}

async fn audit_commits_with_change<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut event = make_audit_event("a-1", "c-1", "CREATE");
    event.changes = serde_json::json!({"uomNumero": "UOM-1"});
    s.insert_audit_event(&mut snap, event.clone())
        .await
        .map_err(|e| format!("audit: {e}"))?;

    let pending = s
        .list_audit_events(None)
        .await
        .map_err(|e| format!("list pending: {e}"))?;
    if !pending.is_empty() {
        return Err("uncommitted audit event visible".to_string());
    }

    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let events = s
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events != vec![event] {
        return Err(format!("expected the single CREATE event, got {events:?}"));
    }
    Ok(())
}

/// An audit event staged next to an update that loses the version race is
/// discarded along with it.
async fn audit_rolls_back_with_conflicting_change<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut winner = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut loser = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;

    for (snap, action, estado) in [
        (&mut winner, "APPROVE", "APROBADA"),
        (&mut loser, "REJECT", "RECHAZADA"),
    ] {
        let mut record = s
            .get_cartilla_for_update(snap, "c-1")
            .await
            .map_err(|e| format!("read: {e}"))?;
        record.estado = estado.to_string();
        s.update_cartilla(snap, record, 0)
            .await
            .map_err(|e| format!("stage {action}: {e}"))?;
        s.insert_audit_event(snap, make_audit_event(&format!("a-{action}"), "c-1", action))
            .await
            .map_err(|e| format!("audit {action}: {e}"))?;
    }

    s.commit_snapshot(winner)
        .await
        .map_err(|e| format!("commit winner: {e}"))?;
    match s.commit_snapshot(loser).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected loser to conflict, got {other:?}")),
    }

    let actions: Vec<String> = s
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|e| e.action)
        .collect();
    if actions != ["APPROVE"] {
        return Err(format!("expected only APPROVE audited, got {actions:?}"));
    }
    Ok(())
}

async fn audit_events_in_commit_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (i, action) in ["CREATE", "UPDATE", "SEND_REVIEW", "APPROVE"]
        .into_iter()
        .enumerate()
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.insert_audit_event(&mut snap, make_audit_event(&format!("a-{i}"), "c-1", action))
            .await
            .map_err(|e| format!("audit: {e}"))?;
        s.commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let actions: Vec<String> = s
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|e| e.action)
        .collect();
    if actions != ["CREATE", "UPDATE", "SEND_REVIEW", "APPROVE"] {
        return Err(format!("unexpected audit order: {actions:?}"));
    }
    Ok(())
}

async fn audit_filter_by_entity<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    for (id, entity_id) in [("a-1", "c-1"), ("a-2", "c-2"), ("a-3", "c-1")] {
        s.insert_audit_event(&mut snap, make_audit_event(id, entity_id, "UPDATE"))
            .await
            .map_err(|e| format!("audit: {e}"))?;
    }
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let c1: Vec<String> = s
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("list c-1: {e}"))?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if c1 != ["a-1", "a-3"] {
        return Err(format!("expected [a-1, a-3] for c-1, got {c1:?}"));
    }
    let all = s
        .list_audit_events(None)
        .await
        .map_err(|e| format!("list all: {e}"))?;
    if all.len() != 3 {
        return Err(format!("expected 3 events in total, got {}", all.len()));
    }
    Ok(())
}

async fn audit_survives_delete<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.insert_audit_event(&mut snap, make_audit_event("a-1", "c-1", "DELETE"))
        .await
        .map_err(|e| format!("audit: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let events = s
        .list_audit_events(Some("c-1"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events.len() != 1 || events[0].action != "DELETE" {
        return Err(format!("expected DELETE event to remain, got {events:?}"));
    }
    Ok(())
}
