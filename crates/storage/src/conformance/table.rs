use std::future::Future;

use super::{make_audit_event, make_table, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_table_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "table",
        "first_table_at_version_0",
        first_table_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "table",
        "replace_table_increments_version",
        replace_table_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "table",
        "stale_table_write_conflicts",
        stale_table_write_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "table",
        "table_write_audited_atomically",
        table_write_audited_atomically(factory).await,
    ));

    results
}

async fn put_committed<S: CartillaStorage>(
    s: &S,
    updated_by: &str,
    expected_version: Option<i64>,
) -> Result<i64, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    match s
        .put_pressure_table(&mut snap, make_table(updated_by), expected_version)
        .await
    {
        Ok(version) => {
            s.commit_snapshot(snap).await?;
            Ok(version)
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

async fn first_table_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let version = put_committed(&s, "admin-1", None)
        .await
        .map_err(|e| format!("put: {e}"))?;
    if version != 0 {
        return Err(format!("expected version 0, got {version}"));
    }
    let stored = s
        .get_pressure_table()
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("table missing after commit")?;
    if stored.version != 0 || stored.updated_by != "admin-1" {
        return Err(format!("unexpected stored table: {stored:?}"));
    }
    if stored.entries != make_table("admin-1").entries {
        return Err(format!("entries mismatch: {}", stored.entries));
    }
    Ok(())
}

async fn replace_table_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    put_committed(&s, "admin-1", None)
        .await
        .map_err(|e| format!("first put: {e}"))?;
    let version = put_committed(&s, "admin-2", Some(0))
        .await
        .map_err(|e| format!("second put: {e}"))?;
    if version != 1 {
        return Err(format!("expected version 1, got {version}"));
    }
    let stored = s
        .get_pressure_table()
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("table missing")?;
    if stored.updated_by != "admin-2" || stored.version != 1 {
        return Err(format!("expected admin-2 at version 1, got {stored:?}"));
    }
    Ok(())
}

async fn stale_table_write_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    put_committed(&s, "admin-1", None)
        .await
        .map_err(|e| format!("first put: {e}"))?;

    // A second "first" write and a write at an unknown version both lose.
    match put_committed(&s, "admin-2", None).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected conflict for None, got {other:?}")),
    }
    match put_committed(&s, "admin-2", Some(5)).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected conflict for Some(5), got {other:?}")),
    }

    let stored = s
        .get_pressure_table()
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("table missing")?;
    if stored.updated_by != "admin-1" {
        return Err(format!("losing writes changed the table: {stored:?}"));
    }
    Ok(())
}

async fn table_write_audited_atomically<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.put_pressure_table(&mut snap, make_table("admin-1"), None)
        .await
        .map_err(|e| format!("put: {e}"))?;
    let mut event = make_audit_event("a-1", "psi-gph", "UPDATE");
    event.entity = "PsiGphConfig".to_string();
    s.insert_audit_event(&mut snap, event)
        .await
        .map_err(|e| format!("audit: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let events = s
        .list_audit_events(Some("psi-gph"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events.len() != 1 || events[0].entity != "PsiGphConfig" {
        return Err(format!("expected one PsiGphConfig event, got {events:?}"));
    }
    Ok(())
}
