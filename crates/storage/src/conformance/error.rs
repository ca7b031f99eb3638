use std::future::Future;

use super::{insert_committed, make_cartilla, TestResult};
use crate::{CartillaStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_cartilla_nonexistent",
        get_cartilla_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_for_update_nonexistent",
        get_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_nonexistent",
        update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "delete_nonexistent",
        delete_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_pressure_table_empty",
        get_pressure_table_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_on_empty_storage",
        list_on_empty_storage(factory).await,
    ));

    results
}

async fn get_cartilla_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_cartilla("c-999").await {
        Err(StorageError::CartillaNotFound { id }) if id == "c-999" => Ok(()),
        other => Err(format!("expected CartillaNotFound, got {other:?}")),
    }
}

async fn get_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.get_cartilla_for_update(&mut snap, "c-999").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::CartillaNotFound { .. }) => Ok(()),
        other => Err(format!("expected CartillaNotFound, got {other:?}")),
    }
}

async fn update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let staged = s
        .update_cartilla(&mut snap, make_cartilla("c-999", "UOM-9", "op-1"), 0)
        .await;
    let result = match staged {
        Ok(_) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::CartillaNotFound { .. }) => Ok(()),
        other => Err(format!("expected CartillaNotFound, got {other:?}")),
    }
}

async fn delete_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    // A live record so the backend is not trivially empty.
    insert_committed(&s, make_cartilla("c-1", "UOM-1", "op-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let staged = s.delete_cartilla(&mut snap, "c-999", 0).await;
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::CartillaNotFound { .. }) => Ok(()),
        other => Err(format!("expected CartillaNotFound, got {other:?}")),
    }
}

async fn get_pressure_table_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_pressure_table().await {
        Ok(None) => Ok(()),
        other => Err(format!("expected no stored table, got {other:?}")),
    }
}

async fn list_on_empty_storage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let listed = s
        .list_cartillas(&Default::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    let counted = s
        .count_cartillas(&Default::default())
        .await
        .map_err(|e| format!("count: {e}"))?;
    let audit = s
        .list_audit_events(None)
        .await
        .map_err(|e| format!("audit: {e}"))?;
    if !listed.is_empty() || counted != 0 || !audit.is_empty() {
        return Err(format!(
            "expected empty storage, got {} listed, {counted} counted, {} audit",
            listed.len(),
            audit.len()
        ));
    }
    Ok(())
}
