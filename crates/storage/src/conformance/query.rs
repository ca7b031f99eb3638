use std::future::Future;

use super::{insert_committed, make_cartilla, update_committed, TestResult};
use crate::{CartillaQuery, CartillaStorage};

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "list_newest_first",
        list_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_ties_newest_insert_first",
        list_ties_newest_insert_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "filter_by_owner_and_estado",
        filter_by_owner_and_estado(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "filter_by_date_range_inclusive",
        filter_by_date_range_inclusive(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "paging_offset_and_limit",
        paging_offset_and_limit(factory).await,
    ));

    results
}

fn ids(records: &[crate::CartillaRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

async fn seed_dated<S: CartillaStorage>(s: &S, rows: &[(&str, &str, &str)]) -> Result<(), String> {
    // (id, owner, created_at date)
    for (i, (id, owner, day)) in rows.iter().enumerate() {
        let mut record = make_cartilla(id, &format!("UOM-{i}"), owner);
        record.fecha_prueba = day.to_string();
        record.created_at = format!("{day}T08:00:00Z");
        record.updated_at = record.created_at.clone();
        insert_committed(s, record).await?;
    }
    Ok(())
}

async fn list_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_dated(
        &s,
        &[
            ("c-1", "op-1", "2024-01-02"),
            ("c-2", "op-1", "2024-01-05"),
            ("c-3", "op-1", "2024-01-03"),
        ],
    )
    .await?;

    let listed = s
        .list_cartillas(&CartillaQuery::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&listed) != ["c-2", "c-3", "c-1"] {
        return Err(format!("expected [c-2, c-3, c-1], got {:?}", ids(&listed)));
    }
    Ok(())
}

async fn list_ties_newest_insert_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_dated(
        &s,
        &[
            ("c-a", "op-1", "2024-01-02"),
            ("c-b", "op-1", "2024-01-02"),
        ],
    )
    .await?;
    // Updating must not change the listing position.
    update_committed(&s, "c-a", "EN_REVISION", 0).await?;

    let listed = s
        .list_cartillas(&CartillaQuery::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&listed) != ["c-b", "c-a"] {
        return Err(format!("expected [c-b, c-a], got {:?}", ids(&listed)));
    }
    Ok(())
}

async fn filter_by_owner_and_estado<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_dated(
        &s,
        &[
            ("c-1", "op-1", "2024-01-01"),
            ("c-2", "op-2", "2024-01-02"),
            ("c-3", "op-1", "2024-01-03"),
        ],
    )
    .await?;
    update_committed(&s, "c-3", "EN_REVISION", 0).await?;

    let mine = CartillaQuery {
        created_by: Some("op-1".to_string()),
        ..Default::default()
    };
    let listed = s
        .list_cartillas(&mine)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&listed) != ["c-3", "c-1"] {
        return Err(format!("owner filter: got {:?}", ids(&listed)));
    }

    let mine_in_review = CartillaQuery {
        estado: Some("EN_REVISION".to_string()),
        ..mine
    };
    let listed = s
        .list_cartillas(&mine_in_review)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let count = s
        .count_cartillas(&mine_in_review)
        .await
        .map_err(|e| format!("count: {e}"))?;
    if ids(&listed) != ["c-3"] || count != 1 {
        return Err(format!(
            "owner+estado filter: got {:?} (count {count})",
            ids(&listed)
        ));
    }
    Ok(())
}

async fn filter_by_date_range_inclusive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_dated(
        &s,
        &[
            ("c-1", "op-1", "2024-01-01"),
            ("c-2", "op-1", "2024-01-10"),
            ("c-3", "op-1", "2024-01-20"),
            ("c-4", "op-1", "2024-01-31"),
        ],
    )
    .await?;

    let query = CartillaQuery {
        fecha_desde: Some("2024-01-10".to_string()),
        fecha_hasta: Some("2024-01-20".to_string()),
        ..Default::default()
    };
    let listed = s
        .list_cartillas(&query)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&listed) != ["c-3", "c-2"] {
        return Err(format!("date range: got {:?}", ids(&listed)));
    }
    Ok(())
}

async fn paging_offset_and_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_dated(
        &s,
        &[
            ("c-1", "op-1", "2024-01-01"),
            ("c-2", "op-1", "2024-01-02"),
            ("c-3", "op-1", "2024-01-03"),
            ("c-4", "op-1", "2024-01-04"),
            ("c-5", "op-1", "2024-01-05"),
        ],
    )
    .await?;

    let page2 = CartillaQuery {
        offset: 2,
        limit: 2,
        ..Default::default()
    };
    let listed = s
        .list_cartillas(&page2)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&listed) != ["c-3", "c-2"] {
        return Err(format!("page 2: got {:?}", ids(&listed)));
    }
    let total = s
        .count_cartillas(&page2)
        .await
        .map_err(|e| format!("count: {e}"))?;
    if total != 5 {
        return Err(format!("count should ignore paging, got {total}"));
    }

    let past_end = CartillaQuery {
        offset: 10,
        limit: 2,
        ..Default::default()
    };
    let listed = s
        .list_cartillas(&past_end)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("past the end: got {:?}", ids(&listed)));
    }
    Ok(())
}
