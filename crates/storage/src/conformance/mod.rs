//! Conformance test suite for `CartillaStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `CartillaStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Insert**: record creation, duplicate id and UOM detection
//! - **Snapshot isolation**: uncommitted writes invisible, aborted writes discarded
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Audit coupling**: audit events commit and roll back with their change
//! - **Queries**: filtering, ordering and paging of listings
//! - **Pressure table**: whole-table replacement with version checks
//! - **Error handling**: correct error variants for missing records
//! - **Concurrency**: racing tasks, exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use cartilla_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod audit;
mod concurrent;
mod error;
mod insert;
mod query;
mod snapshot;
mod table;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{AuditEventRecord, CartillaRecord, PressureTableRecord};
use crate::CartillaStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "snapshot", "version").
    pub category: String,
    /// Test name (e.g. "insert_creates_record_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: CartillaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(audit::run_audit_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(table::run_table_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_cartilla(id: &str, uom_numero: &str, created_by: &str) -> CartillaRecord {
    CartillaRecord {
        id: id.to_string(),
        uom_numero: uom_numero.to_string(),
        estado: "BORRADOR".to_string(),
        created_by: created_by.to_string(),
        fecha_prueba: "2024-01-10".to_string(),
        version: 0,
        created_at: "2024-01-10T08:00:00Z".to_string(),
        updated_at: "2024-01-10T08:00:00Z".to_string(),
        document: serde_json::json!({"id": id, "uomNumero": uom_numero}),
    }
}

fn make_audit_event(id: &str, entity_id: &str, action: &str) -> AuditEventRecord {
    AuditEventRecord {
        id: id.to_string(),
        entity: "Cartilla".to_string(),
        entity_id: entity_id.to_string(),
        action: action.to_string(),
        actor_id: "test-actor".to_string(),
        timestamp: "2024-01-10T09:00:00Z".to_string(),
        changes: serde_json::json!({}),
    }
}

fn make_table(updated_by: &str) -> PressureTableRecord {
    PressureTableRecord {
        entries: serde_json::json!([{"psi": 16, "gph": 3.8}, {"psi": 17, "gph": 3.9}]),
        updated_by: updated_by.to_string(),
        updated_at: "2024-01-10T08:00:00Z".to_string(),
        version: 0,
    }
}

/// Insert `record` in its own snapshot and commit it.
async fn insert_committed<S: CartillaStorage>(s: &S, record: CartillaRecord) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_cartilla(&mut snap, record)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit insert: {e}"))
}

/// Move a committed cartilla to `estado` with an OCC update, returning the new version.
async fn update_committed<S: CartillaStorage>(
    s: &S,
    id: &str,
    estado: &str,
    expected_version: i64,
) -> Result<i64, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut record = s
        .get_cartilla_for_update(&mut snap, id)
        .await
        .map_err(|e| format!("read for update: {e}"))?;
    record.estado = estado.to_string();
    let version = s
        .update_cartilla(&mut snap, record, expected_version)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit update: {e}"))?;
    Ok(version)
}
