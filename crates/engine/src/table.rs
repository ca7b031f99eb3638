//! The shared pressure table.
//!
//! Readers take an `Arc` clone and keep using it for the whole request, so a
//! concurrent replacement can never hand them a half-updated table.
//!
//! Each installed table carries the storage version it was committed at.
//! Replacements that finish out of commit order cannot roll the registry
//! back: a table is installed only over an older version.

use std::sync::{Arc, PoisonError, RwLock};

use cartilla_core::{LeakFlowError, PressureFlowEntry, PressureTable};
use cartilla_storage::PressureTableRecord;

use crate::error::ServiceError;

#[derive(Debug)]
struct Installed {
    /// `None` for a table that was never stored (built-in or supplied).
    version: Option<i64>,
    table: Arc<PressureTable>,
}

#[derive(Debug)]
pub struct TableRegistry {
    current: RwLock<Installed>,
}

impl TableRegistry {
    /// A registry holding a table that has no stored version.
    pub fn new(table: PressureTable) -> Self {
        Self::build(None, table)
    }

    /// A registry holding the table stored at `version`.
    pub fn at_version(table: PressureTable, version: i64) -> Self {
        Self::build(Some(version), table)
    }

    fn build(version: Option<i64>, table: PressureTable) -> Self {
        Self {
            current: RwLock::new(Installed {
                version,
                table: Arc::new(table),
            }),
        }
    }

    /// The table in force right now.
    pub fn current(&self) -> Arc<PressureTable> {
        // A single Arc cannot be left half-written, so poisoning is ignored.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .table
            .clone()
    }

    /// Stored version of the table in force, if it came from storage.
    pub fn version(&self) -> Option<i64> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Swap in `table`, committed at `version`, as a whole.
    ///
    /// Returns `false` and leaves the registry alone when a table of the
    /// same or a later version is already installed.
    pub fn install(&self, version: i64, table: Arc<PressureTable>) -> bool {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.version >= Some(version) {
            return false;
        }
        *guard = Installed {
            version: Some(version),
            table,
        };
        true
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new(PressureTable::default())
    }
}

pub(crate) fn entries_value(table: &PressureTable) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(table)
        .map_err(|e| ServiceError::record(crate::audit::PRESSURE_TABLE_ID, e))
}

/// Rebuild a table from its stored form, re-running table validation.
pub(crate) fn from_record(record: &PressureTableRecord) -> Result<PressureTable, ServiceError> {
    let entries: Vec<PressureFlowEntry> = serde_json::from_value(record.entries.clone())
        .map_err(|e| LeakFlowError::InvalidConfiguration {
            reason: format!("stored table: {e}"),
        })?;
    Ok(PressureTable::new(entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_swaps_the_whole_table() {
        let registry = TableRegistry::default();
        let before = registry.current();
        assert_eq!(before.len(), 33);
        assert_eq!(registry.version(), None);

        let small = Arc::new(PressureTable::from_pairs(&[(10.0, 1.0), (20.0, 2.0)]).unwrap());
        assert!(registry.install(0, small.clone()));
        assert!(Arc::ptr_eq(&registry.current(), &small));
        assert_eq!(registry.version(), Some(0));
        // A reader holding the old Arc is unaffected.
        assert_eq!(before.len(), 33);
    }

    #[test]
    fn older_version_never_replaces_newer() {
        let newer = Arc::new(PressureTable::from_pairs(&[(30.0, 3.0), (40.0, 4.0)]).unwrap());
        let older = Arc::new(PressureTable::from_pairs(&[(10.0, 1.0), (20.0, 2.0)]).unwrap());
        let registry = TableRegistry::at_version(PressureTable::default(), 3);

        assert!(!registry.install(3, older.clone()));
        assert!(registry.install(5, newer.clone()));
        assert!(!registry.install(4, older));
        assert!(Arc::ptr_eq(&registry.current(), &newer));
        assert_eq!(registry.version(), Some(5));
    }

    #[test]
    fn stored_table_round_trips() {
        let table = PressureTable::from_pairs(&[(16.0, 3.8), (20.0, 4.3)]).unwrap();
        let record = PressureTableRecord {
            entries: entries_value(&table).unwrap(),
            updated_by: "admin-1".to_string(),
            updated_at: "2024-01-01T00:00:00.000000Z".to_string(),
            version: 0,
        };
        assert_eq!(from_record(&record).unwrap(), table);
    }

    #[test]
    fn invalid_stored_table_is_a_configuration_error() {
        let record = PressureTableRecord {
            entries: serde_json::json!([{"psi": 20, "gph": 4.3}, {"psi": 16, "gph": 3.8}]),
            updated_by: "admin-1".to_string(),
            updated_at: "2024-01-01T00:00:00.000000Z".to_string(),
            version: 0,
        };
        assert!(matches!(
            from_record(&record),
            Err(ServiceError::LeakFlow(LeakFlowError::InvalidConfiguration { .. }))
        ));
    }
}
