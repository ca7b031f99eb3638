use serde::{Deserialize, Serialize};

/// A stored cartilla: indexed columns plus the full JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartillaRecord {
    pub id: String,
    pub uom_numero: String,
    /// Persisted workflow tag (`BORRADOR`, `EN_REVISION`, ...).
    pub estado: String,
    pub created_by: String,
    /// Test date, `YYYY-MM-DD`.
    pub fecha_prueba: String,
    /// Optimistic concurrency token. 0 on insert, +1 per update.
    pub version: i64,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// RFC 3339 timestamp string.
    pub updated_at: String,
    pub document: serde_json::Value,
}

/// One audit log entry, written in the same snapshot as the change it records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventRecord {
    pub id: String,
    /// `Cartilla` or `PsiGphConfig`.
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: String,
    /// RFC 3339 timestamp string.
    pub timestamp: String,
    pub changes: serde_json::Value,
}

/// The persisted pressure table. Replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureTableRecord {
    /// JSON list of `{psi, gph}` objects.
    pub entries: serde_json::Value,
    pub updated_by: String,
    /// RFC 3339 timestamp string.
    pub updated_at: String,
    pub version: i64,
}

/// Filter and paging for cartilla listings.
///
/// Date bounds are inclusive `YYYY-MM-DD` strings. `limit == 0` means no limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartillaQuery {
    pub created_by: Option<String>,
    pub estado: Option<String>,
    pub fecha_desde: Option<String>,
    pub fecha_hasta: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl CartillaQuery {
    /// Whether `record` passes the filters (paging is not considered).
    pub fn matches(&self, record: &CartillaRecord) -> bool {
        if let Some(owner) = &self.created_by {
            if &record.created_by != owner {
                return false;
            }
        }
        if let Some(estado) = &self.estado {
            if &record.estado != estado {
                return false;
            }
        }
        if let Some(desde) = &self.fecha_desde {
            if record.fecha_prueba.as_str() < desde.as_str() {
                return false;
            }
        }
        if let Some(hasta) = &self.fecha_hasta {
            if record.fecha_prueba.as_str() > hasta.as_str() {
                return false;
            }
        }
        true
    }
}
