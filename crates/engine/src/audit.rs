use cartilla_core::{Actor, AuditAction};
use cartilla_storage::AuditEventRecord;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ServiceError;
use crate::record::format_timestamp;

/// Entity id used for pressure table audit events.
pub(crate) const PRESSURE_TABLE_ID: &str = "psi-gph";

/// What an audit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEntity {
    Cartilla,
    PsiGphConfig,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Cartilla => "Cartilla",
            AuditEntity::PsiGphConfig => "PsiGphConfig",
        }
    }

    pub fn parse(tag: &str) -> Option<AuditEntity> {
        [AuditEntity::Cartilla, AuditEntity::PsiGphConfig]
            .into_iter()
            .find(|e| e.as_str() == tag)
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub entity: AuditEntity,
    pub entity_id: String,
    pub action: AuditAction,
    pub actor_id: String,
    /// As stored: fixed-width UTC RFC 3339.
    pub timestamp: String,
    pub changes: serde_json::Value,
}

impl AuditEvent {
    pub(crate) fn new(
        entity: AuditEntity,
        entity_id: &str,
        action: AuditAction,
        actor: &Actor,
        at: OffsetDateTime,
        changes: serde_json::Value,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity,
            entity_id: entity_id.to_string(),
            action,
            actor_id: actor.id.clone(),
            timestamp: format_timestamp(at).map_err(|e| ServiceError::record(entity_id, e))?,
            changes,
        })
    }

    pub(crate) fn into_record(self) -> AuditEventRecord {
        AuditEventRecord {
            id: self.id,
            entity: self.entity.as_str().to_string(),
            entity_id: self.entity_id,
            action: self.action.as_str().to_string(),
            actor_id: self.actor_id,
            timestamp: self.timestamp,
            changes: self.changes,
        }
    }
}

impl TryFrom<AuditEventRecord> for AuditEvent {
    type Error = ServiceError;

    fn try_from(record: AuditEventRecord) -> Result<Self, Self::Error> {
        let entity = AuditEntity::parse(&record.entity).ok_or_else(|| {
            ServiceError::record(
                &record.entity_id,
                format!("unknown audit entity '{}'", record.entity),
            )
        })?;
        let action = AuditAction::parse(&record.action).ok_or_else(|| {
            ServiceError::record(
                &record.entity_id,
                format!("unknown audit action '{}'", record.action),
            )
        })?;
        Ok(Self {
            id: record.id,
            entity,
            entity_id: record.entity_id,
            action,
            actor_id: record.actor_id,
            timestamp: record.timestamp,
            changes: record.changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_mapping_uses_persisted_tags() {
        let event = AuditEvent::new(
            AuditEntity::Cartilla,
            "c-1",
            AuditAction::SendReview,
            &Actor::operador("op-1"),
            datetime!(2024-05-02 09:30 UTC),
            serde_json::json!({"estado": {"from": "BORRADOR", "to": "EN_REVISION"}}),
        )
        .unwrap();
        let record = event.clone().into_record();
        assert_eq!(record.entity, "Cartilla");
        assert_eq!(record.action, "SEND_REVIEW");
        assert_eq!(record.actor_id, "op-1");
        assert_eq!(record.timestamp, "2024-05-02T09:30:00.000000Z");

        let back = AuditEvent::try_from(record).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let record = AuditEventRecord {
            id: "a-1".to_string(),
            entity: "Cartilla".to_string(),
            entity_id: "c-1".to_string(),
            action: "ARCHIVE".to_string(),
            actor_id: "op-1".to_string(),
            timestamp: "2024-05-02T09:30:00.000000Z".to_string(),
            changes: serde_json::json!({}),
        };
        assert!(matches!(
            AuditEvent::try_from(record),
            Err(ServiceError::Record { .. })
        ));
    }
}
