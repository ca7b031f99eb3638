use std::sync::Arc;

use cartilla_core::{
    check_delete, check_edit, check_view, Actor, AuditAction, Cartilla, CartillaDraft, Estado,
    Event, LeakFlow, LeakFlowError, Operation, PressureFlowEntry, PressureTable, WorkflowError,
};
use cartilla_storage::{CartillaQuery, CartillaStorage, PressureTableRecord};
use serde_json::json;
use time::OffsetDateTime;

use crate::audit::{AuditEntity, AuditEvent, PRESSURE_TABLE_ID};
use crate::error::ServiceError;
use crate::query::{CartillaFilter, EstadoStats, Page};
use crate::record::{self, format_timestamp};
use crate::table::{self, TableRegistry};

/// Cartilla operations over a storage backend.
///
/// Share one service per process (behind an `Arc` when tasks need it); the
/// pressure table it measures with is held in its [`TableRegistry`].
pub struct CartillaService<S: CartillaStorage> {
    storage: S,
    tables: TableRegistry,
}

impl<S: CartillaStorage> CartillaService<S> {
    /// Start a service with the persisted pressure table, or the built-in
    /// calibration table if none has been stored yet.
    pub async fn load(storage: S) -> Result<Self, ServiceError> {
        let tables = match storage.get_pressure_table().await? {
            Some(stored) => {
                let table = table::from_record(&stored)?;
                tracing::info!(
                    entries = table.len(),
                    version = stored.version,
                    "loaded stored pressure table"
                );
                TableRegistry::at_version(table, stored.version)
            }
            None => {
                tracing::info!("no stored pressure table, using built-in calibration table");
                TableRegistry::default()
            }
        };
        Ok(Self { storage, tables })
    }

    pub fn with_table(storage: S, table: PressureTable) -> Self {
        Self {
            storage,
            tables: TableRegistry::new(table),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// The table currently used to derive `flujoFugaGPH`.
    pub fn table(&self) -> Arc<PressureTable> {
        self.tables.current()
    }

    /// Leak-flow lookup against the current table, for live form feedback.
    pub fn compute_leak_flow(&self, psi: Option<f64>) -> Result<LeakFlow, LeakFlowError> {
        cartilla_core::compute_leak_flow(psi, &self.table())
    }

    // ── Snapshot plumbing ───────────────────────────────────────────────────

    /// Commit `snapshot` if everything staged in it succeeded, abort it
    /// otherwise.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        staged: Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let result = match staged {
            Ok(value) => self
                .storage
                .commit_snapshot(snapshot)
                .await
                .map(|()| value)
                .map_err(ServiceError::from),
            Err(e) => {
                if let Err(abort) = self.storage.abort_snapshot(snapshot).await {
                    tracing::warn!(error = %abort, cause = %e, "snapshot abort failed");
                }
                Err(e)
            }
        };
        if let Err(ServiceError::Conflict { entity, id }) = &result {
            tracing::warn!(entity = %entity, id = %id, "optimistic concurrency conflict");
        }
        result
    }

    async fn audit(
        &self,
        snapshot: &mut S::Snapshot,
        event: AuditEvent,
    ) -> Result<(), ServiceError> {
        self.storage
            .insert_audit_event(snapshot, event.into_record())
            .await?;
        Ok(())
    }

    // ── Record lifecycle ────────────────────────────────────────────────────

    /// Create a `BORRADOR` cartilla owned by `actor`.
    ///
    /// Every test's `flujoFugaGPH` is derived from the current table; an
    /// invalid pressure fails the whole call and nothing is stored.
    pub async fn create(
        &self,
        actor: &Actor,
        draft: CartillaDraft,
    ) -> Result<Cartilla, ServiceError> {
        require_uom(&draft)?;
        let content = draft.measure(&self.table())?;
        let now = OffsetDateTime::now_utc();
        let cartilla = Cartilla::new_draft(uuid::Uuid::new_v4().to_string(), content, actor, now);

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = async {
            self.storage
                .insert_cartilla(&mut snapshot, record::encode(&cartilla, 0)?)
                .await?;
            let event = AuditEvent::new(
                AuditEntity::Cartilla,
                &cartilla.id,
                AuditAction::Create,
                actor,
                now,
                json!({ "uomNumero": cartilla.uom_numero(), "estado": cartilla.estado() }),
            )?;
            self.audit(&mut snapshot, event).await
        }
        .await;
        self.finish(snapshot, staged).await?;

        tracing::info!(
            cartilla_id = %cartilla.id,
            actor_id = %actor.id,
            uom_numero = %cartilla.uom_numero(),
            pruebas = cartilla.pruebas().len(),
            "cartilla created"
        );
        Ok(cartilla)
    }

    /// Read one cartilla. Owner-scoped actors only see their own.
    pub async fn get(&self, id: &str, actor: &Actor) -> Result<Cartilla, ServiceError> {
        let cartilla = record::decode(&self.storage.get_cartilla(id).await?)?;
        check_view(&cartilla, actor).inspect_err(|e| log_guard(&cartilla, actor, e))?;
        Ok(cartilla)
    }

    /// Newest first, owner scope applied for `OPERADOR`.
    pub async fn list(
        &self,
        actor: &Actor,
        filter: &CartillaFilter,
    ) -> Result<Page<Cartilla>, ServiceError> {
        let query = filter.to_query(actor)?;
        let records = self.storage.list_cartillas(&query).await?;
        let total = self.storage.count_cartillas(&query).await?;
        let items = records
            .iter()
            .map(record::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, filter.page(), filter.limit(), total))
    }

    /// Per-state counts over what `actor` can see.
    pub async fn stats(&self, actor: &Actor) -> Result<EstadoStats, ServiceError> {
        let scope = CartillaQuery {
            created_by: cartilla_core::owner_scope(actor).map(str::to_string),
            ..Default::default()
        };
        let mut stats = EstadoStats {
            total: self.storage.count_cartillas(&scope).await?,
            ..Default::default()
        };
        for estado in Estado::ALL {
            let query = CartillaQuery {
                estado: Some(estado.as_str().to_string()),
                ..scope.clone()
            };
            stats.set(estado, self.storage.count_cartillas(&query).await?);
        }
        Ok(stats)
    }

    /// Replace the editable content of a cartilla.
    ///
    /// Admins may always edit; owners only while the cartilla is `BORRADOR`.
    /// Test flow values are recomputed from the current table.
    pub async fn update(
        &self,
        id: &str,
        actor: &Actor,
        draft: CartillaDraft,
    ) -> Result<Cartilla, ServiceError> {
        require_uom(&draft)?;
        let table = self.table();
        let now = OffsetDateTime::now_utc();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = async {
            let stored = self.storage.get_cartilla_for_update(&mut snapshot, id).await?;
            let current = record::decode(&stored)?;
            check_edit(&current, actor).inspect_err(|e| log_guard(&current, actor, e))?;

            let next = current.with_content(draft.measure(&table)?, actor, now);
            self.storage
                .update_cartilla(&mut snapshot, record::encode(&next, stored.version)?, stored.version)
                .await?;
            let event = AuditEvent::new(
                AuditEntity::Cartilla,
                id,
                AuditAction::Update,
                actor,
                now,
                json!({ "uomNumero": next.uom_numero(), "pruebas": next.pruebas().len() }),
            )?;
            self.audit(&mut snapshot, event).await?;
            Ok::<_, ServiceError>(next)
        }
        .await;
        let next = self.finish(snapshot, staged).await?;

        tracing::info!(cartilla_id = %id, actor_id = %actor.id, "cartilla updated");
        Ok(next)
    }

    /// Delete a cartilla. Same permission rule as [`update`](Self::update).
    pub async fn delete(&self, id: &str, actor: &Actor) -> Result<(), ServiceError> {
        let now = OffsetDateTime::now_utc();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = async {
            let stored = self.storage.get_cartilla_for_update(&mut snapshot, id).await?;
            let current = record::decode(&stored)?;
            check_delete(&current, actor).inspect_err(|e| log_guard(&current, actor, e))?;

            self.storage
                .delete_cartilla(&mut snapshot, id, stored.version)
                .await?;
            let event = AuditEvent::new(
                AuditEntity::Cartilla,
                id,
                AuditAction::Delete,
                actor,
                now,
                json!({ "uomNumero": current.uom_numero(), "estado": current.estado() }),
            )?;
            self.audit(&mut snapshot, event).await
        }
        .await;
        self.finish(snapshot, staged).await?;

        tracing::info!(cartilla_id = %id, actor_id = %actor.id, "cartilla deleted");
        Ok(())
    }

    // ── Workflow actions ────────────────────────────────────────────────────

    /// `BORRADOR` → `EN_REVISION`, by the owner or an admin.
    pub async fn submit_for_review(&self, id: &str, actor: &Actor) -> Result<Cartilla, ServiceError> {
        self.apply_event(id, actor, Event::SubmitForReview).await
    }

    /// `EN_REVISION` → `APROBADA`, by a reviewer, with an optional comment.
    pub async fn approve(
        &self,
        id: &str,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<Cartilla, ServiceError> {
        let comment = comment.map(str::to_string);
        self.apply_event(id, actor, Event::Approve { comment }).await
    }

    /// `EN_REVISION` → `RECHAZADA`, by a reviewer. The comment is mandatory.
    pub async fn reject(
        &self,
        id: &str,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<Cartilla, ServiceError> {
        let comment = comment.map(str::to_string);
        self.apply_event(id, actor, Event::Reject { comment }).await
    }

    /// Run one workflow event as a single read-modify-write.
    ///
    /// The record is read with its version, the transition is validated and
    /// built by [`Cartilla::apply`], and the new record is written only if
    /// the stored version is still the one read. The audit event goes into
    /// the same snapshot. Any failure aborts the snapshot and leaves the
    /// stored record as it was.
    pub async fn apply_event(
        &self,
        id: &str,
        actor: &Actor,
        event: Event,
    ) -> Result<Cartilla, ServiceError> {
        let now = OffsetDateTime::now_utc();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = async {
            let stored = self.storage.get_cartilla_for_update(&mut snapshot, id).await?;
            let current = record::decode(&stored)?;
            let (next, transition) = current.apply(&event, actor, now)?;

            self.storage
                .update_cartilla(&mut snapshot, record::encode(&next, stored.version)?, stored.version)
                .await?;
            let changes = json!({
                "estado": { "from": transition.from, "to": transition.to },
                "comentario": transition.comment.as_ref().map(|c| c.comment.as_str()),
            });
            let audit = AuditEvent::new(
                AuditEntity::Cartilla,
                id,
                transition.action,
                actor,
                now,
                changes,
            )?;
            self.audit(&mut snapshot, audit).await?;
            Ok::<_, ServiceError>((next, transition))
        }
        .await;
        let (next, transition) = self.finish(snapshot, staged).await?;

        tracing::info!(
            cartilla_id = %id,
            actor_id = %actor.id,
            from = %transition.from,
            to = %transition.to,
            action = %transition.action,
            "cartilla transitioned"
        );
        Ok(next)
    }

    /// Audit events recorded for cartilla `id`, oldest first.
    pub async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEvent>, ServiceError> {
        self.storage
            .list_audit_events(Some(id))
            .await?
            .into_iter()
            .map(AuditEvent::try_from)
            .collect()
    }

    // ── Pressure table administration ───────────────────────────────────────

    /// Replace the shared pressure table. Admin only.
    ///
    /// The new table is validated, stored with its audit event in one
    /// snapshot, and only then swapped in. A replacement that commits
    /// before another but finishes after it does not displace the later
    /// table. Cartillas already stored keep the flow values they were
    /// measured with.
    pub async fn replace_table(
        &self,
        actor: &Actor,
        entries: Vec<PressureFlowEntry>,
    ) -> Result<Arc<PressureTable>, ServiceError> {
        if !actor.role.is_admin() {
            let e = WorkflowError::Forbidden {
                actor_id: actor.id.clone(),
                role: actor.role,
                operation: Operation::ReplaceTable,
            };
            tracing::debug!(actor_id = %actor.id, error = %e, "table replacement refused");
            return Err(e.into());
        }
        let table = Arc::new(PressureTable::new(entries)?);
        let now = OffsetDateTime::now_utc();
        let expected_version = self
            .storage
            .get_pressure_table()
            .await?
            .map(|stored| stored.version);

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = async {
            let stored = PressureTableRecord {
                entries: table::entries_value(&table)?,
                updated_by: actor.id.clone(),
                updated_at: format_timestamp(now)
                    .map_err(|e| ServiceError::record(PRESSURE_TABLE_ID, e))?,
                version: 0,
            };
            let version = self
                .storage
                .put_pressure_table(&mut snapshot, stored, expected_version)
                .await?;
            let event = AuditEvent::new(
                AuditEntity::PsiGphConfig,
                PRESSURE_TABLE_ID,
                AuditAction::Update,
                actor,
                now,
                json!({
                    "entries": table.len(),
                    "minPsi": table.min().psi.normalize().to_string(),
                    "maxPsi": table.max().psi.normalize().to_string(),
                    "version": version,
                }),
            )?;
            self.audit(&mut snapshot, event).await?;
            Ok::<_, ServiceError>(version)
        }
        .await;
        let version = self.finish(snapshot, staged).await?;

        if self.tables.install(version, table.clone()) {
            tracing::info!(
                actor_id = %actor.id,
                entries = table.len(),
                version,
                "pressure table replaced"
            );
        } else {
            tracing::debug!(
                actor_id = %actor.id,
                version,
                installed = ?self.tables.version(),
                "newer pressure table already in force"
            );
        }
        Ok(table)
    }
}

fn require_uom(draft: &CartillaDraft) -> Result<(), ServiceError> {
    if draft.uom_numero.trim().is_empty() {
        return Err(ServiceError::MissingField { field: "uomNumero" });
    }
    Ok(())
}

fn log_guard(cartilla: &Cartilla, actor: &Actor, error: &WorkflowError) {
    tracing::debug!(
        cartilla_id = %cartilla.id,
        actor_id = %actor.id,
        estado = %cartilla.estado(),
        error = %error,
        "access guard rejected request"
    );
}
