//! Cartilla review workflow.
//!
//! The lifecycle is a fixed transition table:
//!
//! | from          | event             | to           | who               |
//! |---------------|-------------------|--------------|-------------------|
//! | `BORRADOR`    | submit for review | `EN_REVISION`| owner or admin    |
//! | `EN_REVISION` | approve           | `APROBADA`   | supervisor, admin |
//! | `EN_REVISION` | reject            | `RECHAZADA`  | supervisor, admin |
//!
//! Any other `(state, event)` pair is an `InvalidTransition`. Applying an
//! event is validate-then-build: the guards run against the current record
//! and a new record is produced only once all of them pass, so a failed
//! event never leaves a partially changed cartilla behind.
//!
//! Guard order: actor authorization, then the transition table, then the
//! event payload (the rejection comment).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::WorkflowError;
use crate::types::{Actor, AuditAction, Cartilla, Estado, Operation, ReviewAction, ReviewComment};

/// A workflow event requested by an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SubmitForReview,
    Approve {
        #[serde(default)]
        comment: Option<String>,
    },
    Reject {
        #[serde(default)]
        comment: Option<String>,
    },
}

impl Event {
    pub fn operation(&self) -> Operation {
        match self {
            Event::SubmitForReview => Operation::SubmitForReview,
            Event::Approve { .. } => Operation::Approve,
            Event::Reject { .. } => Operation::Reject,
        }
    }

    /// Audit tag recorded for a successful event.
    pub fn audit_action(&self) -> AuditAction {
        match self {
            Event::SubmitForReview => AuditAction::SendReview,
            Event::Approve { .. } => AuditAction::Approve,
            Event::Reject { .. } => AuditAction::Reject,
        }
    }
}

/// A validated state change, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Estado,
    pub to: Estado,
    pub action: AuditAction,
    /// The review comment to append, if any.
    pub comment: Option<ReviewComment>,
}

/// The transition table. `None` means the event is not defined in `state`.
pub fn target_state(state: Estado, event: &Event) -> Option<Estado> {
    match (state, event) {
        (Estado::Draft, Event::SubmitForReview) => Some(Estado::InReview),
        (Estado::InReview, Event::Approve { .. }) => Some(Estado::Approved),
        (Estado::InReview, Event::Reject { .. }) => Some(Estado::Rejected),
        _ => None,
    }
}

fn authorize(cartilla: &Cartilla, event: &Event, actor: &Actor) -> Result<(), WorkflowError> {
    let allowed = match event {
        Event::SubmitForReview => actor.role.is_admin() || cartilla.is_owned_by(actor),
        Event::Approve { .. } | Event::Reject { .. } => actor.role.is_reviewer(),
    };
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            actor_id: actor.id.clone(),
            role: actor.role,
            operation: event.operation(),
        })
    }
}

/// Blank comments count as absent.
fn non_blank(comment: &Option<String>) -> Option<String> {
    comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Validate `event` against `cartilla` for `actor` without changing anything.
pub fn plan(
    cartilla: &Cartilla,
    event: &Event,
    actor: &Actor,
    at: OffsetDateTime,
) -> Result<Transition, WorkflowError> {
    authorize(cartilla, event, actor)?;

    let from = cartilla.estado();
    let to = target_state(from, event).ok_or(WorkflowError::InvalidTransition {
        state: from,
        operation: event.operation(),
    })?;

    let comment = match event {
        Event::SubmitForReview => None,
        Event::Approve { comment } => non_blank(comment).map(|comment| ReviewComment {
            author: actor.id.clone(),
            timestamp: at,
            action: ReviewAction::Approve,
            comment,
        }),
        Event::Reject { comment } => {
            let comment = non_blank(comment).ok_or(WorkflowError::MissingComment)?;
            Some(ReviewComment {
                author: actor.id.clone(),
                timestamp: at,
                action: ReviewAction::Reject,
                comment,
            })
        }
    };

    Ok(Transition {
        from,
        to,
        action: event.audit_action(),
        comment,
    })
}

impl Cartilla {
    /// Apply `event`, returning the next record and the transition taken.
    ///
    /// `self` is never modified; on error nothing is produced.
    pub fn apply(
        &self,
        event: &Event,
        actor: &Actor,
        at: OffsetDateTime,
    ) -> Result<(Cartilla, Transition), WorkflowError> {
        let transition = match plan(self, event, actor, at) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(
                    cartilla_id = %self.id,
                    actor_id = %actor.id,
                    estado = %self.estado(),
                    error = %e,
                    "workflow guard rejected event"
                );
                return Err(e);
            }
        };
        let next = self.transitioned(transition.to, transition.comment.clone(), actor, at);
        Ok((next, transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leak_flow::PressureTable;
    use crate::types::{CartillaDraft, Instalacion, ResultadoPrueba, LeakTestInput};
    use time::macros::{date, datetime};

    const T0: OffsetDateTime = datetime!(2024-03-05 10:00 UTC);
    const T1: OffsetDateTime = datetime!(2024-03-05 11:00 UTC);

    fn draft_owned_by(owner: &Actor) -> Cartilla {
        let mut d = CartillaDraft::new(
            "UOM-7",
            Instalacion {
                rut: "1-9".to_string(),
                nombre_sitio: "Sitio".to_string(),
                ..Default::default()
            },
            date!(2024 - 03 - 05),
            "Inspector",
        );
        d.pruebas
            .push(LeakTestInput::new("1", "A", Some(25.0), ResultadoPrueba::Pasa));
        let content = d.measure(&PressureTable::default()).unwrap();
        Cartilla::new_draft("c-1", content, owner, T0)
    }

    fn in_state(state: Estado) -> Cartilla {
        let owner = Actor::operador("op-1");
        let admin = Actor::admin("adm");
        let c = draft_owned_by(&owner);
        match state {
            Estado::Draft => c,
            Estado::InReview => c.apply(&Event::SubmitForReview, &owner, T0).unwrap().0,
            Estado::Approved => in_state(Estado::InReview)
                .apply(&Event::Approve { comment: None }, &admin, T0)
                .unwrap()
                .0,
            Estado::Rejected => in_state(Estado::InReview)
                .apply(
                    &Event::Reject {
                        comment: Some("mal".to_string()),
                    },
                    &admin,
                    T0,
                )
                .unwrap()
                .0,
        }
    }

    fn all_events() -> Vec<Event> {
        vec![
            Event::SubmitForReview,
            Event::Approve {
                comment: Some("ok".to_string()),
            },
            Event::Reject {
                comment: Some("no".to_string()),
            },
        ]
    }

    #[test]
    fn owner_submits_draft() {
        let owner = Actor::operador("op-1");
        let c = draft_owned_by(&owner);
        let (next, t) = c.apply(&Event::SubmitForReview, &owner, T1).unwrap();

        assert_eq!(next.estado(), Estado::InReview);
        assert_eq!(t.action, AuditAction::SendReview);
        assert!(next.comentarios_revision().is_empty());
        assert_eq!(next.updated_by(), Some("op-1"));
        assert_eq!(next.updated_at(), T1);
        assert_eq!(c.estado(), Estado::Draft);
    }

    #[test]
    fn admin_may_submit_someone_elses_draft() {
        let c = draft_owned_by(&Actor::operador("op-1"));
        let (next, _) = c.apply(&Event::SubmitForReview, &Actor::admin("adm"), T1).unwrap();
        assert_eq!(next.estado(), Estado::InReview);
        assert_eq!(next.created_by(), "op-1");
    }

    #[test]
    fn supervisor_cannot_submit_someone_elses_draft() {
        let c = draft_owned_by(&Actor::operador("op-1"));
        let err = c
            .apply(&Event::SubmitForReview, &Actor::supervisor("sup"), T1)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { operation: Operation::SubmitForReview, .. }));
    }

    #[test]
    fn only_submit_succeeds_from_draft() {
        let c = in_state(Estado::Draft);
        let reviewer = Actor::supervisor("sup");
        for event in [
            Event::Approve { comment: None },
            Event::Reject {
                comment: Some("x".to_string()),
            },
        ] {
            let err = c.apply(&event, &reviewer, T1).unwrap_err();
            assert!(
                matches!(err, WorkflowError::InvalidTransition { state: Estado::Draft, .. }),
                "{event:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn approve_appends_optional_comment() {
        let sup = Actor::supervisor("sup");
        let c = in_state(Estado::InReview);

        let (silent, _) = c.apply(&Event::Approve { comment: None }, &sup, T1).unwrap();
        assert_eq!(silent.estado(), Estado::Approved);
        assert!(silent.comentarios_revision().is_empty());

        let (noted, t) = c
            .apply(
                &Event::Approve {
                    comment: Some("Conforme".to_string()),
                },
                &sup,
                T1,
            )
            .unwrap();
        assert_eq!(t.action, AuditAction::Approve);
        assert_eq!(noted.comentarios_revision().len(), 1);
        let comment = &noted.comentarios_revision()[0];
        assert_eq!(comment.action, ReviewAction::Approve);
        assert_eq!(comment.author, "sup");
        assert_eq!(comment.comment, "Conforme");
    }

    #[test]
    fn blank_approval_comment_is_not_recorded() {
        let (next, _) = in_state(Estado::InReview)
            .apply(
                &Event::Approve {
                    comment: Some("   ".to_string()),
                },
                &Actor::admin("adm"),
                T1,
            )
            .unwrap();
        assert!(next.comentarios_revision().is_empty());
    }

    #[test]
    fn reject_records_mandatory_comment() {
        let (next, t) = in_state(Estado::InReview)
            .apply(
                &Event::Reject {
                    comment: Some("Presión fuera de rango".to_string()),
                },
                &Actor::supervisor("sup"),
                T1,
            )
            .unwrap();
        assert_eq!(next.estado(), Estado::Rejected);
        assert_eq!(next.estado().as_str(), "RECHAZADA");
        assert_eq!(t.action, AuditAction::Reject);
        assert_eq!(next.comentarios_revision().len(), 1);
        assert_eq!(next.comentarios_revision()[0].comment, "Presión fuera de rango");
        assert_eq!(next.comentarios_revision()[0].action, ReviewAction::Reject);
    }

    #[test]
    fn reject_without_comment_fails_and_changes_nothing() {
        let c = in_state(Estado::InReview);
        for comment in [None, Some(String::new()), Some("  \n".to_string())] {
            let err = c
                .apply(&Event::Reject { comment }, &Actor::supervisor("sup"), T1)
                .unwrap_err();
            assert_eq!(err, WorkflowError::MissingComment);
        }
        assert_eq!(c.estado(), Estado::InReview);
        assert!(c.comentarios_revision().is_empty());
    }

    #[test]
    fn operador_cannot_review() {
        let owner = Actor::operador("op-1");
        let c = in_state(Estado::InReview);
        let err = c.apply(&Event::Approve { comment: None }, &owner, T1).unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { operation: Operation::Approve, .. }));
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let admin = Actor::admin("adm");
        for state in [Estado::Approved, Estado::Rejected] {
            let c = in_state(state);
            for event in all_events() {
                let err = c.apply(&event, &admin, T1).unwrap_err();
                assert!(
                    matches!(err, WorkflowError::InvalidTransition { .. }),
                    "{state} {event:?} -> {err:?}"
                );
            }
        }
    }

    #[test]
    fn transition_table_is_exhaustive() {
        let mut defined = Vec::new();
        for state in Estado::ALL {
            for event in all_events() {
                if let Some(to) = target_state(state, &event) {
                    defined.push((state, event.operation(), to));
                }
            }
        }
        assert_eq!(
            defined,
            vec![
                (Estado::Draft, Operation::SubmitForReview, Estado::InReview),
                (Estado::InReview, Operation::Approve, Estado::Approved),
                (Estado::InReview, Operation::Reject, Estado::Rejected),
            ]
        );
    }

    #[test]
    fn approval_comment_carries_author_and_time() {
        let sup = Actor::supervisor("sup");
        let c = in_state(Estado::InReview);
        let (approved, _) = c
            .apply(
                &Event::Approve {
                    comment: Some("primero".to_string()),
                },
                &sup,
                T1,
            )
            .unwrap();
        assert_eq!(approved.comentarios_revision()[0].comment, "primero");
        assert_eq!(approved.comentarios_revision()[0].author, "sup");
        assert_eq!(approved.comentarios_revision()[0].timestamp, T1);
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(Event::Reject {
            comment: Some("x".to_string()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"event": "reject", "comment": "x"}));
    }
}
