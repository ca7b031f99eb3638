//! Review workflow through the service: state changes, review comments,
//! audit events and lost-update protection.

mod common;

use std::sync::Arc;

use cartilla_core::{Actor, AuditAction, Estado, ReviewAction, WorkflowError};
use cartilla_engine::{CartillaService, ServiceError};
use common::{draft, service, GatedStorage};

#[tokio::test]
async fn owner_submits_draft_for_review() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let created = svc.create(&owner, draft("UOM-100", &[25.0])).await.unwrap();

    let submitted = svc.submit_for_review(&created.id, &owner).await.unwrap();
    assert_eq!(submitted.estado(), Estado::InReview);
    assert!(submitted.comentarios_revision().is_empty());
    assert_eq!(submitted.updated_by(), Some("op-1"));

    let stored = svc.get(&created.id, &owner).await.unwrap();
    assert_eq!(stored, submitted);

    let actions: Vec<AuditAction> = svc
        .audit_trail(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, [AuditAction::Create, AuditAction::SendReview]);
}

#[tokio::test]
async fn supervisor_rejects_with_comment() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let supervisor = Actor::supervisor("sup-1");
    let id = svc.create(&owner, draft("UOM-101", &[30.0])).await.unwrap().id;
    svc.submit_for_review(&id, &owner).await.unwrap();

    let rejected = svc
        .reject(&id, &supervisor, Some("Presión fuera de rango"))
        .await
        .unwrap();
    assert_eq!(rejected.estado(), Estado::Rejected);
    let comments = rejected.comentarios_revision();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].comment, "Presión fuera de rango");
    assert_eq!(comments[0].action, ReviewAction::Reject);
    assert_eq!(comments[0].author, "sup-1");

    let trail = svc.audit_trail(&id).await.unwrap();
    let last = trail.last().unwrap();
    assert_eq!(last.action, AuditAction::Reject);
    assert_eq!(last.actor_id, "sup-1");
    assert_eq!(last.changes["estado"]["to"], "RECHAZADA");
    assert_eq!(last.changes["comentario"], "Presión fuera de rango");
}

#[tokio::test]
async fn approve_appends_optional_comment() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let admin = Actor::admin("adm-1");
    let a = svc.create(&owner, draft("UOM-102", &[20.0])).await.unwrap().id;
    let b = svc.create(&owner, draft("UOM-103", &[20.0])).await.unwrap().id;
    svc.submit_for_review(&a, &owner).await.unwrap();
    svc.submit_for_review(&b, &admin).await.unwrap();

    let silent = svc.approve(&a, &admin, None).await.unwrap();
    assert_eq!(silent.estado(), Estado::Approved);
    assert!(silent.comentarios_revision().is_empty());

    let noted = svc.approve(&b, &admin, Some("Conforme")).await.unwrap();
    assert_eq!(noted.comentarios_revision().len(), 1);
    assert_eq!(noted.comentarios_revision()[0].action, ReviewAction::Approve);
    // Ownership stays with the creator.
    assert_eq!(noted.created_by(), "op-1");
}

#[tokio::test]
async fn reject_without_comment_leaves_record_unchanged() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let supervisor = Actor::supervisor("sup-1");
    let id = svc.create(&owner, draft("UOM-104", &[18.0])).await.unwrap().id;
    let before = svc.submit_for_review(&id, &owner).await.unwrap();

    for comment in [None, Some(""), Some("   ")] {
        let err = svc.reject(&id, &supervisor, comment).await.unwrap_err();
        assert!(
            matches!(err, ServiceError::Workflow(WorkflowError::MissingComment)),
            "{err}"
        );
    }

    assert_eq!(svc.get(&id, &supervisor).await.unwrap(), before);
    assert_eq!(svc.audit_trail(&id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn approving_an_approved_cartilla_is_an_invalid_transition() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let admin = Actor::admin("adm-1");
    let id = svc.create(&owner, draft("UOM-105", &[40.0])).await.unwrap().id;
    svc.submit_for_review(&id, &owner).await.unwrap();
    let approved = svc.approve(&id, &admin, None).await.unwrap();

    let err = svc.approve(&id, &admin, Some("otra vez")).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Workflow(WorkflowError::InvalidTransition {
            state: Estado::Approved,
            ..
        })
    ));
    assert!(!err.is_retryable());
    assert_eq!(svc.get(&id, &admin).await.unwrap(), approved);
}

#[tokio::test]
async fn review_events_on_a_draft_are_invalid() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let supervisor = Actor::supervisor("sup-1");
    let id = svc.create(&owner, draft("UOM-106", &[22.0])).await.unwrap().id;

    let approve = svc.approve(&id, &supervisor, None).await.unwrap_err();
    let reject = svc.reject(&id, &supervisor, Some("no")).await.unwrap_err();
    for err in [approve, reject] {
        assert!(matches!(
            err,
            ServiceError::Workflow(WorkflowError::InvalidTransition {
                state: Estado::Draft,
                ..
            })
        ));
    }
}

#[tokio::test]
async fn operador_cannot_review_and_cannot_submit_others_drafts() {
    let svc = service();
    let owner = Actor::operador("op-1");
    let other = Actor::operador("op-2");
    let id = svc.create(&owner, draft("UOM-107", &[22.0])).await.unwrap().id;

    let err = svc.submit_for_review(&id, &other).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Workflow(WorkflowError::Forbidden { .. })
    ));

    svc.submit_for_review(&id, &owner).await.unwrap();
    let err = svc.approve(&id, &owner, None).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Workflow(WorkflowError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn missing_cartilla_is_not_found() {
    let svc = service();
    let err = svc
        .submit_for_review("nope", &Actor::admin("adm-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { ref id } if id == "nope"));
}

/// Approve and reject both read `EN_REVISION` before either commits. One
/// wins; the other gets `Conflict`, and the stored state and audit trail
/// match the winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_approve_and_reject_exactly_one_wins() {
    let svc = Arc::new(CartillaService::with_table(
        GatedStorage::default(),
        Default::default(),
    ));
    let owner = Actor::operador("op-1");
    let id = svc.create(&owner, draft("UOM-200", &[33.0])).await.unwrap().id;
    svc.submit_for_review(&id, &owner).await.unwrap();

    svc.storage().arm(2);
    let approve = {
        let svc = svc.clone();
        let id = id.clone();
        tokio::spawn(async move {
            svc.approve(&id, &Actor::supervisor("sup-1"), Some("OK"))
                .await
        })
    };
    let reject = {
        let svc = svc.clone();
        let id = id.clone();
        tokio::spawn(async move {
            svc.reject(&id, &Actor::admin("adm-1"), Some("Fuga detectada"))
                .await
        })
    };
    let approve = approve.await.unwrap();
    let reject = reject.await.unwrap();
    svc.storage().disarm();

    let (winner, loser) = match (approve, reject) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        (a, r) => panic!("expected exactly one winner, got {a:?} and {r:?}"),
    };
    assert!(matches!(loser, ServiceError::Conflict { .. }), "{loser}");
    assert!(loser.is_retryable());

    let stored = svc.get(&id, &owner).await.unwrap();
    assert_eq!(stored, winner);
    assert!(stored.estado().is_terminal());
    assert_eq!(stored.comentarios_revision().len(), 1);

    let trail = svc.audit_trail(&id).await.unwrap();
    assert_eq!(trail.len(), 3);
    let expected = match stored.estado() {
        Estado::Approved => AuditAction::Approve,
        _ => AuditAction::Reject,
    };
    assert_eq!(trail[2].action, expected);
}

#[tokio::test]
async fn retry_after_conflict_sees_the_winning_decision() {
    let svc = Arc::new(CartillaService::with_table(
        GatedStorage::default(),
        Default::default(),
    ));
    let owner = Actor::operador("op-1");
    let id = svc.create(&owner, draft("UOM-201", &[33.0])).await.unwrap().id;
    svc.submit_for_review(&id, &owner).await.unwrap();

    svc.storage().arm(2);
    let first = tokio::spawn({
        let svc = svc.clone();
        let id = id.clone();
        async move { svc.approve(&id, &Actor::supervisor("sup-1"), None).await }
    });
    let second = tokio::spawn({
        let svc = svc.clone();
        let id = id.clone();
        async move { svc.approve(&id, &Actor::supervisor("sup-2"), None).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];
    svc.storage().disarm();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    // The caller reloads and retries; the record has moved on.
    let err = svc
        .approve(&id, &Actor::supervisor("sup-2"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Workflow(WorkflowError::InvalidTransition {
            state: Estado::Approved,
            ..
        })
    ));
}
