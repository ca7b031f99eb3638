//! Edit, delete and visibility guards.
//!
//! These are not workflow transitions but share its vocabulary: an admin may
//! always edit or delete; an owner may do so only while the cartilla is in
//! `BORRADOR`. Anyone else is `Forbidden`; an owner outside `BORRADOR` gets
//! `InvalidState`.

use crate::error::WorkflowError;
use crate::types::{Actor, Cartilla, Estado, Operation};

fn forbidden(actor: &Actor, operation: Operation) -> WorkflowError {
    WorkflowError::Forbidden {
        actor_id: actor.id.clone(),
        role: actor.role,
        operation,
    }
}

fn check_change(cartilla: &Cartilla, actor: &Actor, operation: Operation) -> Result<(), WorkflowError> {
    if actor.role.is_admin() {
        return Ok(());
    }
    if !cartilla.is_owned_by(actor) {
        return Err(forbidden(actor, operation));
    }
    if cartilla.estado() != Estado::Draft {
        return Err(WorkflowError::InvalidState {
            state: cartilla.estado(),
            operation,
        });
    }
    Ok(())
}

pub fn check_edit(cartilla: &Cartilla, actor: &Actor) -> Result<(), WorkflowError> {
    check_change(cartilla, actor, Operation::Edit)
}

pub fn check_delete(cartilla: &Cartilla, actor: &Actor) -> Result<(), WorkflowError> {
    check_change(cartilla, actor, Operation::Delete)
}

/// Owner-scoped actors only see their own cartillas.
pub fn check_view(cartilla: &Cartilla, actor: &Actor) -> Result<(), WorkflowError> {
    if actor.role.is_owner_scoped() && !cartilla.is_owned_by(actor) {
        return Err(forbidden(actor, Operation::View));
    }
    Ok(())
}

pub fn can_edit(cartilla: &Cartilla, actor: &Actor) -> bool {
    check_edit(cartilla, actor).is_ok()
}

pub fn can_delete(cartilla: &Cartilla, actor: &Actor) -> bool {
    check_delete(cartilla, actor).is_ok()
}

pub fn can_view(cartilla: &Cartilla, actor: &Actor) -> bool {
    check_view(cartilla, actor).is_ok()
}

/// The creator filter to apply when listing for `actor`, if any.
pub fn owner_scope(actor: &Actor) -> Option<&str> {
    actor.role.is_owner_scoped().then_some(actor.id.as_str())
}
