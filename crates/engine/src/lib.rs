//! Orchestration layer for cartillas.
//!
//! [`CartillaService`] is the entry point the boundary layer calls after it
//! has authenticated an [`Actor`](cartilla_core::Actor). Every mutation runs
//! in one storage snapshot: read the record with its version, apply the pure
//! `cartilla-core` rules, write back conditionally on that version and append
//! the audit event, then commit. A lost race surfaces as
//! [`ServiceError::Conflict`].

mod audit;
mod error;
mod query;
mod record;
mod service;
mod table;

pub use audit::{AuditEntity, AuditEvent};
pub use error::ServiceError;
pub use query::{CartillaFilter, EstadoStats, Page, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use service::CartillaService;
pub use table::TableRegistry;
