//! Cartilla core library: the PSI→GPH leak-flow calculator and the review
//! workflow for station line-tightness inspection records.
//!
//! Everything in this crate is synchronous and free of I/O. Persistence,
//! audit delivery and optimistic concurrency live in `cartilla-storage`
//! and `cartilla-engine`.

pub mod access;
pub mod error;
pub mod leak_flow;
pub mod types;
pub mod workflow;

pub use access::{can_delete, can_edit, can_view, check_delete, check_edit, check_view, owner_scope};
pub use error::{LeakFlowError, WorkflowError};
pub use leak_flow::{compute_leak_flow, LeakFlow, LeakFlowMethod, PressureFlowEntry, PressureTable};
pub use types::{
    Actor, AuditAction, Cartilla, CartillaContent, CartillaDraft, DetectorTipo, Estado,
    Instalacion, LeakTest, LeakTestInput, LineaDetalle, Mandante, Operation, ResultadoPrueba,
    ReviewAction, ReviewComment, Role,
};
pub use workflow::{plan, target_state, Event, Transition};
