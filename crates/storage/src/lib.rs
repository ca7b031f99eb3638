//! Storage boundary for cartilla records.
//!
//! Records are plain strings and JSON documents so that backends do not
//! depend on the domain crate. Every mutation goes through a snapshot
//! (transaction) and every version-bearing write is checked optimistically.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{AuditEventRecord, CartillaQuery, CartillaRecord, PressureTableRecord};
pub use traits::CartillaStorage;
