//! Durable state for syllabus workflows.
//!
//! A [`PhaseRecord`] is the only state shared between phase handler
//! invocations. It is always read, modified and written back with
//! [`RecordStore::conditional_put`], never blindly overwritten.

mod file;
mod memory;
pub mod record;
mod store;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use record::{AuditAction, AuditEntry, PhaseRecord};
pub use store::{PutOutcome, RecordStore};
