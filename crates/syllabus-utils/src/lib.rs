//! Foundation crate shared by every syllabus component.
//!
//! Holds the vocabulary types (phases, workflow ids, faults, token usage), the
//! error taxonomy with user-facing rendering, exit codes, tracing setup, atomic
//! file writes and the clock abstraction used for expiry decisions.

pub mod atomic_write;
pub mod clock;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{SyllabusError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::{Fault, FaultKind, PhaseId, PhaseTag, TokenUsage, WorkflowId};
