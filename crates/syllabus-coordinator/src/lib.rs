//! Durable, signal-driven phase coordinator.
//!
//! A workflow moves `expand_query → retrieve_candidates → draft_structure →
//! draft_details → review → persist → completed`. Each step is triggered by a
//! [`PhaseSignal`](syllabus_logic::PhaseSignal), runs the phase handler
//! stack, and hands the outcome to the pure [`WorkflowReducer`]. The
//! coordinator conditionally writes the resulting
//! [`PhaseRecord`](syllabus_store::PhaseRecord), then executes the commands
//! the reducer returned.

pub mod backoff;
mod bus;
mod coordinator;
pub mod handler;
pub mod reducer;

pub use backoff::backoff_delay;
pub use bus::{ChannelSignalBus, DrainReport, SignalBus};
pub use coordinator::{Coordinator, DiscardReason, SignalDisposition};
pub use handler::{PhaseHandler, PhaseInput, PhaseMetrics, PhaseOutput};
pub use reducer::{PhaseOutcome, WORKFLOW_CHANNEL, WorkflowReducer};
