//! syllabus - durable, multi-phase curriculum generation
//!
//! A learner request runs through six phases (`expand_query`,
//! `retrieve_candidates`, `draft_structure`, `draft_details`, `review`,
//! `persist`). Each phase is:
//!
//! - **planned** by pure functions in `syllabus-logic` that turn accumulated
//!   artifacts into [`Command`] values,
//! - **executed** by the [`CommandExecutor`] through a middleware chain
//!   (error boundary, observability, retry, usage accounting) and injected
//!   adapters,
//! - **committed** by the [`Coordinator`] with a conditional write against
//!   the stored record, so duplicate and stale signals never advance a
//!   workflow twice.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! syllabus run --topic "ownership in rust" --goal "read borrow errors"
//! syllabus --store-dir .syllabus/records status
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use syllabus::{Config, Services, WorkflowRequest};
//!
//! # async fn demo() -> Result<(), syllabus::SyllabusError> {
//! let config = Config::builder().retry_ceiling(3).build()?;
//! let mut services = Services::offline(&config)?;
//! let id = services
//!     .coordinator
//!     .start(WorkflowRequest::new("ownership in rust", "beginner"))
//!     .await?;
//! services.drain().await;
//! let record = services.coordinator.status(&id).await?;
//! println!("{id}: {}", record.phase);
//! # Ok(())
//! # }
//! ```
//!
//! # Interactive sessions
//!
//! [`SessionRuntime`] runs the [`SessionReducer`] against the same executor:
//! every event yields a new state plus commands, and inference results are fed
//! back as events.

pub mod cli;
pub mod services;
pub mod session;

pub use services::{Services, open_store};
pub use session::SessionRuntime;

pub use syllabus_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use syllabus_coordinator::{
    Coordinator, DiscardReason, DrainReport, PhaseHandler, PhaseOutcome, SignalBus,
    SignalDisposition, WorkflowReducer,
};
pub use syllabus_executor::CommandExecutor;
pub use syllabus_logic::{
    Command, EffectOutput, PhaseSignal, Reducer, SessionEvent, SessionReducer, SessionState,
    WorkflowRequest,
};
pub use syllabus_store::{PhaseRecord, RecordStore};
pub use syllabus_utils::{ExitCode, Fault, FaultKind, PhaseId, PhaseTag, SyllabusError, WorkflowId};
