//! Decision-making half of syllabus.
//!
//! Nothing in this crate performs I/O, reads the clock or generates ids.
//! Reducers turn `(state, event)` into `(state, commands)`; phase planning
//! turns accumulated artifacts into the commands a phase needs and folds the
//! effect outputs back into artifacts. Executing commands is the executor's job.

pub mod command;
pub mod plan;
pub mod reducer;
pub mod signal;
pub mod state;

pub use command::{AdapterKind, Command, CommandKind, EffectOutput, SearchHit};
pub use plan::{Artifacts, WorkflowRequest, fold_phase, plan_phase, validate_artifact};
pub use reducer::{Reducer, SessionReducer};
pub use signal::{PayloadRef, PhaseSignal};
pub use state::{Message, Role, SessionEvent, SessionState, SessionStatus};
