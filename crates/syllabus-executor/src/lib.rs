//! Command execution for syllabus.
//!
//! [`CommandExecutor`] binds every [`Command`](syllabus_logic::Command)
//! variant to an effect adapter and runs it through the standard middleware
//! chain: error boundary, observability, optional retry, usage accounting.
//! Construction fails if any command kind has no adapter.

pub mod adapters;
pub mod executor;
pub mod middleware;
pub mod observer;
pub mod offline;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{
    InferenceAdapter, InferenceReply, InferenceRequest, Notice, NoticeLevel, NotificationAdapter,
    PersistenceAdapter, RetrievalAdapter, SignalSink,
};
pub use executor::{CommandExecutor, CommandExecutorBuilder, CommandMiddleware, CommandResult};
pub use middleware::{ErrorBoundary, Observability, Retry, ScopedUsage, UsageAccounting, UsageMeter};
pub use observer::{
    CollectingObserver, ExecutionObserver, ExecutionRecord, FanoutObserver, Outcome,
    TracingObserver,
};
