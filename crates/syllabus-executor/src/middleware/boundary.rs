use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use syllabus_interceptors::{Context, Middleware, Next};
use syllabus_logic::Command;
use syllabus_utils::types::Fault;

use crate::executor::CommandResult;
use crate::observer::{ExecutionObserver, ExecutionRecord, Outcome};

/// Outermost middleware: nothing but a typed [`Fault`] leaves the executor.
///
/// Panics raised anywhere below are caught and reported as `Internal`
/// faults; every fault is tagged with the command kind as its origin. A
/// panic unwinds past [`Observability`](super::Observability), so the
/// boundary hands the failed execution to the observer itself.
pub struct ErrorBoundary {
    observer: Arc<dyn ExecutionObserver>,
}

impl ErrorBoundary {
    #[must_use]
    pub fn new(observer: Arc<dyn ExecutionObserver>) -> Self {
        Self { observer }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Middleware<Command, CommandResult> for ErrorBoundary {
    fn name(&self) -> &str {
        "error_boundary"
    }

    async fn handle(
        &self,
        cmd: &Command,
        ctx: &mut Context,
        next: Next<'_, Command, CommandResult>,
    ) -> CommandResult {
        let kind = cmd.kind();
        let started = Instant::now();
        match AssertUnwindSafe(next.run(cmd, ctx)).catch_unwind().await {
            Ok(result) => result.map_err(|fault| fault.with_origin(kind.as_str())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(command = %kind, panic = %message, "Command panicked");
                let fault = Fault::internal(format!("{kind} panicked: {message}"))
                    .with_origin(kind.as_str());
                self.observer.record(&ExecutionRecord {
                    kind,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    outcome: Outcome::Failure {
                        kind: fault.kind,
                        message: fault.message.clone(),
                    },
                    usage: None,
                });
                Err(fault)
            }
        }
    }
}
