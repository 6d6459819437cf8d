use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use syllabus_interceptors::{Context, Middleware, Next};
use syllabus_logic::Command;
use syllabus_utils::logging::command_span;

use crate::executor::CommandResult;
use crate::observer::{ExecutionObserver, ExecutionRecord, Outcome};

/// Hands an [`ExecutionRecord`] to the observer for every command.
pub struct Observability {
    observer: Arc<dyn ExecutionObserver>,
}

impl Observability {
    #[must_use]
    pub fn new(observer: Arc<dyn ExecutionObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl Middleware<Command, CommandResult> for Observability {
    fn name(&self) -> &str {
        "observability"
    }

    async fn handle(
        &self,
        cmd: &Command,
        ctx: &mut Context,
        next: Next<'_, Command, CommandResult>,
    ) -> CommandResult {
        let kind = cmd.kind();
        let started = Instant::now();
        let result = next
            .run(cmd, ctx)
            .instrument(command_span(kind.as_str()))
            .await;

        let record = ExecutionRecord {
            kind,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome: match &result {
                Ok(_) => Outcome::Success,
                Err(fault) => Outcome::Failure {
                    kind: fault.kind,
                    message: fault.message.clone(),
                },
            },
            usage: result.as_ref().ok().and_then(|output| output.usage()),
        };
        self.observer.record(&record);

        result
    }
}
