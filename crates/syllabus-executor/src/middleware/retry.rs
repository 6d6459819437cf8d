use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

use syllabus_interceptors::{Context, Middleware, Next};
use syllabus_logic::{Command, CommandKind};

use crate::executor::CommandResult;

/// Re-runs the rest of the chain after transient faults.
///
/// Only command kinds in the retry set are retried (all kinds when the set
/// is empty). Each retry waits a fixed delay.
#[derive(Debug, Clone)]
pub struct Retry {
    attempts: u32,
    delay: Duration,
    kinds: BTreeSet<CommandKind>,
}

impl Retry {
    /// `attempts` extra tries after the first failure.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            kinds: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    fn applies_to(&self, kind: CommandKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

#[async_trait]
impl Middleware<Command, CommandResult> for Retry {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(
        &self,
        cmd: &Command,
        ctx: &mut Context,
        next: Next<'_, Command, CommandResult>,
    ) -> CommandResult {
        let kind = cmd.kind();
        if !self.applies_to(kind) {
            return next.run(cmd, ctx).await;
        }

        let mut retries = 0;
        loop {
            match next.run(cmd, ctx).await {
                Err(fault) if fault.is_retryable() && retries < self.attempts => {
                    retries += 1;
                    warn!(
                        command = %kind,
                        retry = retries,
                        max = self.attempts,
                        fault = %fault,
                        "Retrying command after transient fault"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}
