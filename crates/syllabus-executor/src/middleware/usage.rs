use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use syllabus_interceptors::{Context, Middleware, Next};
use syllabus_logic::Command;
use syllabus_utils::error::EffectError;
use syllabus_utils::types::TokenUsage;

use crate::executor::CommandResult;

/// Process-wide metered usage.
///
/// The call counter tracks attempted calls, not successful ones, so a retry
/// loop cannot slip past the budget.
#[derive(Debug)]
pub struct UsageMeter {
    limit: Option<u32>,
    calls: AtomicU32,
    usage: Mutex<TokenUsage>,
}

impl UsageMeter {
    #[must_use]
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            calls: AtomicU32::new(0),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        self.limit
    }

    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim one call slot.
    fn claim(&self) -> Result<u32, EffectError> {
        let current = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.limit {
            Some(limit) if current >= limit => Err(EffectError::BudgetExceeded {
                limit,
                attempted: current + 1,
            }),
            _ => Ok(current + 1),
        }
    }

    fn add(&self, usage: TokenUsage) {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).add(usage);
    }
}

/// Usage attributed to one scope (e.g. a phase run).
///
/// When a context carries this resource, [`UsageAccounting`] adds every
/// metered call to it as well as to the global meter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopedUsage {
    pub calls: u32,
    pub usage: TokenUsage,
}

/// Enforces the inference budget and accumulates token usage.
pub struct UsageAccounting {
    meter: Arc<UsageMeter>,
}

impl UsageAccounting {
    #[must_use]
    pub fn new(meter: Arc<UsageMeter>) -> Self {
        Self { meter }
    }
}

#[async_trait]
impl Middleware<Command, CommandResult> for UsageAccounting {
    fn name(&self) -> &str {
        "usage_accounting"
    }

    async fn handle(
        &self,
        cmd: &Command,
        ctx: &mut Context,
        next: Next<'_, Command, CommandResult>,
    ) -> CommandResult {
        let kind = cmd.kind();
        if !kind.is_metered() {
            return next.run(cmd, ctx).await;
        }

        let call = match self.meter.claim() {
            Ok(call) => call,
            Err(e) => {
                warn!(command = %kind, error = %e, "Budget limit exceeded");
                return Err(e.to_fault(kind.as_str()));
            }
        };
        if let Some(scope) = ctx.resource_mut::<ScopedUsage>() {
            scope.calls += 1;
        }
        debug!(command = %kind, call, limit = ?self.meter.limit(), "Budget check passed");

        let result = next.run(cmd, ctx).await;

        if let Some(usage) = result.as_ref().ok().and_then(|output| output.usage()) {
            self.meter.add(usage);
            if let Some(scope) = ctx.resource_mut::<ScopedUsage>() {
                scope.usage.add(usage);
            }
        }

        result
    }
}
