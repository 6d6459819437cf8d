//! The phase handler: a nested interceptor stack.
//!
//! ```text
//! phase_scope            enter: scoped usage + start time   leave/error: metrics
//! └─ phase_pipeline      (nested)
//!    ├─ plan_commands     plan_phase
//!    ├─ execute_commands  CommandExecutor, in plan order, fail fast
//!    ├─ fold_outputs      fold_phase
//!    └─ validate_artifact validate_artifact
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use syllabus_executor::{CommandExecutor, ScopedUsage};
use syllabus_interceptors::{Context, Interceptor, NestedStack, Stack};
use syllabus_logic::{
    Artifacts, Command, EffectOutput, WorkflowRequest, fold_phase, plan_phase, validate_artifact,
};
use syllabus_utils::types::{Fault, PhaseId, TokenUsage};

/// What a phase runs against.
#[derive(Debug, Clone)]
pub struct PhaseInput {
    pub phase: PhaseId,
    pub request: WorkflowRequest,
    pub artifacts: Artifacts,
}

/// Resources consumed by the phase run, measured by the outer scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseMetrics {
    pub calls: u32,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

/// Successful phase run.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub artifacts: Artifacts,
    pub metrics: PhaseMetrics,
}

struct Planned(Vec<Command>);
struct Outputs(Vec<EffectOutput>);
struct Folded(Artifacts);
struct Started(Instant);

fn input(ctx: &Context) -> Result<&PhaseInput, Fault> {
    ctx.resource::<PhaseInput>()
        .ok_or_else(|| Fault::internal("phase input missing from context"))
}

struct PhaseScope;

impl PhaseScope {
    fn close(ctx: &mut Context) {
        let usage = ctx.take_resource::<ScopedUsage>().unwrap_or_default();
        let duration_ms = ctx
            .take_resource::<Started>()
            .map_or(0, |Started(at)| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX));
        ctx.provide(PhaseMetrics {
            calls: usage.calls,
            usage: usage.usage,
            duration_ms,
        });
    }
}

#[async_trait]
impl Interceptor for PhaseScope {
    fn name(&self) -> &str {
        "phase_scope"
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        ctx.provide(ScopedUsage::default());
        ctx.provide(Started(Instant::now()));
        Ok(())
    }

    async fn leave(&self, ctx: &mut Context) -> Result<(), Fault> {
        Self::close(ctx);
        Ok(())
    }

    async fn error(&self, ctx: &mut Context) -> Result<(), Fault> {
        Self::close(ctx);
        Ok(())
    }
}

struct PlanCommands;

#[async_trait]
impl Interceptor for PlanCommands {
    fn name(&self) -> &str {
        "plan_commands"
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        let input = input(ctx)?;
        let commands = plan_phase(input.phase, &input.request, &input.artifacts)?;
        debug!(phase = %input.phase, commands = commands.len(), "Planned phase commands");
        ctx.provide(Planned(commands));
        Ok(())
    }
}

struct ExecuteCommands {
    executor: Arc<CommandExecutor>,
}

#[async_trait]
impl Interceptor for ExecuteCommands {
    fn name(&self) -> &str {
        "execute_commands"
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        let Planned(commands) = ctx
            .take_resource::<Planned>()
            .ok_or_else(|| Fault::internal("no planned commands in context"))?;
        let mut outputs = Vec::with_capacity(commands.len());
        for command in &commands {
            outputs.push(self.executor.execute(command, ctx).await?);
        }
        ctx.provide(Outputs(outputs));
        Ok(())
    }
}

struct FoldOutputs;

#[async_trait]
impl Interceptor for FoldOutputs {
    fn name(&self) -> &str {
        "fold_outputs"
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        let Outputs(outputs) = ctx
            .take_resource::<Outputs>()
            .ok_or_else(|| Fault::internal("no command outputs in context"))?;
        let input = input(ctx)?;
        let folded = fold_phase(input.phase, &input.artifacts, &outputs)?;
        ctx.provide(Folded(folded));
        Ok(())
    }
}

struct ValidateArtifact;

#[async_trait]
impl Interceptor for ValidateArtifact {
    fn name(&self) -> &str {
        "validate_artifact"
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        let phase = input(ctx)?.phase;
        let Folded(artifacts) = ctx
            .resource::<Folded>()
            .ok_or_else(|| Fault::internal("no folded artifacts in context"))?;
        validate_artifact(phase, artifacts)
    }
}

/// Runs one phase through the handler stack.
#[derive(Clone)]
pub struct PhaseHandler {
    stack: Stack,
}

impl PhaseHandler {
    #[must_use]
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        let pipeline = Stack::new()
            .with(PlanCommands)
            .with(ExecuteCommands { executor })
            .with(FoldOutputs)
            .with(ValidateArtifact);
        let stack = Stack::new()
            .with(PhaseScope)
            .with(NestedStack::new("phase_pipeline", pipeline));
        Self { stack }
    }

    /// Run the handler. Metrics are returned on failure too.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by whichever step failed.
    pub async fn run(&self, input: PhaseInput) -> Result<PhaseOutput, (Fault, PhaseMetrics)> {
        let mut ctx = Context::new();
        ctx.provide(input);

        let result = self.stack.execute(&mut ctx).await;
        let metrics = ctx.take_resource::<PhaseMetrics>().unwrap_or_default();
        if let Err(e) = result {
            return Err((e.fault, metrics));
        }
        match ctx.take_resource::<Folded>() {
            Some(Folded(artifacts)) => Ok(PhaseOutput { artifacts, metrics }),
            None => Err((Fault::internal("phase produced no artifacts"), metrics)),
        }
    }

    /// Interceptor names of the outer stack.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stack.names()
    }
}
