//! Stack interceptor engine.
//!
//! Runs `enter` on each interceptor in order, then `leave` in reverse order.
//! When an `enter` or `leave` raises, the fault is stored in the context's
//! error slot and `error` is called on the same interceptor. If `error`
//! clears the slot, the reverse walk resumes with `leave` on the previous
//! interceptor; otherwise `error` is called on each remaining interceptor
//! walking outward. Interceptors after the one that raised during `enter`
//! are never entered.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use syllabus_utils::types::Fault;

use crate::context::{Context, Stage, StackFault};

/// One step of a stack. Every function defaults to identity.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn enter(&self, _ctx: &mut Context) -> Result<(), Fault> {
        Ok(())
    }

    async fn leave(&self, _ctx: &mut Context) -> Result<(), Fault> {
        Ok(())
    }

    /// Called while `ctx.has_error()`. Clear the error to resume the
    /// normal outward walk.
    async fn error(&self, _ctx: &mut Context) -> Result<(), Fault> {
        Ok(())
    }
}

/// An ordered list of interceptors.
#[derive(Clone, Default)]
pub struct Stack {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Stack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor (builder style).
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.interceptors.iter().map(|i| i.name())
    }

    /// Run the stack over `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the in-flight [`StackFault`] if no interceptor cleared it by
    /// the time the outward walk finished. The fault is removed from `ctx`.
    pub async fn execute(&self, ctx: &mut Context) -> Result<(), StackFault> {
        // Inward pass. `entered` counts interceptors whose enter ran, including
        // the one that raised.
        let mut entered = 0;
        for interceptor in &self.interceptors {
            entered += 1;
            trace!(interceptor = interceptor.name(), "enter");
            if let Err(fault) = interceptor.enter(ctx).await {
                debug!(interceptor = interceptor.name(), %fault, "enter raised");
                ctx.set_error(StackFault::new(interceptor.name(), Stage::Enter, fault));
                break;
            }
        }

        // Outward pass, starting at the last entered interceptor.
        let mut index = entered;
        while index > 0 {
            let interceptor = &self.interceptors[index - 1];

            if ctx.has_error() {
                trace!(interceptor = interceptor.name(), "error");
                if let Err(fault) = interceptor.error(ctx).await {
                    debug!(interceptor = interceptor.name(), %fault, "error handler raised");
                    ctx.set_error(StackFault::new(interceptor.name(), Stage::Error, fault));
                }
            } else {
                trace!(interceptor = interceptor.name(), "leave");
                if let Err(fault) = interceptor.leave(ctx).await {
                    debug!(interceptor = interceptor.name(), %fault, "leave raised");
                    ctx.set_error(StackFault::new(interceptor.name(), Stage::Leave, fault));
                    // Error handling starts at the interceptor that raised.
                    continue;
                }
            }

            index -= 1;
        }

        match ctx.take_error() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Runs a complete inner stack from its `enter`.
///
/// Place it last in an outer stack: resources provided by earlier outer
/// interceptors stay in the context for the whole inner run, and the outer
/// `leave` pass starts only after the inner stack has finished, including its
/// own error handling. An inner fault nobody cleared surfaces as this
/// interceptor's `enter` fault.
pub struct NestedStack {
    name: String,
    inner: Stack,
}

impl NestedStack {
    #[must_use]
    pub fn new(name: impl Into<String>, inner: Stack) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

#[async_trait]
impl Interceptor for NestedStack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        self.inner.execute(ctx).await.map_err(|e| e.fault)
    }
}

type StepFn = Box<dyn Fn(&mut Context) -> Result<(), Fault> + Send + Sync>;

/// An interceptor assembled from synchronous closures.
pub struct FnInterceptor {
    name: String,
    enter: Option<StepFn>,
    leave: Option<StepFn>,
    error: Option<StepFn>,
}

impl FnInterceptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enter: None,
            leave: None,
            error: None,
        }
    }

    #[must_use]
    pub fn on_enter(
        mut self,
        f: impl Fn(&mut Context) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.enter = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_leave(
        mut self,
        f: impl Fn(&mut Context) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.leave = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(
        mut self,
        f: impl Fn(&mut Context) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    fn run(step: Option<&StepFn>, ctx: &mut Context) -> Result<(), Fault> {
        match step {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Interceptor for FnInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enter(&self, ctx: &mut Context) -> Result<(), Fault> {
        Self::run(self.enter.as_ref(), ctx)
    }

    async fn leave(&self, ctx: &mut Context) -> Result<(), Fault> {
        Self::run(self.leave.as_ref(), ctx)
    }

    async fn error(&self, ctx: &mut Context) -> Result<(), Fault> {
        Self::run(self.error.as_ref(), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: String) {
        log.lock().unwrap().push(entry);
    }

    fn traced(log: &Log, name: &'static str) -> FnInterceptor {
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        FnInterceptor::new(name)
            .on_enter(move |_| {
                record(&l1, format!("{name}.enter"));
                Ok(())
            })
            .on_leave(move |_| {
                record(&l2, format!("{name}.leave"));
                Ok(())
            })
            .on_error(move |_| {
                record(&l3, format!("{name}.error"));
                Ok(())
            })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_leave_runs_in_reverse_order() {
        let log = Log::default();
        let stack = Stack::new()
            .with(traced(&log, "i1"))
            .with(traced(&log, "i2"))
            .with(traced(&log, "i3"));

        let mut ctx = Context::new();
        stack.execute(&mut ctx).await.unwrap();

        assert_eq!(
            entries(&log),
            ["i1.enter", "i2.enter", "i3.enter", "i3.leave", "i2.leave", "i1.leave"]
        );
    }

    #[tokio::test]
    async fn test_cleared_error_resumes_leave_and_skips_later_interceptors() {
        let log = Log::default();
        let (l_enter, l_error) = (log.clone(), log.clone());
        let failing = FnInterceptor::new("i2")
            .on_enter(move |_| {
                record(&l_enter, "i2.enter".into());
                Err(Fault::transient("boom"))
            })
            .on_error(move |ctx| {
                record(&l_error, "i2.error".into());
                ctx.clear_error();
                Ok(())
            });

        let stack = Stack::new()
            .with(traced(&log, "i1"))
            .with(failing)
            .with(traced(&log, "i3"));

        let mut ctx = Context::new();
        stack.execute(&mut ctx).await.unwrap();

        assert_eq!(entries(&log), ["i1.enter", "i2.enter", "i2.error", "i1.leave"]);
    }

    #[tokio::test]
    async fn test_uncleared_error_walks_error_outward() {
        let log = Log::default();
        let l = log.clone();
        let failing = FnInterceptor::new("i2").on_enter(move |_| {
            record(&l, "i2.enter".into());
            Err(Fault::permanent("bad input"))
        });

        let stack = Stack::new()
            .with(traced(&log, "i1"))
            .with(failing)
            .with(traced(&log, "i3"));

        let mut ctx = Context::new();
        let err = stack.execute(&mut ctx).await.unwrap_err();

        assert_eq!(entries(&log), ["i1.enter", "i2.enter", "i1.error"]);
        assert_eq!(err.interceptor, "i2");
        assert_eq!(err.stage, Stage::Enter);
        assert_eq!(err.fault.message, "bad input");
        assert!(!ctx.has_error());
    }

    #[tokio::test]
    async fn test_leave_fault_is_handled_at_same_index() {
        let log = Log::default();
        let (l_leave, l_error) = (log.clone(), log.clone());
        let failing = FnInterceptor::new("i2")
            .on_leave(move |_| {
                record(&l_leave, "i2.leave".into());
                Err(Fault::internal("teardown"))
            })
            .on_error(move |ctx| {
                record(&l_error, "i2.error".into());
                ctx.clear_error();
                Ok(())
            });

        let stack = Stack::new()
            .with(traced(&log, "i1"))
            .with(failing)
            .with(traced(&log, "i3"));

        let mut ctx = Context::new();
        stack.execute(&mut ctx).await.unwrap();

        assert_eq!(
            entries(&log),
            ["i1.enter", "i3.enter", "i3.leave", "i2.leave", "i2.error", "i1.leave"]
        );
    }

    #[tokio::test]
    async fn test_outer_interceptor_can_recover() {
        let failing =
            FnInterceptor::new("inner").on_enter(|_| Err(Fault::transient("network")));
        let recovering = FnInterceptor::new("outer")
            .on_error(|ctx| {
                let fault = ctx.error().map(|e| e.fault.message.clone()).unwrap_or_default();
                ctx.insert_value("recovered_from", serde_json::Value::String(fault));
                ctx.clear_error();
                Ok(())
            })
            .on_leave(|_| Err(Fault::internal("leave must not run after error")));

        let stack = Stack::new().with(recovering).with(failing);
        let mut ctx = Context::new();
        stack.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.value("recovered_from"), Some(&serde_json::json!("network")));
    }

    #[tokio::test]
    async fn test_nested_stack_runs_inside_outer_scope() {
        let log = Log::default();
        let inner = Stack::new().with(traced(&log, "a")).with(traced(&log, "b"));
        let outer = Stack::new()
            .with(traced(&log, "scope"))
            .with(NestedStack::new("inner", inner));

        let mut ctx = Context::new();
        outer.execute(&mut ctx).await.unwrap();

        assert_eq!(
            entries(&log),
            ["scope.enter", "a.enter", "b.enter", "b.leave", "a.leave", "scope.leave"]
        );
    }

    #[tokio::test]
    async fn test_nested_stack_fault_reaches_outer_error() {
        let log = Log::default();
        let inner = Stack::new()
            .with(FnInterceptor::new("plan").on_enter(|_| Err(Fault::permanent("no input"))));
        let outer = Stack::new()
            .with(traced(&log, "scope"))
            .with(NestedStack::new("inner", inner));

        let mut ctx = Context::new();
        let err = outer.execute(&mut ctx).await.unwrap_err();

        assert_eq!(entries(&log), ["scope.enter", "scope.error"]);
        assert_eq!(err.interceptor, "inner");
        assert_eq!(err.fault.origin.as_deref(), Some("plan"));
    }
}
