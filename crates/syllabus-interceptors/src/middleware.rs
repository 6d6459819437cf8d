//! Middleware interceptor engine.
//!
//! A [`MiddlewareChain`] wraps a base [`Handler`] with middleware applied
//! outermost first. Each middleware decides whether to call [`Next::run`]
//! zero times (short-circuit), once, or several times (retry). The engine
//! adds no error handling of its own.

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::Context;

/// The innermost function of a chain.
#[async_trait]
pub trait Handler<Req, Res>: Send + Sync {
    async fn call(&self, req: &Req, ctx: &mut Context) -> Res;
}

/// A wrapper around the rest of the chain.
#[async_trait]
pub trait Middleware<Req, Res>: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, req: &Req, ctx: &mut Context, next: Next<'_, Req, Res>) -> Res;
}

/// The remainder of a chain, as seen from one middleware.
///
/// `Next` is `Copy`, so a middleware may invoke it any number of times.
pub struct Next<'a, Req, Res> {
    remaining: &'a [Arc<dyn Middleware<Req, Res>>],
    base: &'a dyn Handler<Req, Res>,
}

impl<Req, Res> Clone for Next<'_, Req, Res> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Res> Copy for Next<'_, Req, Res> {}

impl<Req, Res> Next<'_, Req, Res> {
    /// Invoke the next middleware, or the base handler if none remain.
    pub async fn run(self, req: &Req, ctx: &mut Context) -> Res {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    remaining: rest,
                    base: self.base,
                };
                middleware.handle(req, ctx, next).await
            }
            None => self.base.call(req, ctx).await,
        }
    }
}

/// A base handler composed with its middleware.
pub struct MiddlewareChain<Req, Res> {
    middleware: Vec<Arc<dyn Middleware<Req, Res>>>,
    base: Arc<dyn Handler<Req, Res>>,
}

impl<Req, Res> MiddlewareChain<Req, Res> {
    /// `middleware[0]` is the outermost.
    #[must_use]
    pub fn new(
        base: Arc<dyn Handler<Req, Res>>,
        middleware: Vec<Arc<dyn Middleware<Req, Res>>>,
    ) -> Self {
        Self { middleware, base }
    }

    pub async fn execute(&self, req: &Req, ctx: &mut Context) -> Res {
        Next {
            remaining: &self.middleware,
            base: self.base.as_ref(),
        }
        .run(req, ctx)
        .await
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.middleware.iter().map(|m| m.name())
    }
}
