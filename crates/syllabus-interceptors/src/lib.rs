//! Two interceptor composition disciplines.
//!
//! - [`stack`]: ordered `{enter, leave, error}` triples over a shared
//!   [`Context`], with an inward pass, an outward pass and error unwinding.
//!   Stacks nest through [`NestedStack`].
//! - [`middleware`]: `(request, context, next)` wrappers around a base
//!   handler, composed outermost-first. No leave pass.
//!
//! Both engines run strictly sequentially inside the calling task.

pub mod context;
pub mod middleware;
pub mod stack;

pub use context::{Context, Stage, StackFault};
pub use middleware::{Handler, Middleware, MiddlewareChain, Next};
pub use stack::{FnInterceptor, Interceptor, NestedStack, Stack};
