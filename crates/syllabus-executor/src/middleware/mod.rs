//! Standard command middleware.

mod boundary;
mod observe;
mod retry;
mod usage;

pub use boundary::ErrorBoundary;
pub use observe::Observability;
pub use retry::Retry;
pub use usage::{ScopedUsage, UsageAccounting, UsageMeter};
