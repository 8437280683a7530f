//! Fixed-window rate limiting.

mod key;
mod limiter;
mod policy;

pub use key::CounterKey;
pub use limiter::{Decision, WindowLimiter, DEFAULT_LIMIT, DEFAULT_NAMESPACE, DEFAULT_WINDOW};
pub use policy::{ConsistencyMode, FailurePolicy};
