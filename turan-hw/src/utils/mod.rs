//! Utility modules for turan-hw

pub mod keyed_lock;
pub mod retry;

pub use keyed_lock::{KeyGuard, KeyedLocks};
pub use retry::{retry_on_lock, retry_with_backoff, RetryPolicy};
