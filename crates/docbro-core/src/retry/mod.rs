//! Retry policy and attempt observation
//!
//! Callers drive their own attempt loop (removal operations track their
//! retry count on the operation itself) and use [`calculate_delay`] for the
//! pause between attempts and a [`RetryObserver`] for reporting.

mod observer;
mod policy;

pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use policy::{calculate_delay, RetryPolicy, RetryStrategy};
