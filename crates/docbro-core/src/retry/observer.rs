//! Retry observation and logging

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Observer for retry attempt events
///
/// Errors are passed as display strings so backends with non-`std::error`
/// failures (subprocess stderr, classified messages) can report too.
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start (1-indexed)
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32);

    /// Called when an attempt failed and another will follow after `delay`
    fn on_attempt_failed(&self, operation: &str, attempt: u32, error: &str, delay: Duration);

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration);

    /// Called when all attempts are used up
    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &str);

    /// Called when a failure is not retried
    fn on_cancelled(&self, operation: &str, attempt: u32, error: &str) {
        let _ = (operation, attempt, error);
    }
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_attempt_failed(&self, _operation: &str, _attempt: u32, _error: &str, _delay: Duration) {}

    fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &str) {}
}

/// Observer that logs retry events through `tracing`
///
/// - `on_attempt_start`: DEBUG
/// - `on_attempt_failed`: WARN
/// - `on_success`: INFO after a retry, DEBUG otherwise
/// - `on_exhausted`: ERROR
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        tracing::debug!(operation, attempt, max_attempts, "starting attempt");
    }

    fn on_attempt_failed(&self, operation: &str, attempt: u32, error: &str, delay: Duration) {
        tracing::warn!(
            operation,
            attempt,
            error,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation,
                attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &str) {
        tracing::error!(
            operation,
            attempts,
            error = final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_cancelled(&self, operation: &str, attempt: u32, error: &str) {
        tracing::warn!(operation, attempt, error, "not retrying");
    }
}

/// Observer that counts events; useful in tests
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    cancellations: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, _operation: &str, _attempt: u32, _error: &str, _delay: Duration) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &str) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _operation: &str, _attempt: u32, _error: &str) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(operation, attempt, max_attempts)
    }

    fn on_attempt_failed(&self, operation: &str, attempt: u32, error: &str, delay: Duration) {
        (**self).on_attempt_failed(operation, attempt, error, delay)
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        (**self).on_success(operation, attempt, total_duration)
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &str) {
        (**self).on_exhausted(operation, attempts, final_error)
    }

    fn on_cancelled(&self, operation: &str, attempt: u32, error: &str) {
        (**self).on_cancelled(operation, attempt, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stats_observer_exhaustion() {
        let observer = StatsObserver::new();

        observer.on_attempt_start("rm:abc", 1, 3);
        observer.on_attempt_failed("rm:abc", 1, "boom", Duration::from_millis(100));
        observer.on_attempt_start("rm:abc", 2, 3);
        observer.on_attempt_failed("rm:abc", 2, "boom", Duration::from_millis(200));
        observer.on_attempt_start("rm:abc", 3, 3);
        observer.on_exhausted("rm:abc", 3, "boom");

        assert_eq!(observer.attempt_starts(), 3);
        assert_eq!(observer.failures(), 2);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.successes(), 0);
    }

    #[test]
    fn test_arc_observer_forwards() {
        let observer = Arc::new(StatsObserver::new());
        let dyn_observer: Arc<dyn RetryObserver> = observer.clone();

        dyn_observer.on_attempt_start("vol:data", 1, 3);
        dyn_observer.on_cancelled("vol:data", 1, "in use");

        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.cancellations(), 1);
    }

    #[test]
    fn test_noop_and_tracing_observers() {
        NoOpObserver.on_exhausted("x", 1, "err");
        TracingObserver.on_success("x", 2, Duration::from_millis(5));
    }
}
