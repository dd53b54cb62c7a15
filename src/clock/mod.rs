// src/clock/mod.rs

//! Monotonic time source with cancellable waits.
//!
//! All delays in the engine (retry backoff, the long-dependency grace, the
//! file-watch debounce window) go through [`Clock`] so that tests can drive
//! time instead of sleeping for real. Dropping the future returned by
//! [`Clock::sleep`] cancels the wait.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

pub mod mock;

pub use mock::MockClock;

/// Future returned by [`Clock::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Monotonic time source and cancellable delay primitive.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Resolve after `dur` has elapsed. Dropping the future cancels the wait.
    fn sleep(&self, dur: Duration) -> SleepFuture;
}

/// Production clock backed by the Tokio timer.
///
/// `now` goes through `tokio::time::Instant` so that tests running with a
/// paused runtime (`#[tokio::test(start_paused = true)]`) observe consistent
/// timestamps and auto-advanced sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, dur: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(dur))
    }
}
