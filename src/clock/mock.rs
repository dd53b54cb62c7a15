// src/clock/mock.rs

//! Manually driven clock for deterministic tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::{Clock, SleepFuture};

#[derive(Debug)]
struct Inner {
    now: Instant,
    waiters: Vec<(Instant, oneshot::Sender<()>)>,
}

/// Clock whose time only moves when [`MockClock::advance`] is called.
///
/// Waiters whose deadlines fall within the advanced window are released in
/// deadline order. Waiters whose futures were dropped are discarded silently.
#[derive(Debug, Clone)]
pub struct MockClock {
    inner: Arc<Mutex<Inner>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now: Instant::now(),
                waiters: Vec::new(),
            })),
        }
    }

    /// Move virtual time forward, waking every waiter whose deadline has
    /// passed.
    pub fn advance(&self, dur: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now += dur;
        let now = inner.now;

        inner.waiters.sort_by_key(|(deadline, _)| *deadline);
        while inner
            .waiters
            .first()
            .is_some_and(|(deadline, _)| *deadline <= now)
        {
            let (_, tx) = inner.waiters.remove(0);
            let _ = tx.send(());
        }
    }

    /// Number of waits currently registered (for test assertions).
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().unwrap().waiters.len()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, dur: Duration) -> SleepFuture {
        if dur.is_zero() {
            return Box::pin(async {});
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let deadline = inner.now + dur;
            inner.waiters.push((deadline, tx));
        }
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}
