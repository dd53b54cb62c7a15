// src/watch/debounce.rs

//! Per-task debouncing of raw file events.
//!
//! Editors frequently write temp + rename, so one user save produces several
//! raw events. Events for the same task arriving within the debounce window
//! collapse into a single emission, delivered one window after the *first*
//! raw event of the burst.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::tasks::TaskId;

/// Window during which repeated events for one task collapse into one.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Spawn the debouncer loop: raw task hits in, debounced task IDs out.
///
/// The window for a task opens at its first raw event; later events within
/// the window are absorbed without extending the deadline.
pub(crate) fn spawn_debouncer(
    clock: Arc<dyn Clock>,
    mut raw_rx: mpsc::UnboundedReceiver<TaskId>,
    out_tx: mpsc::Sender<TaskId>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // Pending emissions; the fixed window keeps this in deadline order.
        let mut pending: Vec<(TaskId, Instant)> = Vec::new();

        loop {
            let next_deadline = pending.first().map(|(_, deadline)| *deadline);
            let sleep = async {
                match next_deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(clock.now());
                        clock.sleep(remaining).await;
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                raw = raw_rx.recv() => match raw {
                    Some(task) => {
                        if pending.iter().any(|(pending_task, _)| *pending_task == task) {
                            debug!(task = %task, "raw event absorbed by open debounce window");
                        } else {
                            pending.push((task, clock.now() + DEBOUNCE_WINDOW));
                        }
                    }
                    None => break,
                },
                _ = sleep => {
                    let now = clock.now();
                    while pending.first().is_some_and(|(_, deadline)| *deadline <= now) {
                        let (task, _) = pending.remove(0);
                        if out_tx.send(task).await.is_err() {
                            return;
                        }
                    }
                }
                _ = token.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use tokio::time::timeout;

    struct Fixture {
        clock: Arc<MockClock>,
        raw_tx: mpsc::UnboundedSender<TaskId>,
        out_rx: mpsc::Receiver<TaskId>,
        token: CancellationToken,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        spawn_debouncer(clock.clone(), raw_rx, out_tx, token.clone());
        Fixture {
            clock,
            raw_tx,
            out_rx,
            token,
        }
    }

    /// Give the debouncer task a chance to drain its input channel.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn burst_collapses_to_one_emission() {
        let mut fx = fixture();

        for _ in 0..3 {
            fx.raw_tx.send("fmt".to_string()).unwrap();
        }
        settle().await;

        fx.clock.advance(DEBOUNCE_WINDOW);
        let task = timeout(Duration::from_secs(1), fx.out_rx.recv())
            .await
            .expect("debounced event")
            .unwrap();
        assert_eq!(task, "fmt");

        settle().await;
        assert!(fx.out_rx.try_recv().is_err());
        fx.token.cancel();
    }

    #[tokio::test]
    async fn distinct_tasks_do_not_collapse() {
        let mut fx = fixture();

        fx.raw_tx.send("a".to_string()).unwrap();
        fx.raw_tx.send("b".to_string()).unwrap();
        settle().await;

        fx.clock.advance(DEBOUNCE_WINDOW);
        let first = timeout(Duration::from_secs(1), fx.out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), fx.out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "a");
        assert_eq!(second, "b");
        fx.token.cancel();
    }

    #[tokio::test]
    async fn events_after_emission_open_a_new_window() {
        let mut fx = fixture();

        fx.raw_tx.send("build".to_string()).unwrap();
        settle().await;
        fx.clock.advance(DEBOUNCE_WINDOW);
        timeout(Duration::from_secs(1), fx.out_rx.recv())
            .await
            .unwrap()
            .unwrap();

        fx.raw_tx.send("build".to_string()).unwrap();
        settle().await;
        fx.clock.advance(DEBOUNCE_WINDOW);
        let again = timeout(Duration::from_secs(1), fx.out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again, "build");
        fx.token.cancel();
    }
}
