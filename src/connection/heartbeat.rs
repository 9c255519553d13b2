//! Periodic keep-alive
//!
//! The loop ticks for as long as it is enabled, connected or not. Whether a
//! tick turns into bytes on the wire is decided by the manager.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A keep-alive message sent at a fixed interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatTask {
    pub interval: Duration,
    pub payload: String,
}

impl HeartbeatTask {
    pub fn new(interval: Duration, payload: impl Into<String>) -> Self {
        Self {
            // interval_at panics on a zero period
            interval: interval.max(Duration::from_millis(1)),
            payload: payload.into(),
        }
    }
}

/// Run the heartbeat loop until cancelled or `beat` returns false
///
/// The first beat happens one full interval after the loop starts.
pub(crate) fn spawn<F>(task: HeartbeatTask, cancel: CancellationToken, mut beat: F) -> JoinHandle<()>
where
    F: FnMut(&str) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + task.interval, task.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !beat(&task.payload) {
                        break;
                    }
                }
            }
        }

        debug!("[HEARTBEAT] Loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_zero_interval_is_clamped() {
        let task = HeartbeatTask::new(Duration::ZERO, "ping");
        assert_eq!(task.interval, Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_at_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let cancel = CancellationToken::new();

        let task = HeartbeatTask::new(Duration::from_millis(100), "ping");
        let handle = spawn(task, cancel.clone(), move |payload| {
            assert_eq!(payload, "ping");
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_beat_declines() {
        let cancel = CancellationToken::new();
        let task = HeartbeatTask::new(Duration::from_millis(10), "ping");
        let handle = spawn(task, cancel, |_| false);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop")
            .unwrap();
    }
}
