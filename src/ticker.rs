//! Cancelable repeating tasks
//!
//! The cache sweep and the rotation driver are both fixed-interval callbacks.
//! They run on `tokio::time::interval`, so tests can drive them with tokio's
//! paused clock, and they stop through a `watch` shutdown signal when the
//! owning [`TaskHandle`] is cancelled or dropped.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Handle to a running repeating task. Dropping it stops the task.
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop after its current callback
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn `task` every `period`. The first call happens one full period after
/// spawning, not immediately.
pub fn spawn_repeating<F>(name: &'static str, period: Duration, mut task: F) -> TaskHandle
where
    F: FnMut() + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick which fires immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(task = name, "repeating task stopped");
                        break;
                    }
                }
                _ = interval.tick() => task(),
            }
        }
    });

    TaskHandle {
        name,
        shutdown_tx,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(period_secs: u64) -> (TaskHandle, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = spawn_repeating("counter", Duration::from_secs(period_secs), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handle, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_per_period() {
        let (_handle, count) = counting_task(5);

        time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_callbacks() {
        let (handle, count) = counting_task(5);

        time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.cancel();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_callbacks() {
        let (handle, count) = counting_task(1);
        drop(handle);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
