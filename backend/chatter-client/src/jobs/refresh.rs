use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::{FeedEngine, RefreshOutcome};

/// Refresh interval for the feed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Background job that polls the contents API and replaces the feed.
///
/// The first refresh fires as soon as the job starts; after that one runs per
/// interval. Ticks missed while a slow refresh was in flight are skipped
/// rather than bunched up.
#[derive(Clone)]
pub struct RefreshJob {
    engine: FeedEngine,
    interval: Duration,
}

impl RefreshJob {
    pub fn new(engine: FeedEngine) -> Self {
        Self {
            engine,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the refresh loop until `shutdown` fires or the engine shuts down.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Feed refresh job started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            if !self.engine.is_live() {
                break;
            }

            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.engine.refresh() => outcome,
            };

            match outcome {
                RefreshOutcome::Applied { count } => debug!(count, "Scheduled refresh applied"),
                RefreshOutcome::Skipped => debug!("Scheduled refresh skipped, one is in flight"),
                // already logged and reported by the engine
                RefreshOutcome::Failed(_) => {}
                RefreshOutcome::Discarded => {}
            }
        }

        info!("Feed refresh job stopped");
    }

    /// Spawn the refresh loop as a Tokio task owned by the returned handle.
    pub fn spawn(self) -> RefreshHandle {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(self.run(rx));
        RefreshHandle {
            shutdown: Some(tx),
            task: Some(task),
        }
    }
}

/// Owns the polling task. Dropping the handle aborts the task, so a
/// discarded view never leaves a timer behind.
pub struct RefreshHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!("Feed refresh task panicked: {}", e);
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl FeedEngine {
    /// Start polling on `interval`; the returned handle owns the timer.
    pub fn start_polling(&self, interval: Duration) -> RefreshHandle {
        RefreshJob::new(self.clone()).with_interval(interval).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::gateway::MockFeedGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_engine() -> (FeedEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockFeedGateway::new();
        mock.expect_list_posts().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        });
        (
            FeedEngine::new(Arc::new(mock), EngineConfig::default()),
            calls,
        )
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(DEFAULT_REFRESH_INTERVAL, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_immediately_then_on_interval() {
        let (engine, calls) = counting_engine();
        let handle = engine.start_polling(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.last_refresh().is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_timer() {
        let (engine, calls) = counting_engine();
        let handle = engine.start_polling(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;

        drop(handle);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_shutdown_ends_loop() {
        let (engine, calls) = counting_engine();
        let handle = engine.start_polling(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;

        engine.shutdown();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
