//! Background journal replay.
//!
//! The worker owns no state of its own. It wakes on the coordinator's replay
//! trigger (connectivity restored, change queued) and on a fixed interval,
//! and runs a replay whenever the coordinator is online.

use crate::coordinator::SyncCoordinator;
use crate::remote::RemoteStore;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a running replay worker
pub struct ReplayWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReplayWorker {
    pub fn spawn<R: RemoteStore + 'static>(coordinator: Arc<SyncCoordinator<R>>) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let trigger = coordinator.replay_trigger();
        let interval = coordinator.config().replay_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = trigger.notified() => {}
                    _ = ticker.tick() => {}
                }

                if !coordinator.is_online() {
                    continue;
                }
                if let Err(e) = coordinator.replay_pending().await {
                    tracing::warn!("Journal replay failed: {}", e);
                }
            }

            tracing::debug!("Replay worker stopped");
        });

        Self { stop, handle }
    }

    /// Stop the worker and wait for an in-flight replay to finish
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!("Replay worker ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use crate::SyncConfig;
    use chrono::Utc;
    use household_model::{Collection, Plant};
    use retry_queue::BackoffPolicy;
    use std::time::Duration;
    use store::CacheStore;

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connectivity_restored_triggers_replay() {
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(CacheStore::in_memory()),
            MemoryRemoteStore::new(),
            SyncConfig::default(),
        ));
        let worker = ReplayWorker::spawn(coordinator.clone());

        coordinator
            .create("u1", &Plant::new("p1", "u1", "Fig", Utc::now()))
            .await
            .unwrap();
        coordinator.set_online(true);

        wait_until(|| coordinator.store().pending_count() == 0).await;
        assert!(coordinator
            .remote()
            .document(Collection::Plants, "p1")
            .is_some());

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_retries_requeued_operations() {
        let config = SyncConfig::default()
            .with_replay_interval(Duration::from_secs(30))
            .with_replay_backoff(BackoffPolicy::new(Duration::ZERO, Duration::ZERO, 2.0));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(CacheStore::in_memory()),
            MemoryRemoteStore::new(),
            config,
        ));

        coordinator
            .create("u1", &Plant::new("p1", "u1", "Fig", Utc::now()))
            .await
            .unwrap();
        coordinator.remote().set_reachable(false);
        coordinator.set_online(true);
        let worker = ReplayWorker::spawn(coordinator.clone());

        // First replay fails and stays queued
        wait_until(|| coordinator.store().list_pending()[0].attempts > 0).await;
        coordinator.remote().set_reachable(true);

        tokio::time::sleep(Duration::from_secs(31)).await;
        wait_until(|| coordinator.store().pending_count() == 0).await;

        worker.shutdown().await;
    }
}
