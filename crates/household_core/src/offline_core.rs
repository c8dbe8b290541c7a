//! Composition root.
//!
//! [`OfflineCore`] owns the background tasks of the offline-resilience layer:
//! the journal replay worker and the calendar retry queue. The shell cache
//! controller runs on its own and is started separately with
//! [`start_cache_control`].

use crate::settings::CoreSettings;
use anyhow::Context;
use cache_control::{
    serve, CacheConfig, CacheController, ControlClient, MemoryCacheStorage, Network,
};
use calendar::{CalendarClient, CalendarEvent, CalendarService, ScheduleOutcome};
use household_model::Plant;
use offline_sync::{RemoteStore, ReplayWorker, SyncCoordinator};
use retry_queue::RetryQueue;
use std::path::Path;
use std::sync::Arc;
use store::CacheStore;
use tokio::task::JoinHandle;

pub struct OfflineCore<R, C> {
    coordinator: Arc<SyncCoordinator<R>>,
    calendar: CalendarService<C>,
    replay_worker: ReplayWorker,
    retry_queue: RetryQueue,
    retry_task: JoinHandle<()>,
}

impl<R, C> OfflineCore<R, C>
where
    R: RemoteStore + 'static,
    C: CalendarClient + 'static,
{
    /// Open the local store under `data_dir` and start the background tasks.
    ///
    /// Must be called from within a tokio runtime. The core starts offline;
    /// call [`Self::connectivity_restored`] once the remote store is known to
    /// be reachable.
    pub fn start(
        settings: &CoreSettings,
        data_dir: &Path,
        remote: R,
        calendar_client: C,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let store_config = settings
            .store
            .clone()
            .with_path(settings.store_path(data_dir));
        let store = CacheStore::open(store_config.file_backend());
        tracing::info!(
            "Opened local store at {} with {} pending changes",
            store_config.path.display(),
            store.pending_count()
        );

        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(store),
            remote,
            settings.sync.clone(),
        ));
        let replay_worker = ReplayWorker::spawn(coordinator.clone());

        let (retry_queue, retry_task) = RetryQueue::spawn(settings.retry_queue.clone());
        let calendar = CalendarService::new(calendar_client, retry_queue.clone())
            .with_call_timeout(settings.retry_queue.call_timeout());

        Ok(Self {
            coordinator,
            calendar,
            replay_worker,
            retry_queue,
            retry_task,
        })
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator<R>> {
        &self.coordinator
    }

    pub fn calendar(&self) -> &CalendarService<C> {
        &self.calendar
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    /// The network is back: replay the journal and flush calendar retries
    pub fn connectivity_restored(&self) {
        self.coordinator.set_online(true);
        if let Err(e) = self.retry_queue.process_now() {
            tracing::warn!("Retry queue unavailable: {}", e);
        }
    }

    pub fn connectivity_lost(&self) {
        self.coordinator.set_online(false);
    }

    /// Mirror the open care tasks of a plant into the calendar.
    ///
    /// Returns at once; the provider calls run on a spawned task. Failures
    /// are logged and never reach the caller. The handle resolves to how many
    /// events were scheduled or handed to the retry queue.
    pub fn schedule_plant_care(&self, plant: &Plant) -> JoinHandle<usize> {
        let events: Vec<CalendarEvent> = plant
            .care_tasks
            .iter()
            .filter_map(|task| CalendarEvent::for_care_task(plant, task))
            .collect();
        let calendar = self.calendar.clone();

        tokio::spawn(async move {
            let mut scheduled = 0;
            for event in events {
                let key = event.key();
                match calendar.reschedule(event).await {
                    Ok(ScheduleOutcome::Deferred) => {
                        tracing::debug!("Calendar update for {} deferred", key);
                        scheduled += 1;
                    }
                    Ok(_) => scheduled += 1,
                    Err(e) => tracing::warn!("Calendar update for {} failed: {}", key, e),
                }
            }
            scheduled
        })
    }

    /// Stop the background tasks, letting an in-flight replay finish
    pub async fn shutdown(self) {
        self.replay_worker.shutdown().await;
        self.retry_queue.shutdown();
        if let Err(e) = self.retry_task.await {
            tracing::warn!("Retry queue ended abnormally: {}", e);
        }
        tracing::info!("Offline core stopped");
    }
}

/// Build the shell cache controller and serve its control protocol
pub fn start_cache_control<N>(
    config: &CacheConfig,
    network: N,
) -> anyhow::Result<(Arc<CacheController<N>>, ControlClient, JoinHandle<()>)>
where
    N: Network + 'static,
{
    let controller = CacheController::new(config.clone(), network, MemoryCacheStorage::new())
        .context("building cache controller")?;
    let controller = Arc::new(controller);
    let (client, task) = serve(controller.clone());
    tracing::info!("Cache control serving build {}", controller.version());
    Ok((controller, client, task))
}
