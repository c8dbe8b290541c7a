use cache_control::{CacheConfig, ControlCommand, MemoryNetwork, ResponsePayload};
use calendar::{CalendarClient, CalendarEvent, MemoryCalendarClient};
use chrono::{Duration as ChronoDuration, Utc};
use household_core::{start_cache_control, CoreSettings, OfflineCore};
use household_model::{CareTask, Collection, Plant};
use offline_sync::{MemoryRemoteStore, WriteOutcome};
use retry_queue::CallError;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

type Core = OfflineCore<MemoryRemoteStore, MemoryCalendarClient>;

fn start(dir: &TempDir) -> Core {
    OfflineCore::start(
        &CoreSettings::default(),
        dir.path(),
        MemoryRemoteStore::new(),
        MemoryCalendarClient::new(),
    )
    .unwrap()
}

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
async fn test_offline_write_replays_when_connectivity_returns() {
    let dir = TempDir::new().unwrap();
    let core = start(&dir);

    let outcome = core
        .coordinator()
        .create("u1", &Plant::new("p1", "u1", "Fig", Utc::now()))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Queued);

    core.connectivity_restored();
    wait_until(|| core.coordinator().store().pending_count() == 0).await;
    assert!(core
        .coordinator()
        .remote()
        .document(Collection::Plants, "p1")
        .is_some());

    core.shutdown().await;
}

#[tokio::test]
async fn test_pending_changes_survive_restart() {
    let dir = TempDir::new().unwrap();

    let core = start(&dir);
    core.coordinator()
        .create("u1", &Plant::new("p1", "u1", "Fig", Utc::now()))
        .await
        .unwrap();
    core.shutdown().await;

    let core = start(&dir);
    assert_eq!(core.coordinator().store().pending_count(), 1);
    assert!(dir.path().join("household-cache.json").exists());
    core.shutdown().await;
}

#[tokio::test]
async fn test_calendar_failures_do_not_fail_the_caller() {
    let dir = TempDir::new().unwrap();
    let core = start(&dir);

    let now = Utc::now();
    let mut plant = Plant::new("p1", "u1", "Fig", now);
    for (id, days) in [("c1", 1), ("c2", 7)] {
        let mut task = CareTask::new(id, "Water", now);
        task.plant_id = "p1".into();
        task.due_date = Some(now + ChronoDuration::days(days));
        plant.care_tasks.push(task);
    }
    let mut done = CareTask::new("c3", "Repot", now);
    done.completed = true;
    done.due_date = Some(now);
    plant.care_tasks.push(done);

    core.calendar()
        .client()
        .fail_next(CallError::Unauthorized("token revoked".into()));
    assert_eq!(core.schedule_plant_care(&plant).await.unwrap(), 1);
    assert_eq!(core.calendar().client().event_count(), 1);

    core.shutdown().await;
}

/// Calendar provider that never answers
struct UnresponsiveCalendar;

impl CalendarClient for UnresponsiveCalendar {
    async fn create_event(&self, _: &CalendarEvent) -> Result<String, CallError> {
        std::future::pending().await
    }

    async fn update_event(&self, _: &str, _: &CalendarEvent) -> Result<(), CallError> {
        std::future::pending().await
    }

    async fn delete_event(&self, _: &str) -> Result<(), CallError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_calendar_does_not_block_the_caller() {
    let dir = TempDir::new().unwrap();
    let core = OfflineCore::start(
        &CoreSettings::default(),
        dir.path(),
        MemoryRemoteStore::new(),
        UnresponsiveCalendar,
    )
    .unwrap();

    let now = Utc::now();
    let mut plant = Plant::new("p1", "u1", "Fig", now);
    for id in ["c1", "c2", "c3"] {
        let mut task = CareTask::new(id, "Water", now);
        task.plant_id = "p1".into();
        task.due_date = Some(now + ChronoDuration::days(1));
        plant.care_tasks.push(task);
    }

    let started = Instant::now();
    let handle = core.schedule_plant_care(&plant);
    assert_eq!(started.elapsed(), Duration::ZERO);

    // Every call times out and is deferred to the retry queue
    assert_eq!(handle.await.unwrap(), 3);
    assert!(started.elapsed() >= Duration::from_secs(30));

    core.shutdown().await;
}

#[tokio::test]
async fn test_cache_control_serves_commands() {
    let network = MemoryNetwork::new();
    let config = CacheConfig::new("household", "2026.10.1");

    let (controller, client, _task) = start_cache_control(&config, network).unwrap();
    let response = client.send(ControlCommand::GetCacheVersion).await.unwrap();
    assert_eq!(
        response.payload,
        ResponsePayload::Version {
            version: "2026.10.1".into()
        }
    );
    assert_eq!(controller.generations().shell(), "household-2026.10.1");
}
