//! Calendar service.
//!
//! Each operation makes one direct call to the calendar provider. Failures
//! the classifier marks fatal (rejected credentials, malformed events) are
//! returned to the caller. Everything else is handed to the retry queue under
//! the event's key and reported as [`ScheduleOutcome::Deferred`], so domain
//! writes never wait on the calendar.

use crate::client::CalendarClient;
use crate::error::{CalendarError, Result};
use crate::event::{CalendarEvent, EventKey};
use futures_util::FutureExt;
use retry_queue::{CallError, DefaultClassifier, ErrorClassifier, Invocation, RetryQueue};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Provider event ids, by the entity they mirror
type EventIds = Arc<Mutex<HashMap<EventKey, String>>>;

/// What happened to a calendar request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { event_id: String },
    Updated { event_id: String },
    Removed,
    /// Handed to the retry queue
    Deferred,
}

pub struct CalendarService<C> {
    client: Arc<C>,
    queue: RetryQueue,
    classifier: Arc<dyn ErrorClassifier>,
    event_ids: EventIds,
    call_timeout: Duration,
}

impl<C> Clone for CalendarService<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            queue: self.queue.clone(),
            classifier: self.classifier.clone(),
            event_ids: self.event_ids.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<C: CalendarClient + 'static> CalendarService<C> {
    pub fn new(client: C, queue: RetryQueue) -> Self {
        Self {
            client: Arc::new(client),
            queue,
            classifier: Arc::new(DefaultClassifier::default()),
            event_ids: Arc::new(Mutex::new(HashMap::new())),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Provider id of the event mirroring `key`, once created
    pub fn event_id(&self, key: &EventKey) -> Option<String> {
        self.event_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Create the event, or update it if this entity already has one
    pub async fn schedule(&self, event: CalendarEvent) -> Result<ScheduleOutcome> {
        let key = event.key();
        if let Some(event_id) = self.event_id(&key) {
            return self.update(event_id, event).await;
        }

        match self.call(self.client.create_event(&event)).await {
            Ok(event_id) => {
                remember(&self.event_ids, key.clone(), event_id.clone());
                self.cancel_queued(&key).await;
                tracing::debug!("Scheduled {} as {}", key, event_id);
                Ok(ScheduleOutcome::Scheduled { event_id })
            }
            Err(error) => {
                let invocation =
                    create_invocation(self.client.clone(), self.event_ids.clone(), event);
                self.defer(&key, error, invocation)
            }
        }
    }

    /// Bring the event in line with a changed entity
    pub async fn reschedule(&self, event: CalendarEvent) -> Result<ScheduleOutcome> {
        match self.event_id(&event.key()) {
            Some(event_id) => self.update(event_id, event).await,
            None => self.schedule(event).await,
        }
    }

    /// Remove the event for `key`, dropping any queued call for it
    pub async fn unschedule(&self, key: &EventKey) -> Result<ScheduleOutcome> {
        self.cancel_queued(key).await;

        let Some(event_id) = self.event_id(key) else {
            return Ok(ScheduleOutcome::Removed);
        };

        match self.call(self.client.delete_event(&event_id)).await {
            Ok(()) => {
                forget(&self.event_ids, key);
                tracing::debug!("Unscheduled {}", key);
                Ok(ScheduleOutcome::Removed)
            }
            Err(error) => {
                let invocation = delete_invocation(
                    self.client.clone(),
                    self.event_ids.clone(),
                    key.clone(),
                    event_id,
                );
                self.defer(key, error, invocation)
            }
        }
    }

    async fn update(&self, event_id: String, event: CalendarEvent) -> Result<ScheduleOutcome> {
        let key = event.key();
        match self.call(self.client.update_event(&event_id, &event)).await {
            Ok(()) => {
                self.cancel_queued(&key).await;
                Ok(ScheduleOutcome::Updated { event_id })
            }
            Err(error) => {
                let invocation = update_invocation(self.client.clone(), event_id, event);
                self.defer(&key, error, invocation)
            }
        }
    }

    async fn call<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, CallError>>,
    ) -> std::result::Result<T, CallError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout(self.call_timeout)),
        }
    }

    fn defer(
        &self,
        key: &EventKey,
        error: CallError,
        invocation: Invocation,
    ) -> Result<ScheduleOutcome> {
        let classification = self.classifier.classify(&error);
        if !classification.retryable {
            tracing::warn!("Calendar call for {} rejected: {}", key, error);
            return Err(CalendarError::from(error));
        }

        tracing::info!("Calendar call for {} deferred: {}", key, error);
        self.queue.enqueue_invocation(
            key.to_string(),
            invocation,
            self.queue.default_max_retries(),
            classification.retry_after,
        )?;
        Ok(ScheduleOutcome::Deferred)
    }

    /// A direct call superseded whatever was queued for this key
    async fn cancel_queued(&self, key: &EventKey) {
        if let Err(e) = self.queue.cancel(key.to_string()).await {
            tracing::warn!("Could not cancel queued calendar call {}: {}", key, e);
        }
    }
}

fn remember(event_ids: &EventIds, key: EventKey, event_id: String) {
    event_ids
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, event_id);
}

fn forget(event_ids: &EventIds, key: &EventKey) {
    event_ids
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key);
}

// ========== Queued invocations ==========

fn create_invocation<C: CalendarClient + 'static>(
    client: Arc<C>,
    event_ids: EventIds,
    event: CalendarEvent,
) -> Invocation {
    Arc::new(move || {
        let client = client.clone();
        let event_ids = event_ids.clone();
        let event = event.clone();
        async move {
            let event_id = client.create_event(&event).await?;
            remember(&event_ids, event.key(), event_id);
            Ok(())
        }
        .boxed()
    })
}

fn update_invocation<C: CalendarClient + 'static>(
    client: Arc<C>,
    event_id: String,
    event: CalendarEvent,
) -> Invocation {
    Arc::new(move || {
        let client = client.clone();
        let event_id = event_id.clone();
        let event = event.clone();
        async move { client.update_event(&event_id, &event).await }.boxed()
    })
}

fn delete_invocation<C: CalendarClient + 'static>(
    client: Arc<C>,
    event_ids: EventIds,
    key: EventKey,
    event_id: String,
) -> Invocation {
    Arc::new(move || {
        let client = client.clone();
        let event_ids = event_ids.clone();
        let key = key.clone();
        let event_id = event_id.clone();
        async move {
            client.delete_event(&event_id).await?;
            forget(&event_ids, &key);
            Ok(())
        }
        .boxed()
    })
}
