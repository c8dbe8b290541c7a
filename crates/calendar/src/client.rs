//! The calendar integration seam

use crate::event::CalendarEvent;
use retry_queue::CallError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Third-party calendar API
#[trait_variant::make(Send)]
pub trait CalendarClient: Send + Sync {
    /// Create an event and return the provider's event id
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CallError>;

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<(), CallError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CallError>;
}

// ========== In-memory client ==========

/// Calendar held in memory, with scripted failures
#[derive(Default)]
pub struct MemoryCalendarClient {
    events: Mutex<BTreeMap<String, CalendarEvent>>,
    failures: Mutex<VecDeque<CallError>>,
    next_id: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryCalendarClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`; queued failures are consumed in order
    pub fn fail_next(&self, error: CallError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn event(&self, event_id: &str) -> Option<CalendarEvent> {
        self.events().get(event_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events().len()
    }

    fn begin_call(&self) -> Result<(), CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn events(&self) -> MutexGuard<'_, BTreeMap<String, CalendarEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CalendarClient for MemoryCalendarClient {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CallError> {
        self.begin_call()?;
        let id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.events().insert(id.clone(), event.clone());
        Ok(id)
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<(), CallError> {
        self.begin_call()?;
        let mut events = self.events();
        match events.get_mut(event_id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(CallError::InvalidRequest(format!(
                "unknown event {}",
                event_id
            ))),
        }
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CallError> {
        self.begin_call()?;
        self.events().remove(event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> CalendarEvent {
        CalendarEvent::TaskDue {
            task_id: "t1".into(),
            title: "Call plumber".into(),
            due: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let client = MemoryCalendarClient::new();
        let id = client.create_event(&event()).await.unwrap();
        assert_eq!(client.event_count(), 1);

        client.update_event(&id, &event()).await.unwrap();
        assert!(client.update_event("missing", &event()).await.is_err());

        client.delete_event(&id).await.unwrap();
        client.delete_event(&id).await.unwrap();
        assert_eq!(client.event_count(), 0);
        assert_eq!(client.call_count(), 5);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let client = MemoryCalendarClient::new();
        client.fail_next(CallError::Unavailable("503".into()));

        assert!(client.create_event(&event()).await.is_err());
        assert!(client.create_event(&event()).await.is_ok());
    }
}
