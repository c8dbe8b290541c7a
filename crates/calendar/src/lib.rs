//! Calendar integration
//!
//! Mirrors plant care, project deadlines and task due dates into an external
//! calendar. Calls go straight to the provider; transient failures are handed
//! to a [`retry_queue::RetryQueue`] keyed by entity so a newer change replaces
//! an older one that has not gone through yet.

pub mod client;
pub mod error;
pub mod event;
pub mod service;

pub use client::{CalendarClient, MemoryCalendarClient};
pub use error::{CalendarError, Result};
pub use event::{CalendarEvent, EventKey, EventKind};
pub use service::{CalendarService, ScheduleOutcome};
