//! Household Core - wires the offline-resilience components together
//!
//! - `settings`: persisted configuration for every component
//! - `logging`: tracing subscriber initialisation
//! - `offline_core`: start-up and shutdown of the background tasks

pub mod error;
pub mod logging;
pub mod offline_core;
pub mod settings;

pub use error::{CoreError, Result};
pub use logging::init_logging;
pub use offline_core::{start_cache_control, OfflineCore};
pub use settings::{CoreSettings, SettingsManager};
