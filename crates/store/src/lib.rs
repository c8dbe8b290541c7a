//! Store - Local entity cache and pending-operation journal
//!
//! This crate keeps the last known value of every cached record together with
//! the journal of mutations that have not yet reached the remote store. The
//! whole state is serialized as one blob and written atomically, so a restart
//! observes each mutation completely or not at all.

mod backend;
mod cache_store;
mod config;
mod error;
mod journal;

pub use backend::*;
pub use cache_store::*;
pub use config::*;
pub use error::*;
pub use journal::*;
