//! Cache Control - versioned network caching for the application shell
//!
//! Intercepted requests are classified by resource and answered with one of
//! three strategies:
//!
//! - shell resources: network first, falling back to cache and an offline page
//! - static assets: cache first, falling back to a placeholder image
//! - everything else: stale-while-revalidate, falling back to a JSON error
//!
//! Responses live in named generations tied to the build id. Activating a
//! build deletes the application's older generations and leaves foreign
//! caches alone. The foreground talks to the controller only through the
//! command protocol in [`protocol`], served by [`serve`].

pub mod config;
pub mod controller;
pub mod error;
pub mod generation;
pub mod http;
pub mod network;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod strategy;

pub use config::CacheConfig;
pub use controller::{CacheController, LifecycleState};
pub use error::{CacheError, Result};
pub use generation::CacheGenerations;
pub use http::{Method, Request, Response};
pub use network::{MemoryNetwork, Network};
pub use protocol::{
    CacheInfo, ControlCommand, ControlRequest, ControlResponse, FailedUrl, Notification,
    ResponsePayload,
};
pub use server::{serve, ControlClient};
pub use storage::{CacheStorage, MemoryCacheStorage};
pub use strategy::{ResourceClass, ResourceClassifier, Strategy};
