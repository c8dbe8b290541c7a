//! Network seam for intercepted fetches

use crate::error::{CacheError, Result};
use crate::http::{Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

#[trait_variant::make(Send)]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

// ========== In-memory network ==========

/// Routes served from memory, with switchable connectivity
#[derive(Debug)]
pub struct MemoryNetwork {
    routes: Mutex<HashMap<String, Response>>,
    fetches: Mutex<HashMap<String, usize>>,
    online: AtomicBool,
    failures: AtomicU32,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            failures: AtomicU32::new(0),
        }
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, response: Response) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fail the next `count` fetches
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        *self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(request.url.clone())
            .or_insert(0) += 1;

        if !self.online.load(Ordering::SeqCst) {
            return Err(CacheError::Network("offline".into()));
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CacheError::Network("connection reset".into()));
        }

        let route = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned();
        Ok(route.unwrap_or_else(|| Response::new(404, "Not Found")))
    }
}
