//! Named response caches

use crate::error::{CacheError, Result};
use crate::http::Response;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage for named caches of responses keyed by URL
pub trait CacheStorage: Send + Sync {
    fn cache_names(&self) -> Vec<String>;

    fn has_cache(&self, name: &str) -> bool;

    /// Create the cache if it does not exist yet
    fn open(&self, name: &str);

    /// Returns whether the cache existed
    fn delete_cache(&self, name: &str) -> bool;

    fn lookup(&self, cache: &str, url: &str) -> Option<Response>;

    /// Store a response, creating the cache if needed
    fn put(&self, cache: &str, url: &str, response: Response) -> Result<()>;

    /// URL and approximate size of every entry in the cache
    fn entries(&self, cache: &str) -> Vec<(String, usize)>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    fn cache_names(&self) -> Vec<String> {
        (**self).cache_names()
    }

    fn has_cache(&self, name: &str) -> bool {
        (**self).has_cache(name)
    }

    fn open(&self, name: &str) {
        (**self).open(name)
    }

    fn delete_cache(&self, name: &str) -> bool {
        (**self).delete_cache(name)
    }

    fn lookup(&self, cache: &str, url: &str) -> Option<Response> {
        (**self).lookup(cache, url)
    }

    fn put(&self, cache: &str, url: &str, response: Response) -> Result<()> {
        (**self).put(cache, url, response)
    }

    fn entries(&self, cache: &str) -> Vec<(String, usize)> {
        (**self).entries(cache)
    }
}

/// In-process cache storage with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: Mutex<BTreeMap<String, BTreeMap<String, Response>>>,
    quota_bytes: Option<usize>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn total_size(&self) -> usize {
        Self::size_of(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, Response>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn size_of(caches: &BTreeMap<String, BTreeMap<String, Response>>) -> usize {
        caches
            .values()
            .flat_map(BTreeMap::values)
            .map(Response::size)
            .sum()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn cache_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn has_cache(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn open(&self, name: &str) {
        self.lock().entry(name.to_string()).or_default();
    }

    fn delete_cache(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    fn lookup(&self, cache: &str, url: &str) -> Option<Response> {
        self.lock().get(cache)?.get(url).cloned()
    }

    fn put(&self, cache: &str, url: &str, response: Response) -> Result<()> {
        let mut caches = self.lock();
        if let Some(quota) = self.quota_bytes {
            let replaced = caches
                .get(cache)
                .and_then(|entries| entries.get(url))
                .map_or(0, Response::size);
            if Self::size_of(&caches) - replaced + response.size() > quota {
                return Err(CacheError::QuotaExceeded);
            }
        }
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
        Ok(())
    }

    fn entries(&self, cache: &str) -> Vec<(String, usize)> {
        self.lock()
            .get(cache)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(url, response)| (url.clone(), response.size()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
