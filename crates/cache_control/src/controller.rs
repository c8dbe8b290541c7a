//! Cache controller.
//!
//! Owns the generation lifecycle (install, activate, cleanup), answers
//! intercepted fetches with the strategy for their resource class, and
//! executes control commands.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --install--> Installed --activate / SKIP_WAITING--> Active
//! ```
//!
//! A `SKIP_WAITING` received before install completes activates the new
//! generation as soon as install succeeds.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::generation::CacheGenerations;
use crate::http::{Method, Request, Response};
use crate::network::Network;
use crate::protocol::{
    CacheInfo, ControlCommand, ControlRequest, ControlResponse, FailedUrl, Notification,
    ResponsePayload,
};
use crate::storage::{CacheStorage, MemoryCacheStorage};
use crate::strategy::{self, ResourceClass, ResourceClassifier, Strategy};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    /// Installed and waiting to take over
    Installed,
    Active,
}

#[derive(Debug)]
struct Lifecycle {
    state: LifecycleState,
    skip_waiting: bool,
}

pub struct CacheController<N, S = MemoryCacheStorage> {
    config: CacheConfig,
    generations: CacheGenerations,
    classifier: ResourceClassifier,
    network: Arc<N>,
    storage: Arc<S>,
    lifecycle: Mutex<Lifecycle>,
    notifications: broadcast::Sender<Notification>,
}

impl<N, S> CacheController<N, S>
where
    N: Network + 'static,
    S: CacheStorage + 'static,
{
    pub fn new(config: CacheConfig, network: N, storage: S) -> Result<Self> {
        let classifier = ResourceClassifier::new(&config)?;
        let generations = CacheGenerations::new(config.prefix.clone(), config.build_id.clone());
        let (notifications, _) = broadcast::channel(16);

        Ok(Self {
            config,
            generations,
            classifier,
            network: Arc::new(network),
            storage: Arc::new(storage),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Idle,
                skip_waiting: false,
            }),
            notifications,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn generations(&self) -> &CacheGenerations {
        &self.generations
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn version(&self) -> &str {
        self.generations.build_id()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub(crate) fn notifications(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Lifecycle ==========

    /// Pre-cache the shell resources into the new shell generation.
    ///
    /// Fails without changing state if any resource cannot be fetched.
    pub async fn install(&self) -> Result<()> {
        let shell = self.generations.shell();
        self.storage.open(&shell);

        for url in &self.config.precache_urls {
            let request = Request::get(url.as_str());
            let response = self
                .fetch_with_retries(&request)
                .await
                .map_err(|e| CacheError::Precache {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_cacheable() {
                return Err(CacheError::Precache {
                    url: url.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            self.store(&shell, url, response);
        }

        tracing::info!(
            "Installed cache generation {} ({} shell resources)",
            self.version(),
            self.config.precache_urls.len()
        );

        let activate_now = {
            let mut lifecycle = self.lifecycle();
            lifecycle.state = LifecycleState::Installed;
            lifecycle.skip_waiting
        };
        if activate_now {
            self.activate();
        }
        Ok(())
    }

    /// Make the current generations live and delete stale ones.
    ///
    /// Returns the names of deleted caches.
    pub fn activate(&self) -> Vec<String> {
        let deleted = self.cleanup_stale();
        for name in self.generations.current() {
            self.storage.open(&name);
        }
        self.lifecycle().state = LifecycleState::Active;

        tracing::info!(
            "Activated cache generation {}, removed {} stale caches",
            self.version(),
            deleted.len()
        );
        // No receivers is fine
        let _ = self.notifications.send(Notification::ServiceActivated {
            version: self.version().to_string(),
            caches: self.generations.current().to_vec(),
        });
        deleted
    }

    /// Promote an installed generation without waiting
    pub fn skip_waiting(&self) {
        let state = {
            let mut lifecycle = self.lifecycle();
            lifecycle.skip_waiting = true;
            lifecycle.state
        };
        if state == LifecycleState::Installed {
            self.activate();
        }
    }

    /// Delete caches owned by this application that are not current
    pub fn cleanup_stale(&self) -> Vec<String> {
        let names = self.storage.cache_names();
        let stale = self.generations.stale(&names);
        for name in &stale {
            if self.storage.delete_cache(name) {
                tracing::debug!("Deleted stale cache {}", name);
            }
        }
        stale
    }

    /// Delete every cache this application owns
    pub fn clear_all(&self) -> Vec<String> {
        let owned: Vec<String> = self
            .storage
            .cache_names()
            .into_iter()
            .filter(|name| self.generations.owns(name))
            .collect();
        for name in &owned {
            self.storage.delete_cache(name);
        }
        tracing::info!("Cleared {} caches", owned.len());
        owned
    }

    // ========== Fetch handling ==========

    /// Answer an intercepted request
    pub async fn handle_fetch(&self, request: &Request) -> Response {
        if request.method != Method::Get {
            return match self.fetch_once(request).await {
                Ok(response) => response,
                Err(e) => strategy::unavailable(&e.to_string()),
            };
        }

        let class = self.classifier.classify(request);
        match class.strategy() {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        let cache = self.generations.for_class(ResourceClass::Shell);
        match self.fetch_with_retries(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&cache, &request.url, response.clone());
                }
                response
            }
            Err(e) => {
                tracing::debug!("Network failed for {}, trying cache: {}", request.url, e);
                if let Some(cached) = self.storage.lookup(&cache, &request.url) {
                    return cached;
                }
                if request.navigation {
                    return self
                        .storage
                        .lookup(&cache, &self.config.offline_page)
                        .unwrap_or_else(strategy::offline_page);
                }
                strategy::unavailable(&e.to_string())
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Response {
        let cache = self.generations.for_class(ResourceClass::Static);
        if let Some(cached) = self.storage.lookup(&cache, &request.url) {
            return cached;
        }

        match self.fetch_once(request).await {
            Ok(response) if response.is_cacheable() => {
                self.store(&cache, &request.url, response.clone());
                response
            }
            Ok(response) => {
                tracing::debug!(
                    "Serving placeholder for {}: status {}",
                    request.url,
                    response.status
                );
                strategy::placeholder_image()
            }
            Err(e) => {
                tracing::debug!("Serving placeholder for {}: {}", request.url, e);
                strategy::placeholder_image()
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Response {
        let cache = self.generations.for_class(ResourceClass::Dynamic);
        if let Some(cached) = self.storage.lookup(&cache, &request.url) {
            self.revalidate_in_background(cache, request.clone());
            return cached;
        }

        match self.fetch_once(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&cache, &request.url, response.clone());
                }
                response
            }
            Err(e) => strategy::unavailable(&e.to_string()),
        }
    }

    fn revalidate_in_background(&self, cache: String, request: Request) {
        let network = self.network.clone();
        let storage = self.storage.clone();
        let timeout = self.config.fetch_timeout();

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, network.fetch(&request)).await {
                Ok(Ok(response)) if response.is_cacheable() => {
                    if let Err(e) = storage.put(&cache, &request.url, response) {
                        tracing::warn!("Could not refresh {}: {}", request.url, e);
                    }
                }
                Ok(Ok(response)) => {
                    tracing::debug!("Kept cached {} (status {})", request.url, response.status)
                }
                Ok(Err(e)) => tracing::debug!("Revalidation of {} failed: {}", request.url, e),
                Err(_) => tracing::debug!("Revalidation of {} timed out", request.url),
            }
        });
    }

    async fn fetch_once(&self, request: &Request) -> Result<Response> {
        match tokio::time::timeout(self.config.fetch_timeout(), self.network.fetch(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(request.url.clone())),
        }
    }

    async fn fetch_with_retries(&self, request: &Request) -> Result<Response> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.config.network_retries => {
                    attempt += 1;
                    tracing::debug!("Retrying {} (attempt {}): {}", request.url, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort write; on quota pressure drop stale generations and retry once
    fn store(&self, cache: &str, url: &str, response: Response) {
        match self.storage.put(cache, url, response.clone()) {
            Ok(()) => {}
            Err(CacheError::QuotaExceeded) => {
                let freed = self.cleanup_stale();
                tracing::warn!(
                    "Cache quota exceeded storing {}, removed {} stale caches",
                    url,
                    freed.len()
                );
                if let Err(e) = self.storage.put(cache, url, response) {
                    tracing::warn!("Not caching {}: {}", url, e);
                }
            }
            Err(e) => tracing::warn!("Not caching {}: {}", url, e),
        }
    }

    // ========== Commands ==========

    pub async fn handle_command(&self, request: ControlRequest) -> ControlResponse {
        let action = request.action;
        let payload = match request.command {
            ControlCommand::SkipWaiting => {
                self.skip_waiting();
                ResponsePayload::Empty {}
            }
            ControlCommand::CacheUrls { urls } => {
                let (cached, failed) = self.cache_urls(&urls).await;
                let success = failed.is_empty();
                return ControlResponse {
                    success,
                    action,
                    payload: ResponsePayload::Cached { cached, failed },
                };
            }
            ControlCommand::ClearCache => deleted_payload(self.clear_all()),
            ControlCommand::ClearOldCaches | ControlCommand::ForceCacheCleanup => {
                deleted_payload(self.cleanup_stale())
            }
            ControlCommand::GetCacheInfo => self.cache_info(),
            ControlCommand::ValidateCaches => self.validate(),
            ControlCommand::GetCacheVersion => ResponsePayload::Version {
                version: self.version().to_string(),
            },
        };
        ControlResponse::ok(action, payload)
    }

    /// Decode a wire request, execute it and encode the response
    pub async fn handle_json(&self, raw: &str) -> Result<String> {
        let response = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                let action = value
                    .get("action")
                    .and_then(|a| a.as_str())
                    .map(str::to_string);
                match serde_json::from_value::<ControlRequest>(value) {
                    Ok(request) => self.handle_command(request).await,
                    Err(e) => ControlResponse::error(action, format!("Unknown command: {}", e)),
                }
            }
            Err(e) => ControlResponse::error(None, format!("Malformed request: {}", e)),
        };
        Ok(serde_json::to_string(&response)?)
    }

    async fn cache_urls(&self, urls: &[String]) -> (Vec<String>, Vec<FailedUrl>) {
        let cache = self.generations.dynamic();
        let mut cached = Vec::new();
        let mut failed = Vec::new();

        for url in urls {
            match self.fetch_once(&Request::get(url.as_str())).await {
                Ok(response) if response.is_cacheable() => {
                    self.store(&cache, url, response);
                    cached.push(url.clone());
                }
                Ok(response) => failed.push(FailedUrl {
                    url: url.clone(),
                    error: format!("status {}", response.status),
                }),
                Err(e) => failed.push(FailedUrl {
                    url: url.clone(),
                    error: e.to_string(),
                }),
            }
        }
        (cached, failed)
    }

    fn cache_info(&self) -> ResponsePayload {
        let caches: Vec<CacheInfo> = self
            .storage
            .cache_names()
            .into_iter()
            .map(|name| {
                let entries = self.storage.entries(&name);
                CacheInfo {
                    entries: entries.len(),
                    size_bytes: entries.iter().map(|(_, size)| size).sum(),
                    current: self.generations.is_current(&name),
                    stale: self.generations.is_stale(&name),
                    name,
                }
            })
            .collect();
        ResponsePayload::Info {
            version: self.version().to_string(),
            total_size_bytes: caches.iter().map(|c| c.size_bytes).sum(),
            caches,
        }
    }

    /// A generation is valid when it exists; the shell must also hold every
    /// pre-cached resource
    fn validate(&self) -> ResponsePayload {
        let shell = self.generations.shell();
        let mut generations = BTreeMap::new();
        for name in self.generations.current() {
            let mut valid = self.storage.has_cache(&name);
            if valid && name == shell {
                valid = self
                    .config
                    .precache_urls
                    .iter()
                    .all(|url| self.storage.lookup(&name, url).is_some());
            }
            generations.insert(name, valid);
        }
        ResponsePayload::Validation {
            valid: generations.values().all(|v| *v),
            generations,
        }
    }
}

fn deleted_payload(deleted: Vec<String>) -> ResponsePayload {
    ResponsePayload::Deleted {
        deleted_count: deleted.len(),
        deleted,
    }
}
