//! Cache control configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Naming prefix shared by every cache this application owns
    pub prefix: String,
    /// Build identity appended to the current generation names
    pub build_id: String,
    /// Shell resources fetched and stored during install
    pub precache_urls: Vec<String>,
    /// Served to navigations that miss both network and cache
    pub offline_page: String,
    /// Extra network attempts for shell resources
    pub network_retries: u32,
    pub fetch_timeout_ms: u64,
    /// Path pattern for shell resources (HTML, CSS, scripts)
    pub shell_pattern: String,
    /// Path pattern for static assets (images, fonts)
    pub static_pattern: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "app".to_string(),
            build_id: "dev".to_string(),
            precache_urls: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
            network_retries: 2,
            fetch_timeout_ms: 10_000,
            shell_pattern: r"(?i)(^/$|\.(html?|css|m?js)$|/manifest\.(json|webmanifest)$)"
                .to_string(),
            static_pattern: r"(?i)\.(png|jpe?g|gif|svg|webp|avif|ico|bmp|woff2?|ttf|otf|eot)$"
                .to_string(),
        }
    }
}

impl CacheConfig {
    pub fn new(prefix: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            build_id: build_id.into(),
            ..Default::default()
        }
    }

    pub fn with_precache_urls<I, U>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.precache_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_page(mut self, url: impl Into<String>) -> Self {
        self.offline_page = url.into();
        self
    }

    pub fn with_network_retries(mut self, retries: u32) -> Self {
        self.network_retries = retries;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
