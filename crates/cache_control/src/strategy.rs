//! Resource classes, their caching strategies and the fallback responses
//! served when neither network nor cache can answer.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::http::{Request, Response};
use regex_lite::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// HTML, CSS and scripts that make up the application shell
    Shell,
    /// Images and fonts
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl ResourceClass {
    pub fn strategy(&self) -> Strategy {
        match self {
            ResourceClass::Shell => Strategy::NetworkFirst,
            ResourceClass::Static => Strategy::CacheFirst,
            ResourceClass::Dynamic => Strategy::StaleWhileRevalidate,
        }
    }
}

/// Assigns requests to a resource class by path pattern
#[derive(Debug, Clone)]
pub struct ResourceClassifier {
    shell: Regex,
    static_assets: Regex,
}

impl ResourceClassifier {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CacheError::Pattern(format!("{}: {}", pattern, e)))
        };
        Ok(Self {
            shell: compile(&config.shell_pattern)?,
            static_assets: compile(&config.static_pattern)?,
        })
    }

    pub fn classify(&self, request: &Request) -> ResourceClass {
        let path = request.path();
        if request.navigation || self.shell.is_match(path) {
            ResourceClass::Shell
        } else if self.static_assets.is_match(path) {
            ResourceClass::Static
        } else {
            ResourceClass::Dynamic
        }
    }
}

// ========== Fallbacks ==========

const OFFLINE_PAGE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1>\
<p>Your changes are saved on this device and will sync when the connection returns.</p>\
</body></html>";

const PLACEHOLDER_SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"200\" viewBox=\"0 0 200 200\">\
<rect width=\"200\" height=\"200\" fill=\"#e8efe6\"/>\
<text x=\"100\" y=\"105\" font-family=\"sans-serif\" font-size=\"14\" fill=\"#6b7d68\" text-anchor=\"middle\">Image unavailable</text>\
</svg>";

/// Generic page for navigations that miss both network and cache
pub fn offline_page() -> Response {
    Response::new(503, OFFLINE_PAGE).with_header("content-type", "text/html; charset=utf-8")
}

/// Stand-in image for static assets that cannot be fetched
pub fn placeholder_image() -> Response {
    Response::ok(PLACEHOLDER_SVG)
        .with_header("content-type", "image/svg+xml")
        .with_header("cache-control", "no-store")
}

/// Structured error for requests nothing can answer
pub fn unavailable(reason: &str) -> Response {
    Response::json(
        503,
        &serde_json::json!({
            "error": "Network unavailable",
            "reason": reason,
            "offline": true,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ResourceClassifier {
        ResourceClassifier::new(&CacheConfig::default()).unwrap()
    }

    #[test]
    fn test_classification() {
        let classifier = classifier();
        assert_eq!(classifier.classify(&Request::get("/")), ResourceClass::Shell);
        assert_eq!(
            classifier.classify(&Request::get("/assets/app.js?v=2")),
            ResourceClass::Shell
        );
        assert_eq!(
            classifier.classify(&Request::get("/styles/main.CSS")),
            ResourceClass::Shell
        );
        assert_eq!(
            classifier.classify(&Request::get("/img/fig.webp")),
            ResourceClass::Static
        );
        assert_eq!(
            classifier.classify(&Request::get("/fonts/inter.woff2")),
            ResourceClass::Static
        );
        assert_eq!(
            classifier.classify(&Request::get("/api/plants")),
            ResourceClass::Dynamic
        );
        assert_eq!(
            classifier.classify(&Request::navigate("/plants/p1")),
            ResourceClass::Shell
        );
    }

    #[test]
    fn test_strategies() {
        assert_eq!(ResourceClass::Shell.strategy(), Strategy::NetworkFirst);
        assert_eq!(ResourceClass::Static.strategy(), Strategy::CacheFirst);
        assert_eq!(
            ResourceClass::Dynamic.strategy(),
            Strategy::StaleWhileRevalidate
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let config = CacheConfig {
            shell_pattern: "(".into(),
            ..CacheConfig::default()
        };
        assert!(matches!(
            ResourceClassifier::new(&config),
            Err(CacheError::Pattern(_))
        ));
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(offline_page().status, 503);
        assert_eq!(placeholder_image().header("content-type"), Some("image/svg+xml"));

        let error = unavailable("offline");
        let body: serde_json::Value = serde_json::from_slice(&error.body).unwrap();
        assert_eq!(body["offline"], true);
    }
}
