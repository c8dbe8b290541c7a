//! Control protocol between the foreground application and the cache layer.
//!
//! Requests are `{type, action?, ...}` envelopes; responses are
//! `{success, action?, ...payload}` or `{success: false, error}`. The
//! optional `action` string is echoed back so callers can correlate replies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commands understood by the cache control loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    /// Promote a newly installed generation immediately
    SkipWaiting,
    /// Pre-populate the dynamic cache
    CacheUrls { urls: Vec<String> },
    /// Delete every cache this application owns
    ClearCache,
    ClearOldCaches,
    ForceCacheCleanup,
    GetCacheInfo,
    ValidateCaches,
    GetCacheVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(flatten)]
    pub command: ControlCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ControlRequest {
    pub fn new(command: ControlCommand) -> Self {
        Self {
            command,
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

impl From<ControlCommand> for ControlRequest {
    fn from(command: ControlCommand) -> Self {
        Self::new(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub name: String,
    pub entries: usize,
    /// Approximate bytes held
    pub size_bytes: usize,
    pub current: bool,
    /// Owned by this application but from an older build
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
}

/// Command-specific part of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Deleted {
        #[serde(rename = "deletedCount")]
        deleted_count: usize,
        deleted: Vec<String>,
    },
    Cached {
        cached: Vec<String>,
        failed: Vec<FailedUrl>,
    },
    Info {
        version: String,
        caches: Vec<CacheInfo>,
        #[serde(rename = "totalSizeBytes")]
        total_size_bytes: usize,
    },
    Validation {
        valid: bool,
        generations: BTreeMap<String, bool>,
    },
    Version {
        version: String,
    },
    Error {
        error: String,
    },
    Empty {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl ControlResponse {
    pub fn ok(action: Option<String>, payload: ResponsePayload) -> Self {
        Self {
            success: true,
            action,
            payload,
        }
    }

    pub fn error(action: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action,
            payload: ResponsePayload::Error {
                error: error.into(),
            },
        }
    }
}

/// Unsolicited messages broadcast to every connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    ServiceActivated { version: String, caches: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request: ControlRequest =
            serde_json::from_value(json!({ "type": "CACHE_URLS", "urls": ["/a"], "action": "warm" }))
                .unwrap();
        assert_eq!(
            request,
            ControlRequest::new(ControlCommand::CacheUrls {
                urls: vec!["/a".into()]
            })
            .with_action("warm")
        );

        let request: ControlRequest =
            serde_json::from_value(json!({ "type": "GET_CACHE_VERSION" })).unwrap();
        assert_eq!(request.command, ControlCommand::GetCacheVersion);
        assert!(request.action.is_none());
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result: Result<ControlRequest, _> =
            serde_json::from_value(json!({ "type": "REBOOT" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let response = ControlResponse::ok(
            Some("cleanup".into()),
            ResponsePayload::Deleted {
                deleted_count: 2,
                deleted: vec!["app-v1".into(), "app-v2".into()],
            },
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": true,
                "action": "cleanup",
                "deletedCount": 2,
                "deleted": ["app-v1", "app-v2"],
            })
        );

        let error = ControlResponse::error(None, "boom");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "success": false, "error": "boom" })
        );
    }

    #[test]
    fn test_notification_wire_format() {
        let notification = Notification::ServiceActivated {
            version: "v3".into(),
            caches: vec!["app-v3".into()],
        };
        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({ "type": "SERVICE_ACTIVATED", "version": "v3", "caches": ["app-v3"] })
        );
    }
}
