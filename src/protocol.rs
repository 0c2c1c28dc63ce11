use serde::{Deserialize, Serialize};

use crate::config::ReviewSettings;
use crate::error::{Error, Result};
use crate::page::PageSnapshot;

/// One inbound request from the UI collaborator, one JSON object per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Liveness probe.
    Ping,
    /// A fresh capture of the rendered page.
    Snapshot { page: PageSnapshot },
    /// Kick off a review pass over the captured page.
    #[serde(rename_all = "camelCase")]
    StartReview {
        /// Scope name (current, all, selected). Defaults to all.
        #[serde(default)]
        review_type: Option<String>,
        /// Settings override for this pass. Falls back to local config.
        #[serde(default)]
        settings: Option<ReviewSettings>,
    },
    /// Drop all rendered findings and annotations.
    ClearComments,
}

/// One outbound line. `extras` carries command-specific fields flattened
/// into the object.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            extras: serde_json::Map::new(),
        }
    }

    pub fn ok_with(key: &str, value: serde_json::Value) -> Self {
        let mut reply = Self::ok();
        reply.extras.insert(key.to_string(), value);
        reply
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            extras: serde_json::Map::new(),
        }
    }

    /// Encode as a single JSON line. Serialization of this shape cannot
    /// fail, but a failure still degrades to a bare error line rather than
    /// panicking mid-protocol.
    pub fn encode(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"success":false,"error":"encoding failure"}"#.to_string())
    }
}

/// Decode one line into a command. Unknown actions and malformed JSON are
/// protocol errors: the caller replies with failure and keeps the loop
/// alive.
pub fn decode_command(line: &str) -> Result<Command> {
    serde_json::from_str(line.trim()).map_err(|e| Error::Protocol(format!("bad command: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Depth;

    #[test]
    fn test_decode_ping() {
        assert!(matches!(
            decode_command(r#"{"action": "ping"}"#).unwrap(),
            Command::Ping
        ));
    }

    #[test]
    fn test_decode_snapshot() {
        let line = r#"{"action": "snapshot", "page": {"url": "https://x.test", "root": {"tag": "body"}}}"#;
        match decode_command(line).unwrap() {
            Command::Snapshot { page } => assert_eq!(page.url, "https://x.test"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_decode_start_review_full() {
        let line = r#"{
            "action": "startReview",
            "reviewType": "current",
            "settings": {"apiKey": "k", "depth": "quick"}
        }"#;
        match decode_command(line).unwrap() {
            Command::StartReview {
                review_type,
                settings,
            } => {
                assert_eq!(review_type.as_deref(), Some("current"));
                let settings = settings.unwrap();
                assert_eq!(settings.api_key, "k");
                assert_eq!(settings.depth, Depth::Quick);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_decode_start_review_bare() {
        match decode_command(r#"{"action": "startReview"}"#).unwrap() {
            Command::StartReview {
                review_type,
                settings,
            } => {
                assert!(review_type.is_none());
                assert!(settings.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_decode_clear_comments() {
        assert!(matches!(
            decode_command(r#"{"action": "clearComments"}"#).unwrap(),
            Command::ClearComments
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let err = decode_command(r#"{"action": "selfDestruct"}"#).unwrap_err();
        assert!(err.to_string().contains("bad command"));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode_command("not json").is_err());
        assert!(decode_command("").is_err());
    }

    #[test]
    fn test_reply_encoding() {
        assert_eq!(Reply::ok().encode(), r#"{"success":true}"#);
        assert_eq!(
            Reply::err("nope").encode(),
            r#"{"success":false,"error":"nope"}"#
        );
        let encoded = Reply::ok_with("status", serde_json::json!("started")).encode();
        assert_eq!(encoded, r#"{"success":true,"status":"started"}"#);
    }
}
