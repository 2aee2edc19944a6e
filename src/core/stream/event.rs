//! Events delivered to a session's stream.

use serde::{Deserialize, Serialize};

/// Frame name sent once when a client attaches.
pub const CONNECTED: &str = "connected";

/// Frame name for idle and post-completion keep-alives.
pub const KEEP_ALIVE: &str = "keep-alive";

/// One event produced by a turn.
///
/// Serializes as `{"type": <wire name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamEvent {
    /// A piece of the streamed response.
    #[serde(rename = "message_chunk")]
    Chunk { chunk: String },

    /// A response round finished.
    #[serde(rename = "message_complete")]
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// The turn was cancelled by the client.
    #[serde(rename = "message_cancelled")]
    Cancelled { reason: String },

    /// Files the agent edited during the turn.
    #[serde(rename = "files_edited")]
    FilesEdited { files: Vec<String> },

    /// A new commit made during the turn.
    #[serde(rename = "commit")]
    Commit {
        hash: String,
        message: String,
        diff: String,
    },

    /// The agent produced a follow-up prompt for itself.
    #[serde(rename = "reflection_info")]
    ReflectionInfo { message: String, index: u32 },

    /// A follow-up was dropped because the reflection ceiling was reached.
    #[serde(rename = "reflection_limit")]
    ReflectionLimit { message: String },

    /// The client should reload its file lists.
    #[serde(rename = "refresh_files")]
    RefreshFiles { mode: String },

    /// The turn failed.
    #[serde(rename = "error")]
    Error { message: String },
}

impl StreamEvent {
    /// Wire name used as the SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "message_chunk",
            Self::Complete { .. } => "message_complete",
            Self::Cancelled { .. } => "message_cancelled",
            Self::FilesEdited { .. } => "files_edited",
            Self::Commit { .. } => "commit",
            Self::ReflectionInfo { .. } => "reflection_info",
            Self::ReflectionLimit { .. } => "reflection_limit",
            Self::RefreshFiles { .. } => "refresh_files",
            Self::Error { .. } => "error",
        }
    }

    /// JSON payload for the wire, tagged with the owning session.
    #[must_use]
    pub fn payload(&self, session_id: &str) -> serde_json::Value {
        let mut value = serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
            .unwrap_or_else(|| serde_json::json!({}));

        if let Some(map) = value.as_object_mut() {
            map.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.to_string()),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_name() {
        let events = [
            StreamEvent::Chunk {
                chunk: "a".to_string(),
            },
            StreamEvent::Complete { content: None },
            StreamEvent::Cancelled {
                reason: "user".to_string(),
            },
            StreamEvent::FilesEdited { files: Vec::new() },
            StreamEvent::Commit {
                hash: "h".to_string(),
                message: "m".to_string(),
                diff: "d".to_string(),
            },
            StreamEvent::ReflectionInfo {
                message: "m".to_string(),
                index: 1,
            },
            StreamEvent::ReflectionLimit {
                message: "m".to_string(),
            },
            StreamEvent::RefreshFiles {
                mode: "ask".to_string(),
            },
            StreamEvent::Error {
                message: "e".to_string(),
            },
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name());
        }
    }

    #[test]
    fn payload_carries_session_id() {
        let event = StreamEvent::Commit {
            hash: "abc".to_string(),
            message: "fix".to_string(),
            diff: "+x".to_string(),
        };
        let payload = event.payload("s1");

        assert_eq!(payload["hash"], "abc");
        assert_eq!(payload["diff"], "+x");
        assert_eq!(payload["session_id"], "s1");
    }

    #[test]
    fn complete_without_text_has_only_session_id() {
        let payload = StreamEvent::Complete { content: None }.payload("s1");
        assert_eq!(payload, serde_json::json!({"session_id": "s1"}));
    }
}
