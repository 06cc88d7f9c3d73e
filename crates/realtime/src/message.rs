//! Realtime event envelope.
//!
//! The backend publishes JSON objects shaped like
//! `{"type": "<KIND>", "body": "...", ...}`. Only `type` is required;
//! any other fields are kept in [`RealtimeMessage::fields`].

use serde::{Deserialize, Serialize};

/// A decoded broker event. Consumed once by every callback on its topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    /// Dispatch discriminator, e.g. `"QUEUE_REFRESH"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable text, used for toasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Domain-specific extras (`title`, `metadata`, ...).
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RealtimeMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            body: None,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Decode a MESSAGE frame body.
    ///
    /// Returns `Err` for malformed JSON, non-object payloads and objects
    /// without a string `type`. Callers log and drop such messages.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}
