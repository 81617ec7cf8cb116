//! Webhook subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A registered webhook endpoint with its shared secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    pub secret: String,
    #[serde(default = "WebhookSubscription::default_active")]
    pub active: bool,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    fn default_active() -> bool {
        true
    }

    /// Inbound path this subscription is bound to, from `metadata.path`.
    pub fn path(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("path"))
            .and_then(Value::as_str)
    }
}
