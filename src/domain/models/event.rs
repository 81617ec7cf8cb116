//! Trigger events: one runtime record per firing of a rule's trigger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::models::item::{Item, QueryResult};

/// A single firing of a rule's trigger, fed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Wire name of the trigger kind, e.g. `item.created` or `manual`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    /// Attribute name -> prior value, for update-style events.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub previous_values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oql_results: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            item: None,
            previous_values: BTreeMap::new(),
            oql_results: None,
            webhook_payload: None,
            manual_parameters: None,
            schedule_time: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_previous_values(mut self, previous: BTreeMap<String, Value>) -> Self {
        self.previous_values = previous;
        self
    }

    /// A manual invocation, optionally resolved to an item.
    pub fn manual(item: Option<Item>, parameters: Option<Value>) -> Self {
        Self {
            item,
            manual_parameters: parameters,
            ..Self::new("manual")
        }
    }

    /// A cron firing at the scheduled instant.
    pub fn schedule(fired_at: DateTime<Utc>) -> Self {
        Self {
            schedule_time: Some(fired_at),
            ..Self::new("schedule")
        }
    }

    /// An inbound webhook delivery.
    pub fn webhook(payload: Value) -> Self {
        Self {
            webhook_payload: Some(payload),
            ..Self::new("webhook.received")
        }
    }

    /// An `oql.match` firing carrying the query result.
    pub fn oql_match(results: QueryResult) -> Self {
        Self {
            oql_results: Some(results),
            ..Self::new("oql.match")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manual_event_serializes_sparse() {
        let event = TriggerEvent::manual(None, Some(json!({"p": "yes"})));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!("manual"));
        assert_eq!(value["manualParameters"], json!({"p": "yes"}));
        assert!(value.get("item").is_none());
        assert!(value.get("previousValues").is_none());
    }

    #[test]
    fn event_round_trips() {
        let mut event = TriggerEvent::new("item.updated");
        event
            .previous_values
            .insert("Status".to_string(), json!("Open"));

        let json = serde_json::to_string(&event).unwrap();
        let back: TriggerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
