//! Per-rule polling bookmark, persisted across restarts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Key under which `oql.match` pollers remember the last observed count.
pub const OQL_COUNT_KEY: &str = "oqlCount";

/// Dedup fingerprints beyond this count are discarded oldest-map-order first.
/// The poll window is 20 items, so a few hundred covers any timestamp overlap.
const MAX_FINGERPRINTS: usize = 500;

/// Bookmark state for one rule's poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerState {
    pub id: Uuid,
    pub automation_id: Uuid,
    /// Never moves backwards across successful ticks.
    pub last_checked_at: DateTime<Utc>,
    /// Fingerprint dedup map plus trigger-specific memory.
    #[serde(default)]
    pub last_seen_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub checksum: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TriggerState {
    /// Fresh state for a rule's first poll.
    pub fn initial(automation_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            automation_id,
            last_checked_at: now,
            last_seen_data: BTreeMap::new(),
            checksum: None,
            updated_at: now,
        }
    }

    /// True if the fingerprint was already emitted.
    pub fn has_seen(&self, fingerprint: &str) -> bool {
        self.last_seen_data.contains_key(fingerprint)
    }

    /// Record an emitted fingerprint, pruning when the map grows too large.
    pub fn mark_seen(&mut self, fingerprint: String) {
        self.last_seen_data.insert(fingerprint, Value::Bool(true));
        let overflow = self
            .last_seen_data
            .iter()
            .filter(|(_, v)| v.is_boolean())
            .count()
            .saturating_sub(MAX_FINGERPRINTS);
        if overflow > 0 {
            let stale: Vec<String> = self
                .last_seen_data
                .iter()
                .filter(|(_, v)| v.is_boolean())
                .take(overflow)
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                self.last_seen_data.remove(&key);
            }
        }
    }

    /// Advance the bookmark; it never moves backwards.
    pub fn advance(&mut self, to: DateTime<Utc>) {
        if to > self.last_checked_at {
            self.last_checked_at = to;
        }
        self.updated_at = Utc::now();
    }

    /// Last observed `oql.match` count, if any.
    pub fn oql_count(&self) -> Option<i64> {
        self.last_seen_data.get(OQL_COUNT_KEY).and_then(Value::as_i64)
    }

    pub fn set_oql_count(&mut self, count: i64) {
        self.last_seen_data
            .insert(OQL_COUNT_KEY.to_string(), Value::from(count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_never_moves_backwards() {
        let mut state = TriggerState::initial(Uuid::new_v4());
        let first = state.last_checked_at;

        state.advance(first - chrono::Duration::seconds(60));
        assert_eq!(state.last_checked_at, first);

        let later = first + chrono::Duration::seconds(60);
        state.advance(later);
        assert_eq!(state.last_checked_at, later);
    }

    #[test]
    fn fingerprint_dedup() {
        let mut state = TriggerState::initial(Uuid::new_v4());
        assert!(!state.has_seen("abc"));
        state.mark_seen("abc".to_string());
        assert!(state.has_seen("abc"));
    }

    #[test]
    fn oql_count_survives_fingerprint_pruning() {
        let mut state = TriggerState::initial(Uuid::new_v4());
        state.set_oql_count(7);
        for i in 0..600 {
            state.mark_seen(format!("fp-{i:04}"));
        }
        assert_eq!(state.oql_count(), Some(7));
        let fingerprints = state
            .last_seen_data
            .values()
            .filter(|v| v.is_boolean())
            .count();
        assert!(fingerprints <= 500);
    }
}
