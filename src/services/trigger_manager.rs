//! Trigger management: one live watcher per enabled rule.
//!
//! Polling triggers diff a remote list window against per-rule bookmarks
//! (`lastCheckedAt` plus a fingerprint dedup map), cron triggers sleep until
//! the next firing in their timezone, and push triggers (manual, webhook)
//! install nothing. All events funnel into a single [`TriggerSink`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::automation::parse_cron_schedule;
use crate::domain::models::{
    Automation, EngineConfig, HistoryAction, HistoryEntry, Item, ListParams, OqlTriggerOn,
    Trigger, TriggerEvent, TriggerState,
};
use crate::domain::ports::{OnstaqApi, TriggerStateRepository};

/// Poll window: newest-first, 20 items per tick.
const POLL_WINDOW: u32 = 20;

/// `lastSeenData` key holding the item-id map used by `item.deleted` polls.
const KNOWN_ITEMS_KEY: &str = "knownItems";

/// Receives trigger events; implemented by the executor.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    async fn dispatch(&self, automation: Automation, event: TriggerEvent) -> DomainResult<Uuid>;
}

/// Short hex digest of a canonical event string, used to suppress duplicate
/// firings across overlapping poll windows.
pub fn fingerprint(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..8])
}

struct Watcher {
    kind: &'static str,
    handle: JoinHandle<()>,
}

/// Installs and tears down watchers for enabled rules.
pub struct TriggerManager {
    api: Arc<dyn OnstaqApi>,
    state_repo: Arc<dyn TriggerStateRepository>,
    sink: Arc<dyn TriggerSink>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    watchers: Mutex<HashMap<Uuid, Watcher>>,
}

impl TriggerManager {
    pub fn new(
        api: Arc<dyn OnstaqApi>,
        state_repo: Arc<dyn TriggerStateRepository>,
        sink: Arc<dyn TriggerSink>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            state_repo,
            sink,
            poll_interval: Duration::from_millis(config.effective_poll_interval_ms()),
            running: Arc::new(AtomicBool::new(false)),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Install watchers for every enabled rule.
    pub async fn start_all(self: &Arc<Self>, automations: Vec<Automation>) {
        self.running.store(true, Ordering::SeqCst);
        futures::future::join_all(
            automations
                .into_iter()
                .map(|automation| self.start_one(automation)),
        )
        .await;
    }

    /// Install (or reinstall) the watcher for one rule. Disabled rules and
    /// push-driven triggers end up with none.
    #[instrument(skip(self, automation), fields(automation_id = %automation.id))]
    pub async fn start_one(self: &Arc<Self>, automation: Automation) {
        self.stop_one(automation.id).await;
        if !automation.enabled {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let id = automation.id;
        let watcher = match &automation.trigger {
            Trigger::Schedule { cron, timezone } => {
                let schedule = match parse_cron_schedule(cron) {
                    Ok(schedule) => schedule,
                    Err(e) => {
                        error!(automation = %automation.name, error = %e, "invalid cron expression; rule left without a watcher");
                        return;
                    }
                };
                let tz: chrono_tz::Tz = timezone
                    .as_deref()
                    .unwrap_or("UTC")
                    .parse()
                    .unwrap_or(chrono_tz::UTC);
                let manager = Arc::clone(self);
                Watcher {
                    kind: "cron",
                    handle: tokio::spawn(async move {
                        manager.cron_loop(automation, schedule, tz).await;
                    }),
                }
            }
            Trigger::Manual {} | Trigger::WebhookReceived { .. } => return,
            _ => {
                let manager = Arc::clone(self);
                Watcher {
                    kind: "poll",
                    handle: tokio::spawn(async move {
                        manager.poll_loop(automation).await;
                    }),
                }
            }
        };

        info!(automation_id = %id, kind = watcher.kind, "watcher installed");
        self.watchers.lock().await.insert(id, watcher);
    }

    /// Tear down the watcher for one rule. Idempotent.
    pub async fn stop_one(&self, automation_id: Uuid) {
        if let Some(watcher) = self.watchers.lock().await.remove(&automation_id) {
            watcher.handle.abort();
            debug!(%automation_id, kind = watcher.kind, "watcher stopped");
        }
    }

    /// Tear down everything and mark the manager not-running; subsequent
    /// tick callbacks exit immediately. Idempotent.
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut watchers = self.watchers.lock().await;
        for (_, watcher) in watchers.drain() {
            watcher.handle.abort();
        }
        info!("trigger manager stopped");
    }

    /// Stop and reinstall a rule's watcher from its current persisted form.
    pub async fn reload(self: &Arc<Self>, automation: Automation) {
        self.start_one(automation).await;
    }

    // --- cron -------------------------------------------------------------

    async fn cron_loop(
        self: Arc<Self>,
        automation: Automation,
        schedule: cron::Schedule,
        tz: chrono_tz::Tz,
    ) {
        loop {
            if !self.is_running() {
                return;
            }
            let now = Utc::now().with_timezone(&tz);
            let Some(next) = schedule.after(&now).next() else {
                warn!(automation = %automation.name, "cron schedule has no future firings");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            if !self.is_running() {
                return;
            }
            self.emit(automation.clone(), TriggerEvent::schedule(next.with_timezone(&Utc)));
        }
    }

    // --- polling ----------------------------------------------------------

    async fn poll_loop(self: Arc<Self>, automation: Automation) {
        // The initial poll runs immediately after install.
        loop {
            if !self.is_running() {
                return;
            }
            if let Err(e) = self.poll_tick(&automation).await {
                // The bookmark was not advanced; the next tick reprocesses
                // the same window.
                warn!(automation = %automation.name, error = %e, "poll tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One polling tick: load the bookmark, run the kind-specific poll, emit
    /// each match (persisting its fingerprint), then advance the bookmark.
    async fn poll_tick(&self, automation: &Automation) -> DomainResult<()> {
        if !self.is_running() {
            return Ok(());
        }

        let mut state = match self.state_repo.get(automation.id).await? {
            Some(state) => state,
            None => {
                let state = TriggerState::initial(automation.id);
                self.state_repo.upsert(&state).await?;
                state
            }
        };

        let now = Utc::now();
        let matches = self.collect(automation, &mut state).await?;

        for (fp, event) in matches {
            self.emit(automation.clone(), event);
            if let Some(fp) = fp {
                state.mark_seen(fp);
            }
            self.state_repo.upsert(&state).await?;
        }

        state.advance(now);
        self.state_repo.upsert(&state).await?;
        Ok(())
    }

    fn emit(&self, automation: Automation, event: TriggerEvent) {
        let sink = Arc::clone(&self.sink);
        let name = automation.name.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.dispatch(automation, event).await {
                warn!(automation = %name, error = %e, "trigger dispatch failed");
            }
        });
    }

    /// Kind-specific poll. Returns `(fingerprint, event)` pairs; events whose
    /// fingerprint was already seen are filtered out here.
    async fn collect(
        &self,
        automation: &Automation,
        state: &mut TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        match &automation.trigger {
            Trigger::ItemCreated { catalog_id } => {
                self.poll_created(automation, catalog_id.as_deref(), state).await
            }
            Trigger::ItemUpdated { catalog_id } => {
                self.poll_updated(automation, catalog_id.as_deref(), state).await
            }
            Trigger::ItemDeleted { catalog_id } => {
                self.poll_deleted(automation, catalog_id.as_deref(), state).await
            }
            Trigger::AttributeChanged {
                catalog_id,
                attribute_name,
            } => {
                self.poll_history_changes(
                    automation,
                    catalog_id.as_deref(),
                    state,
                    &ChangeFilter::Attribute(attribute_name.clone()),
                )
                .await
            }
            Trigger::StatusChanged {
                catalog_id,
                from,
                to,
            } => {
                self.poll_history_changes(
                    automation,
                    catalog_id.as_deref(),
                    state,
                    &ChangeFilter::Status {
                        from: from.clone(),
                        to: to.clone(),
                    },
                )
                .await
            }
            Trigger::ReferenceAdded {
                catalog_id,
                reference_kind,
            }
            | Trigger::ItemLinked {
                catalog_id,
                reference_kind,
            } => {
                self.poll_references(
                    automation,
                    catalog_id.as_deref(),
                    state,
                    HistoryAction::ReferenceAdded,
                    reference_kind.as_deref(),
                )
                .await
            }
            Trigger::ItemUnlinked {
                catalog_id,
                reference_kind,
            } => {
                self.poll_references(
                    automation,
                    catalog_id.as_deref(),
                    state,
                    HistoryAction::ReferenceRemoved,
                    reference_kind.as_deref(),
                )
                .await
            }
            Trigger::ItemCommented { catalog_id } => {
                self.poll_comments(automation, catalog_id.as_deref(), state).await
            }
            Trigger::OqlMatch { query, trigger_on } => {
                self.poll_oql(automation, query, *trigger_on, state).await
            }
            Trigger::Schedule { .. } | Trigger::Manual {} | Trigger::WebhookReceived { .. } => {
                Ok(Vec::new())
            }
        }
    }

    async fn catalog_ids(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
    ) -> DomainResult<Vec<String>> {
        match catalog_id {
            Some(id) => Ok(vec![id.to_string()]),
            None => Ok(self
                .api
                .list_catalogs(&automation.workspace_id)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect()),
        }
    }

    async fn poll_created(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let mut out = Vec::new();
        for catalog in self.catalog_ids(automation, catalog_id).await? {
            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("createdAt", POLL_WINDOW))
                .await?;
            for item in items {
                if item.created_at <= state.last_checked_at {
                    continue;
                }
                let fp = fingerprint(&format!("item.created:{}", item.id));
                if state.has_seen(&fp) {
                    continue;
                }
                out.push((
                    Some(fp),
                    TriggerEvent::new("item.created").with_item(item),
                ));
            }
        }
        Ok(out)
    }

    async fn poll_updated(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let mut out = Vec::new();
        for catalog in self.catalog_ids(automation, catalog_id).await? {
            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("updatedAt", POLL_WINDOW))
                .await?;
            for item in items {
                if item.updated_at <= state.last_checked_at || item.updated_at == item.created_at {
                    continue;
                }
                let fp = fingerprint(&format!(
                    "item.updated:{}:{}",
                    item.id,
                    item.updated_at.to_rfc3339()
                ));
                if state.has_seen(&fp) {
                    continue;
                }
                let previous = self.previous_values(&item.id).await?;
                out.push((
                    Some(fp),
                    TriggerEvent::new("item.updated")
                        .with_item(item)
                        .with_previous_values(previous),
                ));
            }
        }
        Ok(out)
    }

    /// Best-effort deletion detection: remember the ids from the previous
    /// window and probe the ones that vanished.
    async fn poll_deleted(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &mut TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let mut current: BTreeMap<String, Value> = BTreeMap::new();
        let mut catalogs_by_item: HashMap<String, String> = HashMap::new();
        for catalog in self.catalog_ids(automation, catalog_id).await? {
            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("createdAt", POLL_WINDOW))
                .await?;
            for item in items {
                current.insert(
                    item.id.clone(),
                    item.key.clone().map_or(Value::Null, Value::String),
                );
                catalogs_by_item.insert(item.id, catalog.clone());
            }
        }

        let known = state
            .last_seen_data
            .get(KNOWN_ITEMS_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::new();
        for (id, key) in &known {
            if current.contains_key(id) {
                continue;
            }
            match self.api.get_item(id).await {
                Ok(_) => continue, // fell out of the window, still exists
                Err(DomainError::ItemNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            let fp = fingerprint(&format!("item.deleted:{id}"));
            if state.has_seen(&fp) {
                continue;
            }
            let ghost = Item {
                id: id.clone(),
                key: key.as_str().map(str::to_string),
                catalog_id: catalogs_by_item.get(id).cloned().unwrap_or_default(),
                workspace_id: automation.workspace_id.clone(),
                attribute_values: BTreeMap::new(),
                created_by: None,
                updated_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            out.push((Some(fp), TriggerEvent::new("item.deleted").with_item(ghost)));
        }

        state.last_seen_data.insert(
            KNOWN_ITEMS_KEY.to_string(),
            Value::Object(current.into_iter().collect()),
        );
        Ok(out)
    }

    /// Shared poll for `attribute.changed` and `status.changed`: scan the
    /// recently-updated window and inspect UPDATED history entries since the
    /// bookmark.
    async fn poll_history_changes(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &TriggerState,
        filter: &ChangeFilter,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let kind = automation.trigger.kind();
        let mut out = Vec::new();

        for catalog in self.catalog_ids(automation, catalog_id).await? {
            // status.changed needs the catalog's STATUS-typed attribute name
            // alongside the distinguished @status history field.
            let status_attribute = match filter {
                ChangeFilter::Status { .. } => self
                    .api
                    .get_catalog(&catalog)
                    .await?
                    .status_attribute()
                    .map(str::to_string),
                ChangeFilter::Attribute(_) => None,
            };

            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("updatedAt", POLL_WINDOW))
                .await?;
            for item in items {
                if item.updated_at <= state.last_checked_at {
                    continue;
                }
                let history = self.api.list_history(&item.id).await?;
                for entry in history
                    .iter()
                    .filter(|e| e.action == HistoryAction::Updated)
                    .filter(|e| e.created_at > state.last_checked_at)
                {
                    if filter
                        .matching_change(entry, status_attribute.as_deref())
                        .is_none()
                    {
                        continue;
                    }
                    let fp = fingerprint(&format!("{kind}:{}:{}", item.id, entry.id));
                    if state.has_seen(&fp) {
                        continue;
                    }
                    let previous = entry
                        .changes
                        .iter()
                        .map(|(field, change)| {
                            (field.clone(), change.from.clone().unwrap_or(Value::Null))
                        })
                        .collect();
                    out.push((
                        Some(fp),
                        TriggerEvent::new(kind)
                            .with_item(item.clone())
                            .with_previous_values(previous),
                    ));
                }
            }
        }
        Ok(out)
    }

    async fn poll_references(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &TriggerState,
        action: HistoryAction,
        reference_kind: Option<&str>,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let kind = automation.trigger.kind();
        let mut out = Vec::new();

        for catalog in self.catalog_ids(automation, catalog_id).await? {
            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("updatedAt", POLL_WINDOW))
                .await?;
            for item in items {
                let history = self.api.list_history(&item.id).await?;
                for entry in history
                    .iter()
                    .filter(|e| e.action == action)
                    .filter(|e| e.created_at > state.last_checked_at)
                {
                    if let Some(wanted) = reference_kind {
                        let matches = entry
                            .reference_kind()
                            .is_some_and(|k| k.eq_ignore_ascii_case(wanted));
                        if !matches {
                            continue;
                        }
                    }
                    let marker = if entry.id.is_empty() {
                        entry.created_at.to_rfc3339()
                    } else {
                        entry.id.clone()
                    };
                    let fp = fingerprint(&format!("{kind}:{}:{marker}", item.id));
                    if state.has_seen(&fp) {
                        continue;
                    }
                    out.push((Some(fp), TriggerEvent::new(kind).with_item(item.clone())));
                }
            }
        }
        Ok(out)
    }

    async fn poll_comments(
        &self,
        automation: &Automation,
        catalog_id: Option<&str>,
        state: &TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let mut out = Vec::new();
        for catalog in self.catalog_ids(automation, catalog_id).await? {
            let items = self
                .api
                .list_items(&catalog, &ListParams::poll_window("updatedAt", POLL_WINDOW))
                .await?;
            for item in items {
                let comments = self.api.list_comments(&item.id).await?;
                for comment in comments
                    .iter()
                    .filter(|c| c.created_at > state.last_checked_at)
                {
                    let fp = fingerprint(&format!("item.commented:{}:{}", item.id, comment.id));
                    if state.has_seen(&fp) {
                        continue;
                    }
                    out.push((
                        Some(fp),
                        TriggerEvent::new("item.commented").with_item(item.clone()),
                    ));
                }
            }
        }
        Ok(out)
    }

    async fn poll_oql(
        &self,
        automation: &Automation,
        query: &str,
        trigger_on: OqlTriggerOn,
        state: &mut TriggerState,
    ) -> DomainResult<Vec<(Option<String>, TriggerEvent)>> {
        let result = self
            .api
            .execute_query(&automation.workspace_id, query)
            .await?;
        let total = result.total_count;
        let fire = oql_should_fire(trigger_on, total, state.oql_count());
        state.set_oql_count(total);

        if fire {
            Ok(vec![(None, TriggerEvent::oql_match(result))])
        } else {
            Ok(Vec::new())
        }
    }

    /// previousValues: the most recent UPDATED history entry's change map.
    async fn previous_values(&self, item_id: &str) -> DomainResult<BTreeMap<String, Value>> {
        let history = self.api.list_history(item_id).await?;
        Ok(history
            .iter()
            .find(|e| e.action == HistoryAction::Updated)
            .map(|entry| {
                entry
                    .changes
                    .iter()
                    .map(|(field, change)| {
                        (field.clone(), change.from.clone().unwrap_or(Value::Null))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// What `poll_history_changes` is looking for inside an UPDATED entry.
enum ChangeFilter {
    Attribute(String),
    Status {
        from: Option<String>,
        to: Option<String>,
    },
}

impl ChangeFilter {
    /// The matching change in the entry, if any.
    fn matching_change<'a>(
        &self,
        entry: &'a HistoryEntry,
        status_attribute: Option<&str>,
    ) -> Option<&'a crate::domain::models::FieldChange> {
        match self {
            Self::Attribute(name) => entry.changes.get(name),
            Self::Status { from, to } => {
                let change = entry.changes.get("@status").or_else(|| {
                    status_attribute.and_then(|attr| entry.changes.get(attr))
                })?;
                let matches_side = |filter: &Option<String>, side: &Option<Value>| {
                    filter.as_deref().is_none_or(|wanted| {
                        side.as_ref()
                            .and_then(Value::as_str)
                            .is_some_and(|actual| actual.eq_ignore_ascii_case(wanted))
                    })
                };
                if matches_side(from, &change.from) && matches_side(to, &change.to) {
                    Some(change)
                } else {
                    None
                }
            }
        }
    }
}

/// `oql.match` firing policy. The first observation primes state without
/// firing for `new_results` and `count_change`.
fn oql_should_fire(policy: OqlTriggerOn, total: i64, previous: Option<i64>) -> bool {
    match policy {
        OqlTriggerOn::AnyResults => total > 0,
        OqlTriggerOn::NewResults => previous.is_some_and(|prev| total > prev),
        OqlTriggerOn::CountChange => previous.is_some_and(|prev| total != prev),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn fingerprints_are_stable_short_hex() {
        let a = fingerprint("item.created:itm-1");
        let b = fingerprint("item.created:itm-1");
        let c = fingerprint("item.created:itm-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn oql_policy_first_observation_primes_without_firing() {
        assert!(!oql_should_fire(OqlTriggerOn::NewResults, 5, None));
        assert!(!oql_should_fire(OqlTriggerOn::CountChange, 5, None));
        assert!(oql_should_fire(OqlTriggerOn::AnyResults, 5, None));
        assert!(!oql_should_fire(OqlTriggerOn::AnyResults, 0, None));
    }

    #[test]
    fn oql_policy_compares_against_previous_count() {
        assert!(oql_should_fire(OqlTriggerOn::NewResults, 6, Some(5)));
        assert!(!oql_should_fire(OqlTriggerOn::NewResults, 5, Some(5)));
        assert!(!oql_should_fire(OqlTriggerOn::NewResults, 4, Some(5)));

        assert!(oql_should_fire(OqlTriggerOn::CountChange, 4, Some(5)));
        assert!(oql_should_fire(OqlTriggerOn::CountChange, 6, Some(5)));
        assert!(!oql_should_fire(OqlTriggerOn::CountChange, 5, Some(5)));
    }

    fn entry(changes: &[(&str, Value, Value)]) -> HistoryEntry {
        HistoryEntry {
            id: "h1".to_string(),
            item_id: "itm-1".to_string(),
            action: HistoryAction::Updated,
            changes: changes
                .iter()
                .map(|(field, from, to)| {
                    (
                        (*field).to_string(),
                        crate::domain::models::FieldChange {
                            from: Some(from.clone()),
                            to: Some(to.clone()),
                        },
                    )
                })
                .collect(),
            details: None,
            created_by: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn status_filter_is_case_insensitive_and_requires_both_sides() {
        let filter = ChangeFilter::Status {
            from: Some("Open".to_string()),
            to: Some("Done".to_string()),
        };

        let matched = entry(&[("@status", json!("open"), json!("DONE"))]);
        assert!(filter.matching_change(&matched, None).is_some());

        // InProgress -> Done does not match from="Open".
        let wrong_from = entry(&[("@status", json!("InProgress"), json!("Done"))]);
        assert!(filter.matching_change(&wrong_from, None).is_none());

        // A STATUS-typed attribute works when @status is absent.
        let via_attribute = entry(&[("Stage", json!("Open"), json!("Done"))]);
        assert!(filter.matching_change(&via_attribute, Some("Stage")).is_some());
        assert!(filter.matching_change(&via_attribute, None).is_none());
    }

    #[test]
    fn attribute_filter_matches_named_field_only() {
        let filter = ChangeFilter::Attribute("Priority".to_string());
        let matched = entry(&[("Priority", json!("Low"), json!("High"))]);
        let unmatched = entry(&[("Status", json!("Open"), json!("Done"))]);
        assert!(filter.matching_change(&matched, None).is_some());
        assert!(filter.matching_change(&unmatched, None).is_none());
    }
}
