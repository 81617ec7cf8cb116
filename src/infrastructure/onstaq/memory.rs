//! In-memory implementation of the upstream API.
//!
//! Backs service tests and local dry runs without a live Onstaq instance.
//! Mutations append history entries the same way the real service does, so
//! pollers and `previousValues` derivation behave identically.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AttributeDef, AttributeType, Catalog, Comment, FieldChange, HistoryAction, HistoryEntry,
    ImportSummary, Item, ListParams, QueryResult, Reference, SortOrder, User, WorkspaceMember,
};
use crate::domain::ports::OnstaqApi;

#[derive(Default)]
struct State {
    items: HashMap<String, Item>,
    catalogs: HashMap<String, Catalog>,
    references: Vec<Reference>,
    comments: HashMap<String, Vec<Comment>>,
    history: HashMap<String, Vec<HistoryEntry>>,
    members: Vec<WorkspaceMember>,
    /// Canned results keyed by exact query string.
    query_results: HashMap<String, QueryResult>,
    /// Tokens accepted by `validate_token`.
    tokens: HashMap<String, User>,
}

/// An in-memory Onstaq workspace.
#[derive(Default)]
pub struct InMemoryOnstaq {
    state: Mutex<State>,
    sequence: AtomicU64,
}

impl InMemoryOnstaq {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }

    pub async fn seed_catalog(&self, workspace_id: &str, name: &str) -> Catalog {
        let catalog = Catalog {
            id: self.next("cat"),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            attributes: Vec::new(),
        };
        self.state
            .lock()
            .await
            .catalogs
            .insert(catalog.id.clone(), catalog.clone());
        catalog
    }

    pub async fn seed_status_attribute(&self, catalog_id: &str, name: &str) {
        let mut state = self.state.lock().await;
        if let Some(catalog) = state.catalogs.get_mut(catalog_id) {
            catalog.attributes.push(AttributeDef {
                id: format!("attr-{name}"),
                name: name.to_string(),
                attribute_type: AttributeType::Status,
                options: None,
            });
        }
    }

    pub async fn seed_item(
        &self,
        catalog_id: &str,
        workspace_id: &str,
        attributes: BTreeMap<String, Value>,
    ) -> Item {
        let now = Utc::now();
        let id = self.next("itm");
        let item = Item {
            key: Some(id.to_uppercase()),
            id,
            catalog_id: catalog_id.to_string(),
            workspace_id: workspace_id.to_string(),
            attribute_values: attributes,
            created_by: Some("seed".to_string()),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .items
            .insert(item.id.clone(), item.clone());
        item
    }

    pub async fn seed_query_result(&self, query: &str, result: QueryResult) {
        self.state
            .lock()
            .await
            .query_results
            .insert(query.to_string(), result);
    }

    pub async fn seed_token(&self, token: &str, user: User) {
        self.state
            .lock()
            .await
            .tokens
            .insert(token.to_string(), user);
    }

    pub async fn comments_for(&self, item_id: &str) -> Vec<Comment> {
        self.state
            .lock()
            .await
            .comments
            .get(item_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn item(&self, item_id: &str) -> Option<Item> {
        self.state.lock().await.items.get(item_id).cloned()
    }

    fn push_history(
        state: &mut State,
        item_id: &str,
        action: HistoryAction,
        changes: BTreeMap<String, FieldChange>,
        details: Option<Value>,
        sequence_id: String,
    ) {
        let entry = HistoryEntry {
            id: sequence_id,
            item_id: item_id.to_string(),
            action,
            changes,
            details,
            created_by: Some("service".to_string()),
            created_at: Utc::now(),
        };
        // Newest first, matching the REST surface.
        state.history.entry(item_id.to_string()).or_default().insert(0, entry);
    }
}

#[async_trait]
impl OnstaqApi for InMemoryOnstaq {
    async fn get_me(&self) -> DomainResult<User> {
        Ok(User {
            id: "svc".to_string(),
            email: "service@onstaq.test".to_string(),
            name: Some("Automation Service".to_string()),
        })
    }

    async fn validate_token(&self, token: &str) -> DomainResult<User> {
        self.state
            .lock()
            .await
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| DomainError::UpstreamAuthFailed("invalid token".to_string()))
    }

    async fn list_items(&self, catalog_id: &str, params: &ListParams) -> DomainResult<Vec<Item>> {
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|item| item.catalog_id == catalog_id)
            .cloned()
            .collect();

        let descending = matches!(params.sort_order, Some(SortOrder::Desc) | None);
        match params.sort_by.as_deref() {
            Some("updatedAt") => items.sort_by_key(|i| i.updated_at),
            _ => items.sort_by_key(|i| i.created_at),
        }
        if descending {
            items.reverse();
        }

        if let Some(limit) = params.limit {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    async fn get_item(&self, item_id: &str) -> DomainResult<Item> {
        self.state
            .lock()
            .await
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| DomainError::ItemNotFound(item_id.to_string()))
    }

    async fn find_item_by_key(&self, workspace_id: &str, key: &str) -> DomainResult<Option<Item>> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .values()
            .find(|item| {
                item.workspace_id == workspace_id && item.key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn create_item(
        &self,
        catalog_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        let id = self.next("itm");
        let history_id = self.next("hist");
        let mut state = self.state.lock().await;
        let workspace_id = state
            .catalogs
            .get(catalog_id)
            .map(|c| c.workspace_id.clone())
            .unwrap_or_else(|| "ws-1".to_string());

        let now = Utc::now();
        let item = Item {
            key: Some(id.to_uppercase()),
            id,
            catalog_id: catalog_id.to_string(),
            workspace_id,
            attribute_values: attributes.clone(),
            created_by: Some("service".to_string()),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(item.id.clone(), item.clone());
        Self::push_history(
            &mut state,
            &item.id,
            HistoryAction::Created,
            BTreeMap::new(),
            None,
            history_id,
        );
        Ok(item)
    }

    async fn update_item(
        &self,
        item_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        let history_id = self.next("hist");
        let mut state = self.state.lock().await;
        let Some(existing) = state.items.get(item_id).cloned() else {
            return Err(DomainError::ItemNotFound(item_id.to_string()));
        };

        let mut changes = BTreeMap::new();
        let mut updated = existing;
        for (field, value) in attributes {
            let prior = updated.attribute_values.get(field).cloned();
            if prior.as_ref() != Some(value) {
                changes.insert(
                    field.clone(),
                    FieldChange {
                        from: prior,
                        to: Some(value.clone()),
                    },
                );
            }
            updated.attribute_values.insert(field.clone(), value.clone());
        }
        updated.updated_at = Utc::now();
        updated.updated_by = Some("service".to_string());
        state.items.insert(updated.id.clone(), updated.clone());

        if !changes.is_empty() {
            Self::push_history(
                &mut state,
                item_id,
                HistoryAction::Updated,
                changes,
                None,
                history_id,
            );
        }
        Ok(updated)
    }

    async fn delete_item(&self, item_id: &str) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state
            .items
            .remove(item_id)
            .ok_or_else(|| DomainError::ItemNotFound(item_id.to_string()))?;
        state.references.retain(|r| {
            r.from_item_id != item_id && r.to_item_id != item_id
        });
        Ok(())
    }

    async fn import_items(
        &self,
        catalog_id: &str,
        rows: &[BTreeMap<String, Value>],
        key_column: Option<&str>,
    ) -> DomainResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        for row in rows {
            let mut existing_id = None;
            if let Some(column) = key_column {
                if let Some(wanted) = row.get(column) {
                    existing_id = self
                        .state
                        .lock()
                        .await
                        .items
                        .values()
                        .find(|item| item.attribute_values.get(column) == Some(wanted))
                        .map(|item| item.id.clone());
                }
            }
            match existing_id {
                Some(id) => {
                    self.update_item(&id, row).await?;
                    summary.updated += 1;
                }
                None => {
                    self.create_item(catalog_id, row).await?;
                    summary.created += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn list_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        Ok(self
            .state
            .lock()
            .await
            .references
            .iter()
            .filter(|r| r.from_item_id == item_id)
            .cloned()
            .collect())
    }

    async fn list_back_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        Ok(self
            .state
            .lock()
            .await
            .references
            .iter()
            .filter(|r| r.to_item_id == item_id)
            .cloned()
            .collect())
    }

    async fn create_reference(
        &self,
        from_item_id: &str,
        to_item_id: &str,
        kind: &str,
        label: Option<&str>,
    ) -> DomainResult<Reference> {
        let id = self.next("ref");
        let history_id = self.next("hist");
        let reference = Reference {
            id,
            from_item_id: from_item_id.to_string(),
            to_item_id: to_item_id.to_string(),
            kind: kind.to_string(),
            label: label.map(str::to_string),
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().await;
        state.references.push(reference.clone());
        Self::push_history(
            &mut state,
            from_item_id,
            HistoryAction::ReferenceAdded,
            BTreeMap::new(),
            Some(serde_json::json!({
                "referenceId": reference.id,
                "referenceKind": reference.kind,
            })),
            history_id,
        );
        Ok(reference)
    }

    async fn delete_reference(&self, item_id: &str, reference_id: &str) -> DomainResult<()> {
        let history_id = self.next("hist");
        let mut state = self.state.lock().await;
        let before = state.references.len();
        let kind = state
            .references
            .iter()
            .find(|r| r.id == reference_id)
            .map(|r| r.kind.clone());
        state.references.retain(|r| r.id != reference_id);
        if state.references.len() == before {
            return Err(DomainError::ItemNotFound(reference_id.to_string()));
        }
        Self::push_history(
            &mut state,
            item_id,
            HistoryAction::ReferenceRemoved,
            BTreeMap::new(),
            Some(serde_json::json!({
                "referenceId": reference_id,
                "referenceKind": kind,
            })),
            history_id,
        );
        Ok(())
    }

    async fn list_history(&self, item_id: &str) -> DomainResult<Vec<HistoryEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .history
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_comments(&self, item_id: &str) -> DomainResult<Vec<Comment>> {
        Ok(self
            .state
            .lock()
            .await
            .comments
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_comment(&self, item_id: &str, body: &str) -> DomainResult<Comment> {
        let comment = Comment {
            id: self.next("cmt"),
            item_id: item_id.to_string(),
            body: body.to_string(),
            created_by: Some("service".to_string()),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .comments
            .entry(item_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn list_catalogs(&self, workspace_id: &str) -> DomainResult<Vec<Catalog>> {
        Ok(self
            .state
            .lock()
            .await
            .catalogs
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_catalog(&self, catalog_id: &str) -> DomainResult<Catalog> {
        self.state
            .lock()
            .await
            .catalogs
            .get(catalog_id)
            .cloned()
            .ok_or_else(|| DomainError::CatalogNotFound(catalog_id.to_string()))
    }

    async fn create_catalog(
        &self,
        workspace_id: &str,
        name: &str,
        _options: &Value,
    ) -> DomainResult<Catalog> {
        Ok(self.seed_catalog(workspace_id, name).await)
    }

    async fn create_attribute(
        &self,
        catalog_id: &str,
        name: &str,
        attribute_type: &str,
        options: &Value,
    ) -> DomainResult<AttributeDef> {
        let attribute = AttributeDef {
            id: self.next("attr"),
            name: name.to_string(),
            attribute_type: serde_json::from_value(Value::String(attribute_type.to_string()))
                .unwrap_or(AttributeType::Other),
            options: Some(options.clone()),
        };
        let mut state = self.state.lock().await;
        let catalog = state
            .catalogs
            .get_mut(catalog_id)
            .ok_or_else(|| DomainError::CatalogNotFound(catalog_id.to_string()))?;
        catalog.attributes.push(attribute.clone());
        Ok(attribute)
    }

    async fn add_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> DomainResult<WorkspaceMember> {
        let member = WorkspaceMember {
            id: self.next("mem"),
            workspace_id: workspace_id.to_string(),
            user_id: user_id.to_string(),
            role: role.to_string(),
        };
        self.state.lock().await.members.push(member.clone());
        Ok(member)
    }

    async fn execute_query(&self, _workspace_id: &str, query: &str) -> DomainResult<QueryResult> {
        Ok(self
            .state
            .lock()
            .await
            .query_results
            .get(query)
            .cloned()
            .unwrap_or(QueryResult {
                total_count: 0,
                rows: Vec::new(),
                execution_time_ms: Some(1),
            }))
    }
}
