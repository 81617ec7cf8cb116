//! Upstream Onstaq REST client port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::item::{
    AttributeDef, Catalog, Comment, HistoryEntry, ImportSummary, Item, ListParams, QueryResult,
    Reference, User, WorkspaceMember,
};

/// Typed operations against the upstream item-management service.
///
/// The engine authenticates with its own service account; `validate_token`
/// round-trips a caller-supplied bearer token instead and is used by the
/// HTTP auth middleware.
#[async_trait]
pub trait OnstaqApi: Send + Sync {
    /// The service account's own identity.
    async fn get_me(&self) -> DomainResult<User>;

    /// Validate a caller token by forwarding it upstream. Nothing is cached.
    async fn validate_token(&self, token: &str) -> DomainResult<User>;

    async fn list_items(&self, catalog_id: &str, params: &ListParams) -> DomainResult<Vec<Item>>;

    async fn get_item(&self, item_id: &str) -> DomainResult<Item>;

    /// Find one item in a workspace by its human-readable key.
    async fn find_item_by_key(&self, workspace_id: &str, key: &str) -> DomainResult<Option<Item>>;

    async fn create_item(
        &self,
        catalog_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item>;

    async fn update_item(
        &self,
        item_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item>;

    async fn delete_item(&self, item_id: &str) -> DomainResult<()>;

    async fn import_items(
        &self,
        catalog_id: &str,
        rows: &[BTreeMap<String, Value>],
        key_column: Option<&str>,
    ) -> DomainResult<ImportSummary>;

    /// Outbound references from an item.
    async fn list_references(&self, item_id: &str) -> DomainResult<Vec<Reference>>;

    /// Inbound references pointing at an item.
    async fn list_back_references(&self, item_id: &str) -> DomainResult<Vec<Reference>>;

    async fn create_reference(
        &self,
        from_item_id: &str,
        to_item_id: &str,
        kind: &str,
        label: Option<&str>,
    ) -> DomainResult<Reference>;

    async fn delete_reference(&self, item_id: &str, reference_id: &str) -> DomainResult<()>;

    /// Audit history for an item, newest first.
    async fn list_history(&self, item_id: &str) -> DomainResult<Vec<HistoryEntry>>;

    async fn list_comments(&self, item_id: &str) -> DomainResult<Vec<Comment>>;

    async fn add_comment(&self, item_id: &str, body: &str) -> DomainResult<Comment>;

    async fn list_catalogs(&self, workspace_id: &str) -> DomainResult<Vec<Catalog>>;

    async fn get_catalog(&self, catalog_id: &str) -> DomainResult<Catalog>;

    async fn create_catalog(
        &self,
        workspace_id: &str,
        name: &str,
        options: &Value,
    ) -> DomainResult<Catalog>;

    async fn create_attribute(
        &self,
        catalog_id: &str,
        name: &str,
        attribute_type: &str,
        options: &Value,
    ) -> DomainResult<AttributeDef>;

    async fn add_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> DomainResult<WorkspaceMember>;

    /// Execute an ad-hoc OQL query in a workspace.
    async fn execute_query(&self, workspace_id: &str, query: &str) -> DomainResult<QueryResult>;
}
