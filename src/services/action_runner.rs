//! Single-action execution.
//!
//! Each action deep-resolves its config through the template resolver, calls
//! the upstream API, and returns a compact result payload. State flows only
//! through context mutations: `variables`, `created_items`, `current_item`.

use std::collections::BTreeMap;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActionDef, ActionType, ExecutionContext, Item};
use crate::domain::ports::OnstaqApi;
use crate::services::template::TemplateResolver;

/// Recursive entry point for the `automation.trigger` action, implemented by
/// the executor. Chained runs share the parent's concurrency slot and are
/// bounded by chain depth.
#[async_trait]
pub trait ChainInvoker: Send + Sync {
    async fn trigger_chained(
        &self,
        automation_id: Uuid,
        parameters: Option<Value>,
        depth: u32,
    ) -> DomainResult<Uuid>;
}

/// Timeout for outbound `webhook.send` calls.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes a single action node against the upstream service.
pub struct ActionRunner {
    api: Arc<dyn OnstaqApi>,
    resolver: Arc<TemplateResolver>,
    webhook_client: reqwest::Client,
}

impl ActionRunner {
    pub fn new(api: Arc<dyn OnstaqApi>, resolver: Arc<TemplateResolver>) -> Self {
        let webhook_client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            api,
            resolver,
            webhook_client,
        }
    }

    /// Run one action, returning its result payload. Errors become the
    /// `failed` status of the surrounding component result.
    #[instrument(skip(self, action, ctx, chain), fields(action_type = action.action_type.as_str()))]
    pub async fn run(
        &self,
        action: &ActionDef,
        ctx: &mut ExecutionContext,
        chain: &dyn ChainInvoker,
    ) -> DomainResult<Value> {
        let config = self.resolver.resolve_value(&action.config, ctx).await?;

        match action.action_type {
            ActionType::ItemCreate => self.item_create(&config, ctx).await,
            ActionType::ItemUpdate => self.item_update(&config, ctx).await,
            ActionType::ItemDelete => self.item_delete(&config, ctx).await,
            ActionType::ItemClone => self.item_clone(&config, ctx).await,
            ActionType::ItemTransition => self.item_transition(&config, ctx).await,
            ActionType::ItemLookup => self.item_lookup(&config, ctx).await,
            ActionType::AttributeSet => self.attribute_set(&config, ctx).await,
            ActionType::ReferenceAdd => self.reference_add(&config, ctx).await,
            ActionType::ReferenceRemove => self.reference_remove(&config, ctx).await,
            ActionType::CommentAdd => self.comment_add(&config, ctx).await,
            ActionType::ItemImport => self.item_import(&config, ctx).await,
            ActionType::CatalogCreate => self.catalog_create(&config, ctx).await,
            ActionType::AttributeCreate => self.attribute_create(&config, ctx).await,
            ActionType::WorkspaceMemberAdd => self.workspace_member_add(&config, ctx).await,
            ActionType::OqlExecute => self.oql_execute(&config, ctx).await,
            ActionType::WebhookSend => self.webhook_send(&config).await,
            ActionType::AutomationTrigger => self.automation_trigger(&config, ctx, chain).await,
            ActionType::VariableSet => Self::variable_set(&config, ctx),
            ActionType::Log => Self::log_message(&config, ctx),
            ActionType::RefetchData => self.refetch_data(ctx).await,
        }
    }

    // --- item actions -----------------------------------------------------

    async fn item_create(&self, config: &Value, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let catalog_id = self.resolve_catalog_id(config, ctx).await?;
        let attributes = attributes_map(config, "attributes")?;
        let item = self.api.create_item(&catalog_id, &attributes).await?;
        let result = json!({ "itemId": item.id, "itemKey": item.key });
        ctx.record_created(item);
        Ok(result)
    }

    async fn item_update(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        let attributes = attributes_map(config, "attributes")?;
        let updated = self.api.update_item(&item.id, &attributes).await?;
        Ok(json!({ "itemId": updated.id, "itemKey": updated.key }))
    }

    async fn item_delete(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        self.api.delete_item(&item.id).await?;
        Ok(json!({ "deletedItemId": item.id }))
    }

    async fn item_clone(&self, config: &Value, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let source = self.resolve_target_item(config, ctx).await?;
        let catalog_id = match string_field(config, "targetCatalogId") {
            Some(id) => id,
            None => source.catalog_id.clone(),
        };

        let mut attributes = source.attribute_values.clone();
        if let Ok(overrides) = attributes_map(config, "overrides") {
            attributes.extend(overrides);
        }

        let clone = self.api.create_item(&catalog_id, &attributes).await?;
        let result = json!({
            "itemId": clone.id,
            "itemKey": clone.key,
            "sourceItemId": source.id,
        });
        ctx.record_created(clone);
        Ok(result)
    }

    async fn item_transition(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        let status = require_string(config, "status")?;

        let catalog = self.api.get_catalog(&item.catalog_id).await?;
        let attribute = catalog.status_attribute().ok_or_else(|| {
            DomainError::ExecutionFailed(format!(
                "catalog '{}' has no status attribute",
                catalog.name
            ))
        })?;

        let mut attributes = BTreeMap::new();
        attributes.insert(attribute.to_string(), Value::String(status.clone()));
        let updated = self.api.update_item(&item.id, &attributes).await?;
        Ok(json!({ "itemId": updated.id, "itemKey": updated.key, "status": status }))
    }

    async fn item_lookup(&self, config: &Value, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let query = require_string(config, "query")?;
        let workspace_id =
            string_field(config, "workspaceId").unwrap_or_else(|| ctx.workspace_id.clone());
        let store_as = require_string(config, "storeResultAs")?;

        let result = self.api.execute_query(&workspace_id, &query).await?;
        let total = result.total_count;
        ctx.variables.insert(
            store_as.clone(),
            serde_json::to_value(&result.rows).unwrap_or(Value::Null),
        );
        Ok(json!({ "totalCount": total, "storeResultAs": store_as }))
    }

    async fn attribute_set(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        let name = require_string(config, "attributeName")?;
        let value = config.get("value").cloned().unwrap_or(Value::Null);

        let mut attributes = BTreeMap::new();
        attributes.insert(name.clone(), value.clone());
        let updated = self.api.update_item(&item.id, &attributes).await?;
        Ok(json!({
            "itemId": updated.id,
            "itemKey": updated.key,
            "attributeName": name,
            "value": value,
        }))
    }

    async fn reference_add(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let from = self.resolve_target_item(config, ctx).await?;
        let to_item_id = require_string(config, "toItemId")?;
        let kind = string_field(config, "kind").unwrap_or_else(|| "LINK".to_string());
        let label = string_field(config, "label");

        let reference = self
            .api
            .create_reference(&from.id, &to_item_id, &kind, label.as_deref())
            .await?;
        Ok(json!({ "referenceId": reference.id }))
    }

    async fn reference_remove(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        let reference_id = require_string(config, "referenceId")?;
        self.api.delete_reference(&item.id, &reference_id).await?;
        Ok(json!({ "deletedReferenceId": reference_id }))
    }

    async fn comment_add(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let item = self.resolve_target_item(config, ctx).await?;
        let body = require_string(config, "body")?;
        let comment = self.api.add_comment(&item.id, &body).await?;
        Ok(json!({ "commentId": comment.id }))
    }

    async fn item_import(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let catalog_id = self.resolve_catalog_id(config, ctx).await?;
        let rows = config
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| DomainError::ValidationFailed("item.import requires rows".to_string()))?
            .iter()
            .map(value_to_map)
            .collect::<DomainResult<Vec<_>>>()?;
        let key_column = string_field(config, "keyColumn");

        let summary = self
            .api
            .import_items(&catalog_id, &rows, key_column.as_deref())
            .await?;
        Ok(json!({ "created": summary.created, "updated": summary.updated }))
    }

    // --- schema and workspace actions --------------------------------------

    async fn catalog_create(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let workspace_id =
            string_field(config, "workspaceId").unwrap_or_else(|| ctx.workspace_id.clone());
        let name = require_string(config, "name")?;
        let options = config.get("options").cloned().unwrap_or(Value::Null);

        let catalog = self
            .api
            .create_catalog(&workspace_id, &name, &options)
            .await?;
        Ok(json!({ "catalogId": catalog.id, "catalogName": catalog.name }))
    }

    async fn attribute_create(&self, config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let catalog_id = self.resolve_catalog_id(config, ctx).await?;
        let name = require_string(config, "name")?;
        let attribute_type = require_string(config, "attributeType")?;
        let options = config.get("options").cloned().unwrap_or(Value::Null);

        let attribute = self
            .api
            .create_attribute(&catalog_id, &name, &attribute_type, &options)
            .await?;
        Ok(json!({ "attributeId": attribute.id }))
    }

    async fn workspace_member_add(
        &self,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> DomainResult<Value> {
        let workspace_id =
            string_field(config, "workspaceId").unwrap_or_else(|| ctx.workspace_id.clone());
        let user_id = require_string(config, "userId")?;
        let role = string_field(config, "role").unwrap_or_else(|| "MEMBER".to_string());

        let member = self
            .api
            .add_workspace_member(&workspace_id, &user_id, &role)
            .await?;
        Ok(json!({ "memberId": member.id }))
    }

    // --- query, webhook, and control actions --------------------------------

    async fn oql_execute(&self, config: &Value, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let query = require_string(config, "query")?;
        let workspace_id =
            string_field(config, "workspaceId").unwrap_or_else(|| ctx.workspace_id.clone());

        let result = self.api.execute_query(&workspace_id, &query).await?;
        if let Some(store_as) = string_field(config, "storeResultAs") {
            ctx.variables.insert(
                store_as,
                serde_json::to_value(&result.rows).unwrap_or(Value::Null),
            );
        }
        Ok(json!({
            "totalCount": result.total_count,
            "executionTimeMs": result.execution_time_ms,
            "rows": result.rows,
        }))
    }

    async fn webhook_send(&self, config: &Value) -> DomainResult<Value> {
        let url = require_string(config, "url")?;
        let method = string_field(config, "method")
            .unwrap_or_else(|| "POST".to_string())
            .to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| DomainError::ValidationFailed(format!("invalid method '{method}'")))?;

        let mut request = self.webhook_client.request(method, &url);
        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                request = request.header(name, stringify_header(value));
            }
        }
        if let Some(body) = config.get("body") {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::UpstreamError(format!("webhook.send failed: {e}")))?;
        let status = response.status();
        Ok(json!({
            "status": status.as_u16(),
            "statusText": status.canonical_reason().unwrap_or(""),
        }))
    }

    async fn automation_trigger(
        &self,
        config: &Value,
        ctx: &ExecutionContext,
        chain: &dyn ChainInvoker,
    ) -> DomainResult<Value> {
        let rule_id = require_string(config, "ruleId")?;
        let rule_id = Uuid::parse_str(&rule_id)
            .map_err(|_| DomainError::ValidationFailed(format!("invalid ruleId '{rule_id}'")))?;
        let parameters = config.get("parameters").cloned();

        chain
            .trigger_chained(rule_id, parameters, ctx.chain_depth + 1)
            .await?;
        Ok(json!({ "triggeredAutomationId": rule_id }))
    }

    fn variable_set(config: &Value, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let name = require_string(config, "name")?;
        let value = config.get("value").cloned().unwrap_or(Value::Null);
        ctx.variables.insert(name.clone(), value.clone());
        Ok(json!({ "name": name, "value": value }))
    }

    fn log_message(config: &Value, ctx: &ExecutionContext) -> DomainResult<Value> {
        let message = require_string(config, "message")?;
        info!(automation = %ctx.automation_name, "{message}");
        Ok(json!({ "message": message }))
    }

    async fn refetch_data(&self, ctx: &mut ExecutionContext) -> DomainResult<Value> {
        let item_id = ctx
            .effective_item()
            .map(|item| item.id.clone())
            .ok_or_else(|| {
                DomainError::ExecutionFailed("refetch_data requires a current item".to_string())
            })?;
        let fresh = self.api.get_item(&item_id).await?;
        let result = json!({ "itemId": fresh.id, "itemKey": fresh.key });
        ctx.current_item = Some(fresh);
        Ok(result)
    }

    // --- addressing --------------------------------------------------------

    /// Resolve "the item" an action addresses: explicit `itemId`, then
    /// `itemKey`, then the triggered/current item (`useTriggeredItem`
    /// defaults true).
    async fn resolve_target_item(
        &self,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> DomainResult<Item> {
        if let Some(item_id) = string_field(config, "itemId") {
            return self.api.get_item(&item_id).await;
        }
        if let Some(key) = string_field(config, "itemKey") {
            return self
                .api
                .find_item_by_key(&ctx.workspace_id, &key)
                .await?
                .ok_or(DomainError::ItemNotFound(key));
        }
        let use_triggered = config
            .get("useTriggeredItem")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if use_triggered {
            return ctx.effective_item().cloned().ok_or_else(|| {
                DomainError::ExecutionFailed(
                    "action addresses the triggered item, but the event carries none".to_string(),
                )
            });
        }
        Err(DomainError::ValidationFailed(
            "action config must address an item via itemId, itemKey, or useTriggeredItem"
                .to_string(),
        ))
    }

    /// Resolve a catalog address: explicit `catalogId`, or `catalogName`
    /// matched case-insensitively within the rule's workspace.
    async fn resolve_catalog_id(
        &self,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> DomainResult<String> {
        if let Some(catalog_id) = string_field(config, "catalogId") {
            return Ok(catalog_id);
        }
        if let Some(name) = string_field(config, "catalogName") {
            let catalogs = self.api.list_catalogs(&ctx.workspace_id).await?;
            return catalogs
                .into_iter()
                .find(|c| c.name.eq_ignore_ascii_case(&name))
                .map(|c| c.id)
                .ok_or(DomainError::CatalogNotFound(name));
        }
        Err(DomainError::ValidationFailed(
            "action config must address a catalog via catalogId or catalogName".to_string(),
        ))
    }
}

// --- config helpers -------------------------------------------------------

fn string_field(config: &Value, key: &str) -> Option<String> {
    match config.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn require_string(config: &Value, key: &str) -> DomainResult<String> {
    string_field(config, key)
        .ok_or_else(|| DomainError::ValidationFailed(format!("action config requires '{key}'")))
}

fn attributes_map(config: &Value, key: &str) -> DomainResult<BTreeMap<String, Value>> {
    config
        .get(key)
        .map(value_to_map)
        .transpose()?
        .ok_or_else(|| DomainError::ValidationFailed(format!("action config requires '{key}'")))
}

fn value_to_map(value: &Value) -> DomainResult<BTreeMap<String, Value>> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        other => Err(DomainError::ValidationFailed(format!(
            "expected an object, found {other}"
        ))),
    }
}

fn stringify_header(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_field_skips_blank_values() {
        let config = json!({ "itemId": "  ", "itemKey": "TCK-1", "limit": 5 });
        assert_eq!(string_field(&config, "itemId"), None);
        assert_eq!(string_field(&config, "itemKey"), Some("TCK-1".to_string()));
        assert_eq!(string_field(&config, "limit"), Some("5".to_string()));
    }

    #[test]
    fn attributes_map_requires_object() {
        let config = json!({ "attributes": { "a": 1 }, "rows": [1] });
        assert!(attributes_map(&config, "attributes").is_ok());
        assert!(attributes_map(&config, "rows").is_err());
        assert!(attributes_map(&config, "missing").is_err());
    }
}
