//! Route handlers: rule CRUD, manual execution, dry-run, and history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::domain::models::{
    ActionDef, Automation, Component, Condition, LegacyRuleBody, Trigger,
};
use crate::domain::ports::{AutomationFilter, ExecutionFilter};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create/update payload. Accepts either the unified `components` tree or
/// the legacy `(conditions, actions)` pair; the legacy shape is migrated to
/// components before persisting.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workspace_id: String,
    #[serde(default)]
    pub workspace_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub conditions: Option<Condition>,
    #[serde(default)]
    pub actions: Option<Vec<ActionDef>>,
    #[serde(default)]
    pub execution_order: i64,
}

fn default_enabled() -> bool {
    true
}

impl AutomationPayload {
    fn into_components(self) -> (Self, Vec<Component>) {
        let components = match self.components.clone() {
            Some(components) => components,
            None => LegacyRuleBody {
                conditions: self.conditions.clone(),
                actions: self.actions.clone().unwrap_or_default(),
            }
            .into_components(),
        };
        (self, components)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationListQuery {
    pub workspace_id: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn list_automations(
    State(state): State<AppState>,
    Query(query): Query<AutomationListQuery>,
) -> Result<Json<Vec<Automation>>, ApiError> {
    let automations = state
        .automation_repo
        .list(AutomationFilter {
            workspace_id: query.workspace_id,
            enabled: query.enabled,
        })
        .await?;
    Ok(Json(automations))
}

pub async fn get_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Automation>, ApiError> {
    let automation = state
        .automation_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("automation {id}")))?;
    Ok(Json(automation))
}

pub async fn create_automation(
    State(state): State<AppState>,
    Json(payload): Json<AutomationPayload>,
) -> Result<(StatusCode, Json<Automation>), ApiError> {
    let (payload, components) = payload.into_components();
    let now = Utc::now();
    let automation = Automation {
        id: Uuid::new_v4(),
        name: payload.name,
        description: payload.description,
        workspace_id: payload.workspace_id,
        workspace_key: payload.workspace_key,
        enabled: payload.enabled,
        trigger: payload.trigger,
        components,
        execution_order: payload.execution_order,
        created_by: None,
        created_at: now,
        updated_at: now,
    };

    automation.validate()?;
    state.automation_repo.create(&automation).await?;
    state.trigger_manager.start_one(automation.clone()).await;
    Ok((StatusCode::CREATED, Json(automation)))
}

pub async fn update_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AutomationPayload>,
) -> Result<Json<Automation>, ApiError> {
    let existing = state
        .automation_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("automation {id}")))?;

    let (payload, components) = payload.into_components();
    let automation = Automation {
        id,
        name: payload.name,
        description: payload.description,
        workspace_id: payload.workspace_id,
        workspace_key: payload.workspace_key,
        enabled: payload.enabled,
        trigger: payload.trigger,
        components,
        execution_order: payload.execution_order,
        created_by: existing.created_by,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };

    automation.validate()?;
    state.automation_repo.update(&automation).await?;
    // An update invalidates the live watcher and reinstalls it.
    state.trigger_manager.reload(automation.clone()).await;
    Ok(Json(automation))
}

pub async fn delete_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.trigger_manager.stop_one(id).await;
    state.trigger_state_repo.delete(id).await?;
    state.automation_repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub parameters: Option<Value>,
}

pub async fn execute_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ExecuteRequest>>,
) -> Result<Json<Value>, ApiError> {
    let parameters = payload.and_then(|Json(body)| body.parameters);
    let execution_id = state.executor.trigger_manually(id, parameters).await?;
    Ok(Json(json!({ "executionId": execution_id })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    #[serde(default)]
    pub mock_trigger_data: Option<Value>,
}

pub async fn test_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<TestRequest>>,
) -> Result<Json<Value>, ApiError> {
    let mock = payload.and_then(|Json(body)| body.mock_trigger_data);
    let outline = state.executor.test(id, mock).await?;
    Ok(Json(serde_json::to_value(outline).unwrap_or_default()))
}

pub async fn enable_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.automation_repo.set_enabled(id, true).await?;
    if let Some(automation) = state.automation_repo.get(id).await? {
        state.trigger_manager.start_one(automation).await;
    }
    Ok(Json(json!({ "id": id, "enabled": true })))
}

pub async fn disable_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.automation_repo.set_enabled(id, false).await?;
    state.trigger_manager.stop_one(id).await;
    Ok(Json(json!({ "id": id, "enabled": false })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionListQuery {
    pub automation_id: Option<Uuid>,
    pub limit: Option<u32>,
}

pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<Value>, ApiError> {
    let executions = state
        .execution_repo
        .list(ExecutionFilter {
            automation_id: query.automation_id,
            limit: query.limit,
        })
        .await?;
    Ok(Json(serde_json::to_value(executions).unwrap_or_default()))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let execution = state
        .execution_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("execution {id}")))?;
    Ok(Json(serde_json::to_value(execution).unwrap_or_default()))
}

pub async fn execution_stats(
    State(state): State<AppState>,
    Path(automation_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.execution_repo.stats(automation_id).await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}
