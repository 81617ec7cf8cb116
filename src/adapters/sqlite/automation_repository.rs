//! SQLite implementation of the AutomationRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Automation, Component, LegacyRuleBody, Trigger};
use crate::domain::ports::{AutomationFilter, AutomationRepository};

#[derive(Clone)]
pub struct SqliteAutomationRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AutomationRow {
    id: String,
    name: String,
    description: Option<String>,
    workspace_id: String,
    workspace_key: Option<String>,
    enabled: i32,
    trigger_json: String,
    components_json: String,
    execution_order: i64,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_automation(row: AutomationRow) -> DomainResult<Automation> {
    let id = parse_uuid(&row.id)?;
    let trigger: Trigger = serde_json::from_str(&row.trigger_json)
        .map_err(|e| DomainError::SerializationError(format!("trigger: {e}")))?;
    let components = parse_components(&row.components_json)?;

    Ok(Automation {
        id,
        name: row.name,
        description: row.description,
        workspace_id: row.workspace_id,
        workspace_key: row.workspace_key,
        enabled: row.enabled != 0,
        trigger,
        components,
        execution_order: row.execution_order,
        created_by: row.created_by,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

/// Accept either the unified component tree or the legacy
/// `{conditions, actions}` body; writes always re-serialize as components.
fn parse_components(json: &str) -> DomainResult<Vec<Component>> {
    if let Ok(components) = serde_json::from_str::<Vec<Component>>(json) {
        return Ok(components);
    }
    let legacy: LegacyRuleBody = serde_json::from_str(json)
        .map_err(|e| DomainError::SerializationError(format!("components: {e}")))?;
    Ok(legacy.into_components())
}

#[async_trait]
impl AutomationRepository for SqliteAutomationRepository {
    async fn create(&self, automation: &Automation) -> DomainResult<()> {
        let trigger_json = serde_json::to_string(&automation.trigger)?;
        let components_json = serde_json::to_string(&automation.components)?;

        sqlx::query(
            r#"INSERT INTO automations
               (id, name, description, workspace_id, workspace_key, enabled,
                trigger_json, components_json, execution_order, created_by,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(automation.id.to_string())
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(&automation.workspace_id)
        .bind(&automation.workspace_key)
        .bind(i32::from(automation.enabled))
        .bind(&trigger_json)
        .bind(&components_json)
        .bind(automation.execution_order)
        .bind(&automation.created_by)
        .bind(automation.created_at.to_rfc3339())
        .bind(automation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Automation>> {
        let row: Option<AutomationRow> =
            sqlx::query_as("SELECT * FROM automations WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_automation).transpose()
    }

    async fn update(&self, automation: &Automation) -> DomainResult<()> {
        let trigger_json = serde_json::to_string(&automation.trigger)?;
        let components_json = serde_json::to_string(&automation.components)?;

        let result = sqlx::query(
            r#"UPDATE automations SET
               name = ?, description = ?, workspace_id = ?, workspace_key = ?,
               enabled = ?, trigger_json = ?, components_json = ?,
               execution_order = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(&automation.workspace_id)
        .bind(&automation.workspace_key)
        .bind(i32::from(automation.enabled))
        .bind(&trigger_json)
        .bind(&components_json)
        .bind(automation.execution_order)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(automation.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AutomationNotFound(automation.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: AutomationFilter) -> DomainResult<Vec<Automation>> {
        let rows: Vec<AutomationRow> = match (&filter.workspace_id, filter.enabled) {
            (Some(workspace), Some(enabled)) => {
                sqlx::query_as(
                    "SELECT * FROM automations WHERE workspace_id = ? AND enabled = ?
                     ORDER BY execution_order, name",
                )
                .bind(workspace)
                .bind(i32::from(enabled))
                .fetch_all(&self.pool)
                .await?
            }
            (Some(workspace), None) => {
                sqlx::query_as(
                    "SELECT * FROM automations WHERE workspace_id = ?
                     ORDER BY execution_order, name",
                )
                .bind(workspace)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(enabled)) => {
                sqlx::query_as(
                    "SELECT * FROM automations WHERE enabled = ?
                     ORDER BY execution_order, name",
                )
                .bind(i32::from(enabled))
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM automations ORDER BY execution_order, name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(row_to_automation).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE automations SET enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(i32::from(enabled))
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AutomationNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{ActionDef, ActionType, ComponentType};
    use chrono::Utc;
    use serde_json::json;

    fn sample_rule() -> Automation {
        Automation {
            id: Uuid::new_v4(),
            name: "echo".to_string(),
            description: Some("comment on new tickets".to_string()),
            workspace_id: "ws-1".to_string(),
            workspace_key: None,
            enabled: true,
            trigger: Trigger::ItemCreated {
                catalog_id: Some("cat-1".to_string()),
            },
            components: vec![Component::action(
                "c1",
                ActionDef::new(ActionType::CommentAdd, json!({"body": "hi"})),
            )],
            execution_order: 0,
            created_by: Some("svc".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAutomationRepository::new(pool);

        let rule = sample_rule();
        repo.create(&rule).await.expect("create should succeed");

        let loaded = repo
            .get(rule.id)
            .await
            .expect("get should succeed")
            .expect("rule should exist");
        assert_eq!(loaded.name, rule.name);
        assert_eq!(loaded.trigger, rule.trigger);
        assert_eq!(loaded.components, rule.components);
    }

    #[tokio::test]
    async fn test_update_and_toggle() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAutomationRepository::new(pool);

        let mut rule = sample_rule();
        repo.create(&rule).await.unwrap();

        rule.name = "renamed".to_string();
        repo.update(&rule).await.unwrap();
        repo.set_enabled(rule.id, false).await.unwrap();

        let loaded = repo.get(rule.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "renamed");
        assert!(!loaded.enabled);
    }

    #[tokio::test]
    async fn test_update_missing_rule_errors() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAutomationRepository::new(pool);

        let rule = sample_rule();
        assert!(matches!(
            repo.update(&rule).await,
            Err(DomainError::AutomationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_enabled() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAutomationRepository::new(pool);

        let enabled = sample_rule();
        let mut disabled = sample_rule();
        disabled.enabled = false;
        repo.create(&enabled).await.unwrap();
        repo.create(&disabled).await.unwrap();

        let all = repo.list(AutomationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let live = repo
            .list(AutomationFilter {
                enabled: Some(true),
                ..AutomationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, enabled.id);
    }

    #[tokio::test]
    async fn test_legacy_body_is_migrated_at_read() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAutomationRepository::new(pool.clone());

        let id = Uuid::new_v4();
        let legacy = json!({
            "conditions": {"type": "template", "template": "{{trigger.item.id}}"},
            "actions": [{"type": "log", "config": {"message": "hello"}}]
        });
        sqlx::query(
            r#"INSERT INTO automations
               (id, name, workspace_id, enabled, trigger_json, components_json,
                execution_order, created_at, updated_at)
               VALUES (?, 'legacy', 'ws-1', 1, ?, ?, 0, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(json!({"type": "manual"}).to_string())
        .bind(legacy.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.components.len(), 2);
        assert_eq!(loaded.components[0].component_type, ComponentType::Condition);
        assert_eq!(loaded.components[1].component_type, ComponentType::Action);

        // A write rewrites the body as a component tree.
        repo.update(&loaded).await.unwrap();
        let row: (String,) =
            sqlx::query_as("SELECT components_json FROM automations WHERE id = ?")
                .bind(id.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(row.0.trim_start().starts_with('['));
    }
}
