//! SQLite implementation of the ExecutionRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::execution::{ComponentResult, ExecutionStats};
use crate::domain::models::{Execution, ExecutionStatus, TriggerEvent};
use crate::domain::ports::{ExecutionFilter, ExecutionRepository};

const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    automation_id: String,
    status: String,
    trigger_data: String,
    component_results: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
}

fn row_to_execution(row: ExecutionRow) -> DomainResult<Execution> {
    let status = ExecutionStatus::from_str(&row.status)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown status '{}'", row.status)))?;
    let trigger_data: TriggerEvent = serde_json::from_str(&row.trigger_data)
        .map_err(|e| DomainError::SerializationError(format!("trigger data: {e}")))?;
    let component_results: Vec<ComponentResult> = row
        .component_results
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| DomainError::SerializationError(format!("component results: {e}")))?
        .unwrap_or_default();

    Ok(Execution {
        id: parse_uuid(&row.id)?,
        automation_id: parse_uuid(&row.automation_id)?,
        status,
        trigger_data,
        component_results,
        error: row.error,
        started_at: parse_datetime(&row.started_at)?,
        completed_at: parse_optional_datetime(row.completed_at)?,
        duration_ms: row.duration_ms,
    })
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &Execution) -> DomainResult<()> {
        let trigger_data = serde_json::to_string(&execution.trigger_data)?;
        let component_results = serde_json::to_string(&execution.component_results)?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, automation_id, status, trigger_data, component_results,
                error, started_at, completed_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.automation_id.to_string())
        .bind(execution.status.as_str())
        .bind(&trigger_data)
        .bind(&component_results)
        .bind(&execution.error)
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, execution: &Execution) -> DomainResult<()> {
        let component_results = serde_json::to_string(&execution.component_results)?;

        let result = sqlx::query(
            r#"UPDATE executions SET
               status = ?, component_results = ?, error = ?,
               completed_at = ?, duration_ms = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(&component_results)
        .bind(&execution.error)
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.duration_ms)
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ExecutionNotFound(execution.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_execution).transpose()
    }

    async fn list(&self, filter: ExecutionFilter) -> DomainResult<Vec<Execution>> {
        let limit = i64::from(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));
        let rows: Vec<ExecutionRow> = match filter.automation_id {
            Some(automation_id) => {
                sqlx::query_as(
                    "SELECT * FROM executions WHERE automation_id = ?
                     ORDER BY started_at DESC LIMIT ?",
                )
                .bind(automation_id.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM executions ORDER BY started_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(row_to_execution).collect()
    }

    async fn stats(&self, automation_id: Uuid) -> DomainResult<ExecutionStats> {
        let row: (i64, i64, i64, Option<f64>, Option<String>) = sqlx::query_as(
            r#"SELECT
                 COUNT(*),
                 COALESCE(SUM(CASE WHEN status = 'SUCCESS' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0),
                 AVG(duration_ms),
                 MAX(started_at)
               FROM executions WHERE automation_id = ?"#,
        )
        .bind(automation_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(ExecutionStats {
            total: row.0,
            succeeded: row.1,
            failed: row.2,
            average_duration_ms: row.3,
            last_execution_at: parse_optional_datetime(row.4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::SqliteAutomationRepository;
    use crate::domain::models::execution::{ComponentStatus, ComponentResult};
    use crate::domain::models::{Automation, ComponentType, Trigger};
    use crate::domain::ports::AutomationRepository;
    use chrono::Utc;

    async fn seeded_rule(pool: &SqlitePool) -> Automation {
        let rule = Automation {
            id: Uuid::new_v4(),
            name: "r".to_string(),
            description: None,
            workspace_id: "ws-1".to_string(),
            workspace_key: None,
            enabled: true,
            trigger: Trigger::Manual {},
            components: vec![],
            execution_order: 0,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        SqliteAutomationRepository::new(pool.clone())
            .create(&rule)
            .await
            .unwrap();
        rule
    }

    #[tokio::test]
    async fn test_execution_lifecycle_round_trip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());
        let rule = seeded_rule(&pool).await;

        let mut execution = Execution::begin(rule.id, TriggerEvent::manual(None, None));
        repo.create(&execution).await.unwrap();

        execution.status = ExecutionStatus::Running;
        repo.update(&execution).await.unwrap();

        execution.finalize(vec![ComponentResult {
            component_id: "c1".to_string(),
            component_type: ComponentType::Action,
            action_type: None,
            status: ComponentStatus::Success,
            result: None,
            error: None,
            duration_ms: 3,
            children: vec![],
        }]);
        repo.update(&execution).await.unwrap();

        let loaded = repo.get(execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Success);
        assert_eq!(loaded.component_results.len(), 1);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_foreign_key_cascade_on_rule_delete() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());
        let rule = seeded_rule(&pool).await;

        let execution = Execution::begin(rule.id, TriggerEvent::manual(None, None));
        repo.create(&execution).await.unwrap();

        SqliteAutomationRepository::new(pool.clone())
            .delete(rule.id)
            .await
            .unwrap();

        assert!(repo.get(execution.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_aggregates() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());
        let rule = seeded_rule(&pool).await;

        let mut ok = Execution::begin(rule.id, TriggerEvent::manual(None, None));
        ok.finalize(vec![]);
        repo.create(&ok).await.unwrap();

        let mut bad = Execution::begin(rule.id, TriggerEvent::manual(None, None));
        bad.fail("boom");
        repo.create(&bad).await.unwrap();

        let stats = repo.stats(rule.id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_execution_at.is_some());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_limited() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());
        let rule = seeded_rule(&pool).await;

        for _ in 0..3 {
            let execution = Execution::begin(rule.id, TriggerEvent::manual(None, None));
            repo.create(&execution).await.unwrap();
        }

        let limited = repo
            .list(ExecutionFilter {
                automation_id: Some(rule.id),
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
