//! SQLite implementation of the TriggerStateRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TriggerState;
use crate::domain::ports::TriggerStateRepository;

#[derive(Clone)]
pub struct SqliteTriggerStateRepository {
    pool: SqlitePool,
}

impl SqliteTriggerStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TriggerStateRow {
    id: String,
    automation_id: String,
    last_checked_at: String,
    last_seen_data: String,
    checksum: Option<String>,
    updated_at: String,
}

fn row_to_state(row: TriggerStateRow) -> DomainResult<TriggerState> {
    Ok(TriggerState {
        id: parse_uuid(&row.id)?,
        automation_id: parse_uuid(&row.automation_id)?,
        last_checked_at: parse_datetime(&row.last_checked_at)?,
        last_seen_data: serde_json::from_str(&row.last_seen_data)
            .map_err(|e| DomainError::SerializationError(format!("last seen data: {e}")))?,
        checksum: row.checksum,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl TriggerStateRepository for SqliteTriggerStateRepository {
    async fn get(&self, automation_id: Uuid) -> DomainResult<Option<TriggerState>> {
        let row: Option<TriggerStateRow> =
            sqlx::query_as("SELECT * FROM trigger_states WHERE automation_id = ?")
                .bind(automation_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_state).transpose()
    }

    async fn upsert(&self, state: &TriggerState) -> DomainResult<()> {
        let last_seen_data = serde_json::to_string(&state.last_seen_data)?;

        sqlx::query(
            r#"INSERT INTO trigger_states
               (id, automation_id, last_checked_at, last_seen_data, checksum, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(automation_id) DO UPDATE SET
                 last_checked_at = excluded.last_checked_at,
                 last_seen_data = excluded.last_seen_data,
                 checksum = excluded.checksum,
                 updated_at = excluded.updated_at"#,
        )
        .bind(state.id.to_string())
        .bind(state.automation_id.to_string())
        .bind(state.last_checked_at.to_rfc3339())
        .bind(&last_seen_data)
        .bind(&state.checksum)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, automation_id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM trigger_states WHERE automation_id = ?")
            .bind(automation_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
