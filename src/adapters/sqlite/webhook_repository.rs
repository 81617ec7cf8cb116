//! SQLite implementation of the WebhookRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WebhookSubscription;
use crate::domain::ports::WebhookRepository;

#[derive(Clone)]
pub struct SqliteWebhookRepository {
    pool: SqlitePool,
}

impl SqliteWebhookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookRow {
    id: String,
    url: String,
    events: String,
    secret: String,
    active: i32,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_subscription(row: WebhookRow) -> DomainResult<WebhookSubscription> {
    Ok(WebhookSubscription {
        id: parse_uuid(&row.id)?,
        url: row.url,
        events: serde_json::from_str(&row.events)
            .map_err(|e| DomainError::SerializationError(format!("events: {e}")))?,
        secret: row.secret,
        active: row.active != 0,
        metadata: row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DomainError::SerializationError(format!("metadata: {e}")))?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn create(&self, subscription: &WebhookSubscription) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO webhook_subscriptions
               (id, url, events, secret, active, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(subscription.id.to_string())
        .bind(&subscription.url)
        .bind(serde_json::to_string(&subscription.events)?)
        .bind(&subscription.secret)
        .bind(i32::from(subscription.active))
        .bind(
            subscription
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(subscription.created_at.to_rfc3339())
        .bind(subscription.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<WebhookSubscription>> {
        let row: Option<WebhookRow> =
            sqlx::query_as("SELECT * FROM webhook_subscriptions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_subscription).transpose()
    }

    async fn update(&self, subscription: &WebhookSubscription) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE webhook_subscriptions SET
               url = ?, events = ?, secret = ?, active = ?, metadata = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&subscription.url)
        .bind(serde_json::to_string(&subscription.events)?)
        .bind(&subscription.secret)
        .bind(i32::from(subscription.active))
        .bind(
            subscription
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(subscription.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM webhook_subscriptions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active(&self) -> DomainResult<Vec<WebhookSubscription>> {
        let rows: Vec<WebhookRow> =
            sqlx::query_as("SELECT * FROM webhook_subscriptions WHERE active = 1 ORDER BY url")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Utc;
    use serde_json::json;

    fn subscription(active: bool) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            url: "https://example.test/hook".to_string(),
            events: vec!["item.created".to_string()],
            secret: "s3cret".to_string(),
            active,
            metadata: Some(json!({"path": "ticket-sync"})),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_active_filter() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteWebhookRepository::new(pool);

        let live = subscription(true);
        let dormant = subscription(false);
        repo.create(&live).await.unwrap();
        repo.create(&dormant).await.unwrap();

        let loaded = repo.get(live.id).await.unwrap().unwrap();
        assert_eq!(loaded.path(), Some("ticket-sync"));
        assert_eq!(loaded.events, live.events);

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
    }
}
