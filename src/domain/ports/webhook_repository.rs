//! Webhook subscription repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::WebhookSubscription;

/// Repository interface for webhook subscriptions.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, subscription: &WebhookSubscription) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<WebhookSubscription>>;

    async fn update(&self, subscription: &WebhookSubscription) -> DomainResult<()>;

    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// All active subscriptions, consulted by the inbound router.
    async fn list_active(&self) -> DomainResult<Vec<WebhookSubscription>>;
}
