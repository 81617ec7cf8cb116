//! Trigger bookmark repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::TriggerState;

/// Repository interface for per-rule trigger bookmarks.
///
/// At most one row exists per rule; its lifetime matches the rule's.
#[async_trait]
pub trait TriggerStateRepository: Send + Sync {
    /// Get the bookmark for a rule.
    async fn get(&self, automation_id: Uuid) -> DomainResult<Option<TriggerState>>;

    /// Insert or replace the bookmark for a rule.
    async fn upsert(&self, state: &TriggerState) -> DomainResult<()>;

    /// Delete the bookmark for a rule.
    async fn delete(&self, automation_id: Uuid) -> DomainResult<()>;
}
