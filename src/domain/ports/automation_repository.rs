//! Automation rule repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Automation;

/// Filter criteria for listing rules.
#[derive(Debug, Clone, Default)]
pub struct AutomationFilter {
    pub workspace_id: Option<String>,
    pub enabled: Option<bool>,
}

/// Repository interface for Automation persistence.
#[async_trait]
pub trait AutomationRepository: Send + Sync {
    /// Create a new rule.
    async fn create(&self, automation: &Automation) -> DomainResult<()>;

    /// Get a rule by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Automation>>;

    /// Update an existing rule.
    async fn update(&self, automation: &Automation) -> DomainResult<()>;

    /// Delete a rule by ID.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List rules with optional filters, ordered by execution order then name.
    async fn list(&self, filter: AutomationFilter) -> DomainResult<Vec<Automation>>;

    /// Toggle the enabled flag.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()>;
}
