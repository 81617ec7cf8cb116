//! Execution history repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Execution, ExecutionStats};

/// Filter criteria for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub automation_id: Option<Uuid>,
    pub limit: Option<u32>,
}

/// Repository interface for Execution persistence.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution row.
    async fn create(&self, execution: &Execution) -> DomainResult<()>;

    /// Overwrite an execution row (status transitions, finalization).
    async fn update(&self, execution: &Execution) -> DomainResult<()>;

    /// Get an execution by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Execution>>;

    /// List executions, newest first.
    async fn list(&self, filter: ExecutionFilter) -> DomainResult<Vec<Execution>>;

    /// Aggregate counts and durations for one rule.
    async fn stats(&self, automation_id: Uuid) -> DomainResult<ExecutionStats>;
}
