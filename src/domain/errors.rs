//! Domain errors for the automation engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Automation not found: {0}")]
    AutomationNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Catalog not found: {0}")]
    CatalogNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Upstream API error: {0}")]
    UpstreamError(String),

    #[error("Upstream authentication failed: {0}")]
    UpstreamAuthFailed(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Trigger chain depth exceeded ({0})")]
    ChainDepthExceeded(u32),

    #[error("Engine is shutting down")]
    ShuttingDown,
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
