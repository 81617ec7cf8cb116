//! Onstaq Automation Engine
//!
//! A long-running automation engine for the Onstaq item-management service:
//! - Trigger manager: polling watchers, cron schedules, webhook and manual entry points
//! - Rule program executor: component trees under a global concurrency gate
//! - Template resolver: `{{…}}` expressions over the per-execution context
//! - SQLite persistence for rules, executions, and trigger bookmarks
//! - REST client for the upstream Onstaq API

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::config::EngineConfig;
