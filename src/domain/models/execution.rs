//! Execution records: one per rule invocation, with a nested result tree
//! mirroring the program structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::automation::{ActionType, ComponentType};
use crate::domain::models::event::TriggerEvent;

/// Overall status of a persisted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// Status of a single component within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Success,
    Failed,
    Skipped,
}

/// Nested per-component result, mirroring the program tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub component_id: String,
    pub component_type: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ComponentResult>,
}

impl ComponentResult {
    /// True iff this result or any descendant failed.
    pub fn any_failed(&self) -> bool {
        self.status == ComponentStatus::Failed || self.children.iter().any(Self::any_failed)
    }

    /// First error message in pre-order traversal.
    pub fn first_error(&self) -> Option<&str> {
        if let Some(error) = self.error.as_deref() {
            return Some(error);
        }
        self.children.iter().find_map(Self::first_error)
    }
}

/// First failure message across a result forest, pre-order.
pub fn first_error(results: &[ComponentResult]) -> Option<String> {
    results
        .iter()
        .find_map(|r| r.first_error().map(str::to_string))
}

/// True iff any leaf in the result forest failed.
pub fn any_failed(results: &[ComponentResult]) -> bool {
    results.iter().any(ComponentResult::any_failed)
}

/// One persisted rule invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_data: TriggerEvent,
    #[serde(default)]
    pub component_results: Vec<ComponentResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl Execution {
    /// A fresh run in PENDING state.
    pub fn begin(automation_id: Uuid, trigger_data: TriggerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            automation_id,
            status: ExecutionStatus::Pending,
            trigger_data,
            component_results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Finalize with the walked result tree, deriving status and first error.
    pub fn finalize(&mut self, results: Vec<ComponentResult>) {
        self.status = if any_failed(&results) {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        };
        self.error = first_error(&results);
        self.component_results = results;
        self.complete();
    }

    /// Finalize as FAILED with an execution-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.complete();
    }

    fn complete(&mut self) {
        let completed = Utc::now();
        self.completed_at = Some(completed);
        self.duration_ms = Some((completed - self.started_at).num_milliseconds());
    }
}

/// Per-rule aggregates for the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub average_duration_ms: Option<f64>,
    pub last_execution_at: Option<DateTime<Utc>>,
}
