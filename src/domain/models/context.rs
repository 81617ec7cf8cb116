//! Per-run execution context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::event::TriggerEvent;
use crate::domain::models::execution::ComponentResult;
use crate::domain::models::item::Item;

/// Mutable state shared by all components of one rule invocation.
///
/// Branch iterations derive a child context via [`ExecutionContext::for_item`]
/// and merge writes back with [`ExecutionContext::absorb`]: `variables` writes
/// and created items made inside one iteration are visible to subsequent
/// iterations and to the parent after the branch completes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub automation_id: Uuid,
    pub automation_name: String,
    pub workspace_id: String,
    pub trigger: TriggerEvent,
    /// Results of completed sibling components, in flattened sibling order.
    pub component_results: Vec<ComponentResult>,
    /// String-keyed scratch space written by `variable.set` and `item.lookup`.
    pub variables: BTreeMap<String, Value>,
    /// Items created by this run, unique by id.
    pub created_items: Vec<Item>,
    /// Iteration target inside branches; overrides the triggered item.
    pub current_item: Option<Item>,
    /// Depth of `automation.trigger` chaining, bounded by the executor.
    pub chain_depth: u32,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(
        automation_id: Uuid,
        automation_name: impl Into<String>,
        workspace_id: impl Into<String>,
        trigger: TriggerEvent,
    ) -> Self {
        let current_item = trigger.item.clone();
        Self {
            automation_id,
            automation_name: automation_name.into(),
            workspace_id: workspace_id.into(),
            trigger,
            component_results: Vec::new(),
            variables: BTreeMap::new(),
            created_items: Vec::new(),
            current_item,
            chain_depth: 0,
            started_at: Utc::now(),
        }
    }

    /// The item actions resolve against: the iteration target when inside a
    /// branch, otherwise the triggered item.
    pub fn effective_item(&self) -> Option<&Item> {
        self.current_item.as_ref().or(self.trigger.item.as_ref())
    }

    /// Record a created item, unique by id.
    pub fn record_created(&mut self, item: Item) {
        if !self.created_items.iter().any(|i| i.id == item.id) {
            self.created_items.push(item);
        }
    }

    /// Derive a branch-iteration child context bound to `item`, with a fresh
    /// result list.
    pub fn for_item(&self, item: Item) -> Self {
        let mut child = self.clone();
        child.current_item = Some(item);
        child.component_results = Vec::new();
        child
    }

    /// Merge a finished child context back: variables overwrite, created
    /// items union by id.
    pub fn absorb(&mut self, child: Self) {
        self.variables = child.variables;
        for item in child.created_items {
            self.record_created(item);
        }
    }
}
