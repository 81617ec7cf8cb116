//! Automation rule domain model.
//!
//! An automation pairs a trigger declaration with an ordered component tree
//! (actions, conditions, iteration branches, if/else blocks). Rules are the
//! persisted unit; the trigger manager turns enabled rules into live watchers.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// A persisted automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workspace_id: String,
    #[serde(default)]
    pub workspace_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub components: Vec<Component>,
    /// Stable sort among rules sharing a trigger.
    #[serde(default)]
    pub execution_order: i64,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    /// Validate the rule before persisting. Rejected rules are never written.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "automation name cannot be empty".to_string(),
            ));
        }
        if self.workspace_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "workspaceId cannot be empty".to_string(),
            ));
        }
        self.trigger.validate()?;
        for component in &self.components {
            component.validate()?;
        }
        Ok(())
    }
}

/// How the rule fires. One tagged variant per trigger kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Trigger {
    #[serde(rename = "item.created", rename_all = "camelCase")]
    ItemCreated {
        #[serde(default)]
        catalog_id: Option<String>,
    },
    #[serde(rename = "item.updated", rename_all = "camelCase")]
    ItemUpdated {
        #[serde(default)]
        catalog_id: Option<String>,
    },
    #[serde(rename = "item.deleted", rename_all = "camelCase")]
    ItemDeleted {
        #[serde(default)]
        catalog_id: Option<String>,
    },
    #[serde(rename = "attribute.changed", rename_all = "camelCase")]
    AttributeChanged {
        #[serde(default)]
        catalog_id: Option<String>,
        attribute_name: String,
    },
    #[serde(rename = "status.changed", rename_all = "camelCase")]
    StatusChanged {
        #[serde(default)]
        catalog_id: Option<String>,
        /// Case-insensitive match against the prior status.
        #[serde(default)]
        from: Option<String>,
        /// Case-insensitive match against the new status.
        #[serde(default)]
        to: Option<String>,
    },
    #[serde(rename = "reference.added", rename_all = "camelCase")]
    ReferenceAdded {
        #[serde(default)]
        catalog_id: Option<String>,
        #[serde(default)]
        reference_kind: Option<String>,
    },
    #[serde(rename = "item.linked", rename_all = "camelCase")]
    ItemLinked {
        #[serde(default)]
        catalog_id: Option<String>,
        #[serde(default)]
        reference_kind: Option<String>,
    },
    #[serde(rename = "item.unlinked", rename_all = "camelCase")]
    ItemUnlinked {
        #[serde(default)]
        catalog_id: Option<String>,
        #[serde(default)]
        reference_kind: Option<String>,
    },
    #[serde(rename = "item.commented", rename_all = "camelCase")]
    ItemCommented {
        #[serde(default)]
        catalog_id: Option<String>,
    },
    #[serde(rename = "oql.match", rename_all = "camelCase")]
    OqlMatch {
        query: String,
        #[serde(default)]
        trigger_on: OqlTriggerOn,
    },
    #[serde(rename = "schedule", rename_all = "camelCase")]
    Schedule {
        cron: String,
        /// IANA timezone name, default UTC.
        #[serde(default)]
        timezone: Option<String>,
    },
    #[serde(rename = "manual")]
    Manual {},
    #[serde(rename = "webhook.received", rename_all = "camelCase")]
    WebhookReceived {
        #[serde(default)]
        path: Option<String>,
        /// Every `(k, v)` must match the inbound body for the rule to fire.
        #[serde(default)]
        filter: Option<BTreeMap<String, Value>>,
    },
}

impl Trigger {
    /// The wire name of this trigger kind, matching `TriggerEvent.event_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ItemCreated { .. } => "item.created",
            Self::ItemUpdated { .. } => "item.updated",
            Self::ItemDeleted { .. } => "item.deleted",
            Self::AttributeChanged { .. } => "attribute.changed",
            Self::StatusChanged { .. } => "status.changed",
            Self::ReferenceAdded { .. } => "reference.added",
            Self::ItemLinked { .. } => "item.linked",
            Self::ItemUnlinked { .. } => "item.unlinked",
            Self::ItemCommented { .. } => "item.commented",
            Self::OqlMatch { .. } => "oql.match",
            Self::Schedule { .. } => "schedule",
            Self::Manual {} => "manual",
            Self::WebhookReceived { .. } => "webhook.received",
        }
    }

    /// True for kinds that install a periodic poller.
    pub fn is_polling(&self) -> bool {
        !matches!(
            self,
            Self::Schedule { .. } | Self::Manual {} | Self::WebhookReceived { .. }
        )
    }

    fn validate(&self) -> DomainResult<()> {
        match self {
            Self::AttributeChanged { attribute_name, .. } if attribute_name.trim().is_empty() => {
                Err(DomainError::ValidationFailed(
                    "attribute.changed requires attributeName".to_string(),
                ))
            }
            Self::OqlMatch { query, .. } if query.trim().is_empty() => Err(
                DomainError::ValidationFailed("oql.match requires a query".to_string()),
            ),
            Self::Schedule { cron, timezone } => {
                parse_cron_schedule(cron).map_err(|e| {
                    DomainError::ValidationFailed(format!("invalid cron expression '{cron}': {e}"))
                })?;
                if let Some(tz) = timezone {
                    tz.parse::<chrono_tz::Tz>().map_err(|_| {
                        DomainError::ValidationFailed(format!("unknown timezone '{tz}'"))
                    })?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parse a cron expression, accepting the common five-field form by
/// prefixing a zero seconds field.
pub fn parse_cron_schedule(expr: &str) -> Result<cron::Schedule, cron::error::Error> {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        cron::Schedule::from_str(&format!("0 {expr}"))
    } else {
        cron::Schedule::from_str(expr)
    }
}

/// Firing policy for `oql.match` triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OqlTriggerOn {
    /// Fire whenever the query returns any rows.
    #[default]
    AnyResults,
    /// Fire when the count grows past the previously observed count.
    NewResults,
    /// Fire on any change in count.
    CountChange,
}

/// Discriminator for component payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Action,
    Condition,
    Branch,
    IfElse,
}

impl ComponentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Branch => "branch",
            Self::IfElse => "if_else",
        }
    }
}

/// A node in a rule's program tree.
///
/// Exactly one of the four payloads is populated, matching `component_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Unique within the rule.
    pub id: String,
    pub component_type: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_else: Option<IfElseDef>,
}

impl Component {
    pub fn action(id: impl Into<String>, action: ActionDef) -> Self {
        Self {
            id: id.into(),
            component_type: ComponentType::Action,
            action: Some(action),
            condition: None,
            branch: None,
            if_else: None,
        }
    }

    pub fn condition(id: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: id.into(),
            component_type: ComponentType::Condition,
            action: None,
            condition: Some(condition),
            branch: None,
            if_else: None,
        }
    }

    pub fn branch(id: impl Into<String>, branch: BranchDef) -> Self {
        Self {
            id: id.into(),
            component_type: ComponentType::Branch,
            action: None,
            condition: None,
            branch: Some(branch),
            if_else: None,
        }
    }

    pub fn if_else(id: impl Into<String>, if_else: IfElseDef) -> Self {
        Self {
            id: id.into(),
            component_type: ComponentType::IfElse,
            action: None,
            condition: None,
            branch: None,
            if_else: Some(if_else),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        let populated = [
            self.action.is_some(),
            self.condition.is_some(),
            self.branch.is_some(),
            self.if_else.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        if populated != 1 {
            return Err(DomainError::ValidationFailed(format!(
                "component '{}' must carry exactly one payload, found {populated}",
                self.id
            )));
        }

        let matches_tag = match self.component_type {
            ComponentType::Action => self.action.is_some(),
            ComponentType::Condition => self.condition.is_some(),
            ComponentType::Branch => self.branch.is_some(),
            ComponentType::IfElse => self.if_else.is_some(),
        };
        if !matches_tag {
            return Err(DomainError::ValidationFailed(format!(
                "component '{}' payload does not match componentType {}",
                self.id,
                self.component_type.as_str()
            )));
        }

        if let Some(condition) = &self.condition {
            condition.validate()?;
        }
        if let Some(branch) = &self.branch {
            branch.validate()?;
            for child in &branch.components {
                child.validate()?;
            }
        }
        if let Some(if_else) = &self.if_else {
            for condition in &if_else.conditions {
                condition.validate()?;
            }
            for child in if_else.then.iter().chain(if_else.else_components.iter()) {
                child.validate()?;
            }
        }
        Ok(())
    }
}

/// A single action node: a typed effect with a type-specific config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Optional display name, used in logs and results.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub config: Value,
}

impl ActionDef {
    pub fn new(action_type: ActionType, config: Value) -> Self {
        Self {
            action_type,
            name: None,
            continue_on_error: false,
            config,
        }
    }
}

/// Closed set of action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "item.create")]
    ItemCreate,
    #[serde(rename = "item.update")]
    ItemUpdate,
    #[serde(rename = "item.delete")]
    ItemDelete,
    #[serde(rename = "item.clone")]
    ItemClone,
    #[serde(rename = "item.transition")]
    ItemTransition,
    #[serde(rename = "item.lookup")]
    ItemLookup,
    #[serde(rename = "attribute.set")]
    AttributeSet,
    #[serde(rename = "reference.add")]
    ReferenceAdd,
    #[serde(rename = "reference.remove")]
    ReferenceRemove,
    #[serde(rename = "comment.add")]
    CommentAdd,
    #[serde(rename = "item.import")]
    ItemImport,
    #[serde(rename = "catalog.create")]
    CatalogCreate,
    #[serde(rename = "attribute.create")]
    AttributeCreate,
    #[serde(rename = "workspace.member.add")]
    WorkspaceMemberAdd,
    #[serde(rename = "oql.execute")]
    OqlExecute,
    #[serde(rename = "webhook.send")]
    WebhookSend,
    #[serde(rename = "automation.trigger")]
    AutomationTrigger,
    #[serde(rename = "variable.set")]
    VariableSet,
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "refetch_data")]
    RefetchData,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemCreate => "item.create",
            Self::ItemUpdate => "item.update",
            Self::ItemDelete => "item.delete",
            Self::ItemClone => "item.clone",
            Self::ItemTransition => "item.transition",
            Self::ItemLookup => "item.lookup",
            Self::AttributeSet => "attribute.set",
            Self::ReferenceAdd => "reference.add",
            Self::ReferenceRemove => "reference.remove",
            Self::CommentAdd => "comment.add",
            Self::ItemImport => "item.import",
            Self::CatalogCreate => "catalog.create",
            Self::AttributeCreate => "attribute.create",
            Self::WorkspaceMemberAdd => "workspace.member.add",
            Self::OqlExecute => "oql.execute",
            Self::WebhookSend => "webhook.send",
            Self::AutomationTrigger => "automation.trigger",
            Self::VariableSet => "variable.set",
            Self::Log => "log",
            Self::RefetchData => "refetch_data",
        }
    }
}

/// Direction of reference traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDirection {
    #[default]
    Outbound,
    Inbound,
}

/// Which items a branch iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    RelatedItems,
    CreatedItems,
    LookupItems,
}

/// An iteration branch: resolves a set of items and runs its components once
/// per item with `currentItem` bound to the iteration target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDef {
    pub branch_type: BranchType,
    #[serde(default)]
    pub direction: Option<ReferenceDirection>,
    #[serde(default)]
    pub reference_kind: Option<String>,
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub oql_query: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl BranchDef {
    fn validate(&self) -> DomainResult<()> {
        if self.branch_type == BranchType::LookupItems
            && self.oql_query.as_deref().is_none_or(|q| q.trim().is_empty())
        {
            return Err(DomainError::ValidationFailed(
                "lookup_items branch requires oqlQuery".to_string(),
            ));
        }
        Ok(())
    }
}

/// Conditional fork: run `then` when all conditions hold, else `else`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfElseDef {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub then: Vec<Component>,
    #[serde(default, rename = "else")]
    pub else_components: Vec<Component>,
}

/// Comparison operator on an attribute condition leaf.
///
/// Unknown operators deserialize to `Unknown` and always evaluate false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    ChangedTo,
    ChangedFrom,
    MatchesRegex,
    #[serde(other)]
    Unknown,
}

/// A boolean tree evaluated against the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    #[serde(rename_all = "camelCase")]
    Attribute {
        field: String,
        operator: AttributeOperator,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        from: Option<Value>,
        #[serde(default)]
        to: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Oql {
        query: String,
        #[serde(default)]
        expect_count: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Reference {
        #[serde(default)]
        direction: ReferenceDirection,
        #[serde(default)]
        reference_kind: Option<String>,
        exists: bool,
    },
    Template { template: String },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { conditions: Vec<Condition> },
}

impl Condition {
    /// NOT takes exactly one child; AND/OR take at least one.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::Not { conditions } => {
                if conditions.len() != 1 {
                    return Err(DomainError::ValidationFailed(format!(
                        "NOT condition requires exactly one child, found {}",
                        conditions.len()
                    )));
                }
                conditions[0].validate()
            }
            Self::And { conditions } | Self::Or { conditions } => {
                if conditions.is_empty() {
                    return Err(DomainError::ValidationFailed(
                        "AND/OR condition requires at least one child".to_string(),
                    ));
                }
                conditions.iter().try_for_each(Self::validate)
            }
            _ => Ok(()),
        }
    }
}

/// Legacy persisted rule body: a single condition plus a flat action list.
///
/// Accepted at read; rewritten as a `components` tree on every write.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRuleBody {
    #[serde(default)]
    pub conditions: Option<Condition>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

impl LegacyRuleBody {
    /// Convert to the unified tree: the condition (if any) becomes a single
    /// `condition` component prefixing the action list.
    pub fn into_components(self) -> Vec<Component> {
        let mut components = Vec::new();
        if let Some(condition) = self.conditions {
            components.push(Component::condition("condition-1", condition));
        }
        components.extend(
            self.actions
                .into_iter()
                .enumerate()
                .map(|(i, action)| Component::action(format!("action-{}", i + 1), action)),
        );
        components
    }
}
