//! Upstream Onstaq data model.
//!
//! Workspaces group catalogs; a catalog is an item type with a schema of
//! typed attributes; items carry attribute values and explicit references
//! to other items.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An item record in a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    /// Human-readable key, e.g. `TCK-42`.
    #[serde(default)]
    pub key: Option<String>,
    pub catalog_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub attribute_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A catalog (item type) with its attribute schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

impl Catalog {
    /// Name of the catalog's STATUS-typed attribute, if it has one.
    pub fn status_attribute(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type == AttributeType::Status)
            .map(|a| a.name.as_str())
    }
}

/// Attribute schema entry on a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub options: Option<Value>,
}

/// Type tag on an attribute definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    Text,
    Number,
    Date,
    Status,
    User,
    Select,
    Checkbox,
    #[serde(other)]
    Other,
}

/// A directed reference from one item to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    pub from_item_id: String,
    pub to_item_id: String,
    /// Reference kind, e.g. `LINK` or `DEPENDENCY`.
    #[serde(default = "Reference::default_kind")]
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    fn default_kind() -> String {
        "LINK".to_string()
    }
}

/// A comment on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub item_id: String,
    pub body: String,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
    ReferenceAdded,
    ReferenceRemoved,
    Commented,
    #[serde(other)]
    Other,
}

/// One attribute change inside an `UPDATED` history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
}

/// An audit entry on an item.
///
/// `changes` maps attribute names (or the distinguished `@status` field) to
/// their before/after values for `UPDATED` entries. Reference entries carry
/// the reference id and kind in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub item_id: String,
    pub action: HistoryAction,
    #[serde(default)]
    pub changes: BTreeMap<String, FieldChange>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Reference kind recorded on REFERENCE_ADDED / REFERENCE_REMOVED entries.
    pub fn reference_kind(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("referenceKind"))
            .and_then(Value::as_str)
    }
}

/// A workspace member row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub role: String,
}

/// An authenticated upstream user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Tabular result of an ad-hoc OQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub total_count: i64,
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
}

impl QueryResult {
    /// Collapse to the most specific shape: scalar for 1×1, row for 1×n,
    /// otherwise the full row array.
    pub fn collapse(&self) -> Value {
        match self.rows.as_slice() {
            [row] if row.len() == 1 => row.values().next().cloned().unwrap_or(Value::Null),
            [row] => serde_json::to_value(row).unwrap_or(Value::Null),
            _ => serde_json::to_value(&self.rows).unwrap_or(Value::Null),
        }
    }
}

/// Summary returned by a bulk item import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: u64,
    pub updated: u64,
}

/// Sort order accepted by upstream list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query parameters for upstream list endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Attribute filters, `name -> expected value`.
    pub filters: BTreeMap<String, String>,
}

impl ListParams {
    /// The polling window: newest-first on the given timestamp column.
    pub fn poll_window(sort_by: &str, limit: u32) -> Self {
        Self {
            sort_by: Some(sort_by.to_string()),
            sort_order: Some(SortOrder::Desc),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Filter to items whose `key` attribute equals the given key.
    pub fn by_key(key: &str) -> Self {
        let mut params = Self {
            limit: Some(1),
            ..Self::default()
        };
        params.filters.insert("key".to_string(), key.to_string());
        params
    }
}
