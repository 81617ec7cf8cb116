//! Template resolution: `{{…}}` expressions embedded in action configs.
//!
//! A template is any string containing `{{ expression }}` spans. Resolution
//! first expands block helpers (`{{#each}}`, `{{#if}}`), then evaluates the
//! remaining expressions against the execution context and substitutes the
//! stringified results. Structured values resolve deeply: every leaf string
//! is processed, structure is preserved.

mod blocks;
mod expression;
mod functions;
mod legacy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub use expression::is_truthy;
pub use functions::{coerce_string as stringify_value, navigate_path, to_number, truthy};

use crate::domain::errors::DomainError;
use crate::domain::models::ExecutionContext;
use crate::domain::ports::OnstaqApi;
use expression::{parse, Evaluator};

/// Errors surfaced by template parsing and evaluation.
///
/// Parse errors on an individual expression are recovered by the legacy
/// dotted-path resolver; evaluation errors propagate and fail the enclosing
/// action.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {min}..={max} arguments, got {got}")]
    Arity {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("function '{name}' is only applicable to {expected}")]
    NotApplicable { name: String, expected: &'static str },

    #[error("unknown context root '{0}'")]
    UnknownRoot(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("template evaluation error: {0}")]
    Eval(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl From<TemplateError> for DomainError {
    fn from(err: TemplateError) -> Self {
        DomainError::TemplateError(err.to_string())
    }
}

/// Resolves templates against an execution context. Stateless apart from the
/// upstream handle used by `oql:` expressions and `lookup(key)`.
pub struct TemplateResolver {
    api: Arc<dyn OnstaqApi>,
}

impl TemplateResolver {
    pub fn new(api: Arc<dyn OnstaqApi>) -> Self {
        Self { api }
    }

    /// Resolve every `{{…}}` span in a string.
    pub async fn resolve_string(
        &self,
        input: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, TemplateError> {
        if !input.contains("{{") {
            return Ok(input.to_string());
        }
        let roots = build_roots(ctx);
        let expanded =
            blocks::process_blocks(input, &roots, self.api.as_ref(), &ctx.workspace_id).await?;
        resolve_expressions(&expanded, &roots, self.api.as_ref(), &ctx.workspace_id).await
    }

    /// Deep resolution: strings are resolved, arrays and maps are walked,
    /// other leaves pass through untouched.
    pub async fn resolve_value(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, TemplateError> {
        let roots = build_roots(ctx);
        self.resolve_value_inner(input, &roots, &ctx.workspace_id)
            .await
    }

    fn resolve_value_inner<'a>(
        &'a self,
        input: &'a Value,
        roots: &'a Value,
        workspace_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value, TemplateError>> + Send + 'a>> {
        Box::pin(async move {
            match input {
                Value::String(s) => {
                    if !s.contains("{{") {
                        return Ok(input.clone());
                    }
                    let expanded =
                        blocks::process_blocks(s, roots, self.api.as_ref(), workspace_id).await?;
                    let resolved =
                        resolve_expressions(&expanded, roots, self.api.as_ref(), workspace_id)
                            .await?;
                    Ok(Value::String(resolved))
                }
                Value::Array(elements) => {
                    let mut out = Vec::with_capacity(elements.len());
                    for element in elements {
                        out.push(
                            self.resolve_value_inner(element, roots, workspace_id).await?,
                        );
                    }
                    Ok(Value::Array(out))
                }
                Value::Object(map) => {
                    let mut out = Map::with_capacity(map.len());
                    for (key, value) in map {
                        out.insert(
                            key.clone(),
                            self.resolve_value_inner(value, roots, workspace_id).await?,
                        );
                    }
                    Ok(Value::Object(out))
                }
                other => Ok(other.clone()),
            }
        })
    }
}

/// Substitute every plain `{{ expression }}` span. Block tags that survived
/// the expansion guard are copied through untouched.
pub(crate) async fn resolve_expressions(
    input: &str,
    roots: &Value,
    api: &dyn OnstaqApi,
    workspace_id: &str,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start..];

        let Some(end) = after_open.find("}}") else {
            // Unterminated span: emit verbatim.
            out.push_str(after_open);
            return Ok(out);
        };
        let span = &after_open[..end + 2];
        let inner = after_open[2..end].trim();

        if inner.starts_with('#') || inner.starts_with('/') || inner == "else" {
            out.push_str(span);
        } else if let Some(query) = inner.strip_prefix("oql:") {
            let result = api
                .execute_query(workspace_id, query.trim())
                .await
                .map_err(|e| TemplateError::Query(e.to_string()))?;
            out.push_str(&stringify_value(&result.collapse()));
        } else {
            match parse(inner) {
                Ok(expr) => {
                    let evaluator = Evaluator::new(roots, api, workspace_id);
                    let value = evaluator.eval(&expr).await?;
                    out.push_str(&stringify_value(&value));
                }
                Err(_) => {
                    let value = legacy::resolve_path(inner, roots);
                    out.push_str(&stringify_value(&value));
                }
            }
        }

        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Build the context-root object the expression language navigates.
///
/// Roots: `trigger` (with `previous`, `user` conveniences), `item` /
/// `currentItem` (iteration target, falling back to the triggered item),
/// `env` (`NOW`, `TODAY`), `context` / `variables`, and `action` (completed
/// component results, indexable as `action[n]`).
pub(crate) fn build_roots(ctx: &ExecutionContext) -> Value {
    let item_value = ctx
        .effective_item()
        .and_then(|item| serde_json::to_value(item).ok())
        .unwrap_or(Value::Null);

    let mut trigger = serde_json::to_value(&ctx.trigger).unwrap_or_else(|_| json!({}));
    let previous = serde_json::to_value(&ctx.trigger.previous_values).unwrap_or_else(|_| json!({}));
    let user = ctx
        .trigger
        .item
        .as_ref()
        .and_then(|item| item.created_by.clone().or_else(|| item.updated_by.clone()))
        .map_or(Value::Null, Value::String);
    if let Some(map) = trigger.as_object_mut() {
        map.insert("previous".to_string(), previous);
        map.insert("user".to_string(), user);
        map.entry("previousValues".to_string())
            .or_insert_with(|| json!({}));
    }

    let variables = serde_json::to_value(&ctx.variables).unwrap_or_else(|_| json!({}));
    let now = Utc::now();

    json!({
        "trigger": trigger,
        "item": item_value.clone(),
        "currentItem": item_value,
        "env": {
            "NOW": now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "TODAY": now.date_naive().to_string(),
        },
        "context": variables.clone(),
        "variables": variables,
        "action": serde_json::to_value(&ctx.component_results).unwrap_or_else(|_| json!([])),
    })
}
