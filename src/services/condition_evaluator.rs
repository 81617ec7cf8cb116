//! Condition tree evaluation.
//!
//! Leaves compare attributes, probe queries, check reference presence, or
//! test template truthiness. Inner nodes are AND/OR/NOT with short-circuit.
//! Any evaluation exception makes the whole condition false, with the error
//! captured in the diagnostic record.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AttributeOperator, Condition, ExecutionContext, ReferenceDirection,
};
use crate::domain::ports::OnstaqApi;
use crate::services::template::{stringify_value, TemplateResolver};

/// Pass/fail plus a diagnostic record for the component result.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub diagnostic: Value,
}

/// Evaluates condition trees against an execution context.
pub struct ConditionEvaluator {
    api: Arc<dyn OnstaqApi>,
    resolver: Arc<TemplateResolver>,
}

impl ConditionEvaluator {
    pub fn new(api: Arc<dyn OnstaqApi>, resolver: Arc<TemplateResolver>) -> Self {
        Self { api, resolver }
    }

    /// Evaluate a condition. Exceptions yield `false` with the error recorded.
    pub async fn evaluate(&self, condition: &Condition, ctx: &ExecutionContext) -> ConditionOutcome {
        match self.eval(condition, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(automation = %ctx.automation_name, error = %e, "condition evaluation failed");
                ConditionOutcome {
                    passed: false,
                    diagnostic: json!({ "error": e.to_string() }),
                }
            }
        }
    }

    fn eval<'a>(
        &'a self,
        condition: &'a Condition,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = DomainResult<ConditionOutcome>> + Send + 'a>> {
        Box::pin(async move {
            match condition {
                Condition::Attribute {
                    field,
                    operator,
                    value,
                    from,
                    to,
                } => Ok(self.eval_attribute(ctx, field, *operator, value, from, to)),
                Condition::Oql {
                    query,
                    expect_count,
                } => self.eval_oql(ctx, query, *expect_count).await,
                Condition::Reference {
                    direction,
                    reference_kind,
                    exists,
                } => {
                    self.eval_reference(ctx, *direction, reference_kind.as_deref(), *exists)
                        .await
                }
                Condition::Template { template } => self.eval_template(ctx, template).await,
                Condition::And { conditions } => {
                    let mut children = Vec::with_capacity(conditions.len());
                    for child in conditions {
                        let outcome = self.eval(child, ctx).await?;
                        let passed = outcome.passed;
                        children.push(outcome.diagnostic);
                        if !passed {
                            return Ok(ConditionOutcome {
                                passed: false,
                                diagnostic: json!({ "operator": "AND", "children": children }),
                            });
                        }
                    }
                    Ok(ConditionOutcome {
                        passed: true,
                        diagnostic: json!({ "operator": "AND", "children": children }),
                    })
                }
                Condition::Or { conditions } => {
                    let mut children = Vec::with_capacity(conditions.len());
                    for child in conditions {
                        let outcome = self.eval(child, ctx).await?;
                        let passed = outcome.passed;
                        children.push(outcome.diagnostic);
                        if passed {
                            return Ok(ConditionOutcome {
                                passed: true,
                                diagnostic: json!({ "operator": "OR", "children": children }),
                            });
                        }
                    }
                    Ok(ConditionOutcome {
                        passed: false,
                        diagnostic: json!({ "operator": "OR", "children": children }),
                    })
                }
                Condition::Not { conditions } => {
                    if conditions.len() != 1 {
                        return Err(DomainError::ValidationFailed(format!(
                            "NOT condition requires exactly one child, found {}",
                            conditions.len()
                        )));
                    }
                    let inner = self.eval(&conditions[0], ctx).await?;
                    Ok(ConditionOutcome {
                        passed: !inner.passed,
                        diagnostic: json!({ "operator": "NOT", "children": [inner.diagnostic] }),
                    })
                }
            }
        })
    }

    #[allow(clippy::too_many_lines)]
    fn eval_attribute(
        &self,
        ctx: &ExecutionContext,
        field: &str,
        operator: AttributeOperator,
        value: &Option<Value>,
        from: &Option<Value>,
        to: &Option<Value>,
    ) -> ConditionOutcome {
        let current = ctx
            .trigger
            .item
            .as_ref()
            .and_then(|item| item.attribute_values.get(field))
            .cloned()
            .unwrap_or(Value::Null);
        let previous = ctx
            .trigger
            .previous_values
            .get(field)
            .cloned()
            .unwrap_or(Value::Null);
        let expected = value.clone().unwrap_or(Value::Null);

        let passed = match operator {
            AttributeOperator::Equals => loose_eq(&current, &expected),
            AttributeOperator::NotEquals => !loose_eq(&current, &expected),
            AttributeOperator::Contains => {
                lower(&current).contains(&lower(&expected))
            }
            AttributeOperator::NotContains => {
                !lower(&current).contains(&lower(&expected))
            }
            AttributeOperator::StartsWith => {
                lower(&current).starts_with(&lower(&expected))
            }
            AttributeOperator::EndsWith => lower(&current).ends_with(&lower(&expected)),
            AttributeOperator::GreaterThan => numeric(&current, &expected, |a, b| a > b),
            AttributeOperator::LessThan => numeric(&current, &expected, |a, b| a < b),
            AttributeOperator::GreaterThanOrEqual => numeric(&current, &expected, |a, b| a >= b),
            AttributeOperator::LessThanOrEqual => numeric(&current, &expected, |a, b| a <= b),
            AttributeOperator::In => in_list(&current, &expected),
            AttributeOperator::NotIn => !in_list(&current, &expected),
            AttributeOperator::IsNull => is_nullish(&current),
            AttributeOperator::IsNotNull => !is_nullish(&current),
            AttributeOperator::ChangedTo => {
                let target = to.clone().unwrap_or(Value::Null);
                loose_eq(&current, &target) && !loose_eq(&previous, &target)
            }
            AttributeOperator::ChangedFrom => {
                let source = from.clone().unwrap_or(Value::Null);
                loose_eq(&previous, &source) && !loose_eq(&current, &source)
            }
            AttributeOperator::MatchesRegex => {
                let pattern = stringify_value(&expected);
                match Regex::new(&pattern) {
                    Ok(re) => re.is_match(&stringify_value(&current)),
                    Err(_) => false,
                }
            }
            AttributeOperator::Unknown => false,
        };

        ConditionOutcome {
            passed,
            diagnostic: json!({
                "type": "attribute",
                "field": field,
                "operator": operator,
                "current": current,
                "previous": previous,
                "passed": passed,
            }),
        }
    }

    async fn eval_oql(
        &self,
        ctx: &ExecutionContext,
        query: &str,
        expect_count: Option<i64>,
    ) -> DomainResult<ConditionOutcome> {
        let resolved = self.resolver.resolve_string(query, ctx).await?;
        let result = self.api.execute_query(&ctx.workspace_id, &resolved).await?;
        let passed = match expect_count {
            Some(expected) => result.total_count == expected,
            None => result.total_count > 0,
        };
        Ok(ConditionOutcome {
            passed,
            diagnostic: json!({
                "type": "oql",
                "query": resolved,
                "totalCount": result.total_count,
                "expectCount": expect_count,
                "passed": passed,
            }),
        })
    }

    async fn eval_reference(
        &self,
        ctx: &ExecutionContext,
        direction: ReferenceDirection,
        reference_kind: Option<&str>,
        exists: bool,
    ) -> DomainResult<ConditionOutcome> {
        let Some(item) = ctx.effective_item() else {
            return Ok(ConditionOutcome {
                passed: !exists,
                diagnostic: json!({ "type": "reference", "passed": !exists, "note": "no item" }),
            });
        };

        let references = match direction {
            ReferenceDirection::Outbound => self.api.list_references(&item.id).await?,
            ReferenceDirection::Inbound => self.api.list_back_references(&item.id).await?,
        };
        let count = references
            .iter()
            .filter(|r| reference_kind.is_none_or(|kind| r.kind.eq_ignore_ascii_case(kind)))
            .count();
        let passed = (count > 0) == exists;

        Ok(ConditionOutcome {
            passed,
            diagnostic: json!({
                "type": "reference",
                "direction": direction,
                "referenceKind": reference_kind,
                "matches": count,
                "passed": passed,
            }),
        })
    }

    async fn eval_template(
        &self,
        ctx: &ExecutionContext,
        template: &str,
    ) -> DomainResult<ConditionOutcome> {
        let resolved = self.resolver.resolve_string(template, ctx).await?;
        let passed = !matches!(resolved.as_str(), "" | "false" | "0" | "null" | "undefined");
        Ok(ConditionOutcome {
            passed,
            diagnostic: json!({
                "type": "template",
                "resolved": resolved,
                "passed": passed,
            }),
        })
    }
}

/// Loose equality: strict value equality, or case-insensitive equality of the
/// string forms.
fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || stringify_value(a).to_lowercase() == stringify_value(b).to_lowercase()
}

fn lower(value: &Value) -> String {
    stringify_value(value).to_lowercase()
}

fn numeric(a: &Value, b: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn in_list(current: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(options) => options.iter().any(|option| loose_eq(current, option)),
        _ => false,
    }
}

/// Nulls and the empty string both count as null.
fn is_nullish(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}
