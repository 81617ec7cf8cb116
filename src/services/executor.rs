//! Rule program execution.
//!
//! Walks a rule's component tree with a per-run context, delegating to the
//! condition evaluator and action runner, under a global concurrency gate:
//! at most `max_concurrent` runs in parallel, further arrivals queue FIFO on
//! the semaphore. Every run is persisted PENDING -> RUNNING -> terminal.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActionDef, Automation, BranchDef, BranchType, Component, ComponentResult, ComponentStatus,
    ComponentType, Condition, Execution, ExecutionContext, ExecutionStatus, IfElseDef, Item,
    ReferenceDirection, TriggerEvent,
};
use crate::domain::ports::{AutomationRepository, ExecutionRepository, OnstaqApi};
use crate::services::action_runner::{ActionRunner, ChainInvoker};
use crate::services::condition_evaluator::ConditionEvaluator;
use crate::services::template::TemplateResolver;

/// Upper bound on `automation.trigger` chaining. The source performed no
/// cycle detection; the bound keeps self-triggering rules from recursing
/// unboundedly inside one concurrency slot.
const MAX_CHAIN_DEPTH: u32 = 8;

/// How long `stop()` waits for in-flight runs before giving up.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Dry-run outline returned by [`RuleProgramExecutor::test`].
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutline {
    pub would_execute_components: Vec<String>,
}

/// Executes rule programs under the global concurrency gate.
pub struct RuleProgramExecutor {
    automation_repo: Arc<dyn AutomationRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    api: Arc<dyn OnstaqApi>,
    resolver: Arc<TemplateResolver>,
    condition_evaluator: ConditionEvaluator,
    action_runner: ActionRunner,
    gate: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    running: AtomicBool,
}

impl RuleProgramExecutor {
    pub fn new(
        automation_repo: Arc<dyn AutomationRepository>,
        execution_repo: Arc<dyn ExecutionRepository>,
        api: Arc<dyn OnstaqApi>,
        resolver: Arc<TemplateResolver>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            automation_repo,
            execution_repo,
            api: Arc::clone(&api),
            resolver: Arc::clone(&resolver),
            condition_evaluator: ConditionEvaluator::new(Arc::clone(&api), Arc::clone(&resolver)),
            action_runner: ActionRunner::new(api, resolver),
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
            active: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(true),
        }
    }

    /// Accept new work.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Refuse new work and wait up to 30s for in-flight runs to finish.
    /// Runs in progress are not interrupted.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + STOP_DRAIN_TIMEOUT;
        while self.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    active = self.active.load(Ordering::SeqCst),
                    "stop timed out waiting for in-flight executions"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Currently running executions (excluding queued arrivals).
    pub fn active_executions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Execute a rule for one trigger event. Reserves a concurrency slot
    /// (queuing FIFO when the gate is saturated) and returns once the
    /// execution record is finalized.
    #[instrument(skip(self, automation, event), fields(automation_id = %automation.id))]
    pub async fn execute(
        &self,
        automation: &Automation,
        event: TriggerEvent,
    ) -> DomainResult<Uuid> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DomainError::ShuttingDown);
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DomainError::ShuttingDown)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = self.run_execution(automation, event, 0).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Manual entry point: resolves `parameters.itemId` / `parameters.itemKey`
    /// to an item and runs the rule through the gate.
    pub async fn trigger_manually(
        &self,
        automation_id: Uuid,
        parameters: Option<Value>,
    ) -> DomainResult<Uuid> {
        let automation = self
            .automation_repo
            .get(automation_id)
            .await?
            .ok_or(DomainError::AutomationNotFound(automation_id))?;
        let event = self.build_manual_event(&automation, parameters).await?;
        self.execute(&automation, event).await
    }

    /// Dry-run: outline what would execute, without side effects.
    pub async fn test(
        &self,
        automation_id: Uuid,
        _mock_trigger_data: Option<Value>,
    ) -> DomainResult<TestOutline> {
        let automation = self
            .automation_repo
            .get(automation_id)
            .await?
            .ok_or(DomainError::AutomationNotFound(automation_id))?;

        let mut lines = Vec::new();
        outline_components(&automation.components, 0, &mut lines);
        Ok(TestOutline {
            would_execute_components: lines,
        })
    }

    async fn build_manual_event(
        &self,
        automation: &Automation,
        parameters: Option<Value>,
    ) -> DomainResult<TriggerEvent> {
        let item = match &parameters {
            Some(params) => self.resolve_parameter_item(automation, params).await?,
            None => None,
        };
        Ok(TriggerEvent::manual(item, parameters))
    }

    async fn resolve_parameter_item(
        &self,
        automation: &Automation,
        parameters: &Value,
    ) -> DomainResult<Option<Item>> {
        if let Some(item_id) = parameters.get("itemId").and_then(Value::as_str) {
            return Ok(Some(self.api.get_item(item_id).await?));
        }
        if let Some(key) = parameters.get("itemKey").and_then(Value::as_str) {
            return Ok(self.api.find_item_by_key(&automation.workspace_id, key).await?);
        }
        Ok(None)
    }

    /// The full persisted lifecycle of one run. Uncaught errors from the
    /// component walk finalize the run FAILED; it never stays RUNNING.
    async fn run_execution(
        &self,
        automation: &Automation,
        event: TriggerEvent,
        chain_depth: u32,
    ) -> DomainResult<Uuid> {
        let mut execution = Execution::begin(automation.id, event.clone());
        self.execution_repo.create(&execution).await?;

        execution.status = ExecutionStatus::Running;
        self.execution_repo.update(&execution).await?;

        let mut ctx = ExecutionContext::new(
            automation.id,
            automation.name.clone(),
            automation.workspace_id.clone(),
            event,
        );
        ctx.chain_depth = chain_depth;

        match self.execute_components(&automation.components, &mut ctx).await {
            Ok(results) => execution.finalize(results),
            Err(e) => {
                error!(automation = %automation.name, error = %e, "execution aborted");
                execution.fail(e.to_string());
            }
        }

        self.execution_repo.update(&execution).await?;
        info!(
            automation = %automation.name,
            execution = %execution.id,
            status = execution.status.as_str(),
            "execution finished"
        );
        Ok(execution.id)
    }

    /// Walk a sibling sequence. A false condition skips the rest; a failed
    /// action halts unless `continue_on_error`; branches and if/else never
    /// halt siblings on their own.
    fn execute_components<'a>(
        &'a self,
        components: &'a [Component],
        ctx: &'a mut ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = DomainResult<Vec<ComponentResult>>> + Send + 'a>> {
        Box::pin(async move {
            let mut results = Vec::with_capacity(components.len());

            for component in components {
                let started = Instant::now();
                let (result, halt) = self.execute_component(component, ctx, started).await;
                ctx.component_results.push(result.clone());
                results.push(result);
                if halt {
                    break;
                }
            }

            Ok(results)
        })
    }

    /// Run one component; the boolean is whether the surrounding sequence
    /// must halt.
    async fn execute_component(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
        started: Instant,
    ) -> (ComponentResult, bool) {
        match (component.component_type, component) {
            (ComponentType::Condition, Component { condition: Some(condition), .. }) => {
                let outcome = self.condition_evaluator.evaluate(condition, ctx).await;
                let status = if outcome.passed {
                    ComponentStatus::Success
                } else {
                    ComponentStatus::Skipped
                };
                let result = ComponentResult {
                    component_id: component.id.clone(),
                    component_type: ComponentType::Condition,
                    action_type: None,
                    status,
                    result: Some(outcome.diagnostic),
                    error: None,
                    duration_ms: elapsed_ms(started),
                    children: Vec::new(),
                };
                (result, !outcome.passed)
            }
            (ComponentType::Action, Component { action: Some(action), .. }) => {
                self.execute_action(component, action, ctx, started).await
            }
            (ComponentType::Branch, Component { branch: Some(branch), .. }) => {
                let result = self.execute_branch(component, branch, ctx, started).await;
                (result, false)
            }
            (ComponentType::IfElse, Component { if_else: Some(if_else), .. }) => {
                let result = self.execute_if_else(component, if_else, ctx, started).await;
                (result, false)
            }
            _ => {
                let result = ComponentResult {
                    component_id: component.id.clone(),
                    component_type: component.component_type,
                    action_type: None,
                    status: ComponentStatus::Failed,
                    result: None,
                    error: Some(format!(
                        "component '{}' has no payload for type {}",
                        component.id,
                        component.component_type.as_str()
                    )),
                    duration_ms: elapsed_ms(started),
                    children: Vec::new(),
                };
                (result, true)
            }
        }
    }

    async fn execute_action(
        &self,
        component: &Component,
        action: &ActionDef,
        ctx: &mut ExecutionContext,
        started: Instant,
    ) -> (ComponentResult, bool) {
        match self.action_runner.run(action, ctx, self).await {
            Ok(payload) => {
                let result = ComponentResult {
                    component_id: component.id.clone(),
                    component_type: ComponentType::Action,
                    action_type: Some(action.action_type),
                    status: ComponentStatus::Success,
                    result: Some(payload),
                    error: None,
                    duration_ms: elapsed_ms(started),
                    children: Vec::new(),
                };
                (result, false)
            }
            Err(e) => {
                warn!(
                    automation = %ctx.automation_name,
                    action = action.action_type.as_str(),
                    error = %e,
                    "action failed"
                );
                let result = ComponentResult {
                    component_id: component.id.clone(),
                    component_type: ComponentType::Action,
                    action_type: Some(action.action_type),
                    status: ComponentStatus::Failed,
                    result: None,
                    error: Some(e.to_string()),
                    duration_ms: elapsed_ms(started),
                    children: Vec::new(),
                };
                (result, !action.continue_on_error)
            }
        }
    }

    /// Iterate the branch's item set; children carry the flattened per-item
    /// results. Iteration failures never halt sibling components.
    async fn execute_branch(
        &self,
        component: &Component,
        branch: &BranchDef,
        ctx: &mut ExecutionContext,
        started: Instant,
    ) -> ComponentResult {
        let (children, error) = match self.run_branch_iterations(branch, ctx).await {
            Ok(children) => (children, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let failed =
            error.is_some() || children.iter().any(ComponentResult::any_failed);
        ComponentResult {
            component_id: component.id.clone(),
            component_type: ComponentType::Branch,
            action_type: None,
            status: if failed {
                ComponentStatus::Failed
            } else {
                ComponentStatus::Success
            },
            result: None,
            error,
            duration_ms: elapsed_ms(started),
            children,
        }
    }

    async fn run_branch_iterations(
        &self,
        branch: &BranchDef,
        ctx: &mut ExecutionContext,
    ) -> DomainResult<Vec<ComponentResult>> {
        let items = self.resolve_branch_items(branch, ctx).await?;

        let mut children = Vec::new();
        for item in items {
            let mut child_ctx = ctx.for_item(item);
            let iteration = self
                .execute_components(&branch.components, &mut child_ctx)
                .await?;
            children.extend(iteration);
            ctx.absorb(child_ctx);
        }
        Ok(children)
    }

    async fn resolve_branch_items(
        &self,
        branch: &BranchDef,
        ctx: &ExecutionContext,
    ) -> DomainResult<Vec<Item>> {
        match branch.branch_type {
            BranchType::RelatedItems => {
                let Some(source) = ctx.effective_item() else {
                    warn!(
                        automation = %ctx.automation_name,
                        "related_items branch has no source item"
                    );
                    return Ok(Vec::new());
                };

                let direction = branch.direction.unwrap_or_default();
                let references = match direction {
                    ReferenceDirection::Outbound => self.api.list_references(&source.id).await?,
                    ReferenceDirection::Inbound => {
                        self.api.list_back_references(&source.id).await?
                    }
                };

                let mut items = Vec::new();
                for reference in references {
                    if let Some(kind) = &branch.reference_kind {
                        if !reference.kind.eq_ignore_ascii_case(kind) {
                            continue;
                        }
                    }
                    let target_id = match direction {
                        ReferenceDirection::Outbound => &reference.to_item_id,
                        ReferenceDirection::Inbound => &reference.from_item_id,
                    };
                    let item = self.api.get_item(target_id).await?;
                    if let Some(catalog_id) = &branch.catalog_id {
                        if &item.catalog_id != catalog_id {
                            continue;
                        }
                    }
                    items.push(item);
                }
                Ok(items)
            }
            BranchType::CreatedItems => Ok(ctx.created_items.clone()),
            BranchType::LookupItems => {
                let query = branch.oql_query.as_deref().unwrap_or_default();
                let resolved = self.resolver.resolve_string(query, ctx).await?;
                let result = self.api.execute_query(&ctx.workspace_id, &resolved).await?;

                let mut items = Vec::new();
                for row in result.rows {
                    let id = row
                        .get("id")
                        .or_else(|| row.get("itemId"))
                        .and_then(Value::as_str);
                    if let Some(id) = id {
                        items.push(self.api.get_item(id).await?);
                    }
                }
                Ok(items)
            }
        }
    }

    /// Evaluate the if/else conditions (all must hold) and run whichever arm
    /// applies. `children` records the arm that ran.
    async fn execute_if_else(
        &self,
        component: &Component,
        if_else: &IfElseDef,
        ctx: &mut ExecutionContext,
        started: Instant,
    ) -> ComponentResult {
        let mut passed = true;
        for condition in &if_else.conditions {
            if !self.condition_evaluator.evaluate(condition, ctx).await.passed {
                passed = false;
                break;
            }
        }

        let arm = if passed { &if_else.then } else { &if_else.else_components };

        // Children get their own sibling result list for action[n] indexing;
        // all other context state is shared with the parent.
        let parent_results = std::mem::take(&mut ctx.component_results);
        let outcome = self.execute_components(arm, ctx).await;
        let children = match outcome {
            Ok(children) => children,
            Err(e) => vec![ComponentResult {
                component_id: component.id.clone(),
                component_type: ComponentType::IfElse,
                action_type: None,
                status: ComponentStatus::Failed,
                result: None,
                error: Some(e.to_string()),
                duration_ms: 0,
                children: Vec::new(),
            }],
        };
        ctx.component_results = parent_results;

        let failed = children.iter().any(ComponentResult::any_failed);
        ComponentResult {
            component_id: component.id.clone(),
            component_type: ComponentType::IfElse,
            action_type: None,
            status: if failed {
                ComponentStatus::Failed
            } else {
                ComponentStatus::Success
            },
            result: Some(serde_json::json!({ "branch": if passed { "then" } else { "else" } })),
            error: None,
            duration_ms: elapsed_ms(started),
            children,
        }
    }
}

#[async_trait]
impl crate::services::trigger_manager::TriggerSink for RuleProgramExecutor {
    async fn dispatch(&self, automation: Automation, event: TriggerEvent) -> DomainResult<Uuid> {
        self.execute(&automation, event).await
    }
}

#[async_trait]
impl ChainInvoker for RuleProgramExecutor {
    /// `automation.trigger` recursion. Chained runs execute inside the
    /// parent's concurrency slot; the depth bound is the only cycle guard.
    async fn trigger_chained(
        &self,
        automation_id: Uuid,
        parameters: Option<Value>,
        depth: u32,
    ) -> DomainResult<Uuid> {
        if depth > MAX_CHAIN_DEPTH {
            return Err(DomainError::ChainDepthExceeded(depth));
        }

        let automation = self
            .automation_repo
            .get(automation_id)
            .await?
            .ok_or(DomainError::AutomationNotFound(automation_id))?;
        let event = self.build_manual_event(&automation, parameters).await?;
        self.run_execution(&automation, event, depth).await
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn outline_components(components: &[Component], depth: usize, out: &mut Vec<String>) {
    let pad = "  ".repeat(depth);
    for component in components {
        match (component.component_type, component) {
            (ComponentType::Action, Component { action: Some(action), .. }) => {
                let name = action
                    .name
                    .as_deref()
                    .map(|n| format!(" ({n})"))
                    .unwrap_or_default();
                out.push(format!("{pad}action: {}{name}", action.action_type.as_str()));
            }
            (ComponentType::Condition, Component { condition: Some(condition), .. }) => {
                out.push(format!("{pad}condition: {}", describe_condition(condition)));
            }
            (ComponentType::Branch, Component { branch: Some(branch), .. }) => {
                out.push(format!("{pad}branch: {:?}", branch.branch_type));
                outline_components(&branch.components, depth + 1, out);
            }
            (ComponentType::IfElse, Component { if_else: Some(if_else), .. }) => {
                out.push(format!("{pad}if ({} condition(s))", if_else.conditions.len()));
                outline_components(&if_else.then, depth + 1, out);
                if !if_else.else_components.is_empty() {
                    out.push(format!("{pad}else"));
                    outline_components(&if_else.else_components, depth + 1, out);
                }
            }
            _ => out.push(format!("{pad}invalid component '{}'", component.id)),
        }
    }
}

fn describe_condition(condition: &Condition) -> String {
    match condition {
        Condition::Attribute { field, operator, .. } => {
            format!("attribute '{field}' {operator:?}")
        }
        Condition::Oql { query, .. } => format!("query [{query}]"),
        Condition::Reference { direction, exists, .. } => {
            format!("reference {direction:?} exists={exists}")
        }
        Condition::Template { template } => format!("template [{template}]"),
        Condition::And { conditions } => format!("AND of {}", conditions.len()),
        Condition::Or { conditions } => format!("OR of {}", conditions.len()),
        Condition::Not { .. } => "NOT".to_string(),
    }
}
