//! Shared state for the HTTP surface.

use std::sync::Arc;

use crate::domain::ports::{
    AutomationRepository, ExecutionRepository, OnstaqApi, TriggerStateRepository, WebhookRepository,
};
use crate::services::{RuleProgramExecutor, TriggerManager};

#[derive(Clone)]
pub struct AppState {
    pub automation_repo: Arc<dyn AutomationRepository>,
    pub execution_repo: Arc<dyn ExecutionRepository>,
    pub webhook_repo: Arc<dyn WebhookRepository>,
    pub trigger_state_repo: Arc<dyn TriggerStateRepository>,
    pub api: Arc<dyn OnstaqApi>,
    pub executor: Arc<RuleProgramExecutor>,
    pub trigger_manager: Arc<TriggerManager>,
}
