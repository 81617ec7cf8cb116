//! Ports implemented by adapters and infrastructure.

pub mod automation_repository;
pub mod execution_repository;
pub mod onstaq_api;
pub mod trigger_state_repository;
pub mod webhook_repository;

pub use automation_repository::{AutomationFilter, AutomationRepository};
pub use execution_repository::{ExecutionFilter, ExecutionRepository};
pub use onstaq_api::OnstaqApi;
pub use trigger_state_repository::TriggerStateRepository;
pub use webhook_repository::WebhookRepository;
