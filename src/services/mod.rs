//! Service layer: the trigger manager, rule program executor, and their
//! collaborators.

pub mod action_runner;
pub mod condition_evaluator;
pub mod executor;
pub mod template;
pub mod trigger_manager;

pub use action_runner::{ActionRunner, ChainInvoker};
pub use condition_evaluator::{ConditionEvaluator, ConditionOutcome};
pub use executor::{RuleProgramExecutor, TestOutline};
pub use template::{TemplateError, TemplateResolver};
pub use trigger_manager::{fingerprint, TriggerManager, TriggerSink};
