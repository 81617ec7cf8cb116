//! Shared helpers for integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use onstaq_automation::adapters::sqlite::{
    create_test_pool, all_embedded_migrations, Migrator, SqliteAutomationRepository,
    SqliteExecutionRepository, SqliteTriggerStateRepository,
};
use onstaq_automation::domain::errors::DomainResult;
use onstaq_automation::domain::models::{
    AttributeDef, Automation, Catalog, Comment, Component, HistoryEntry, ImportSummary, Item,
    ListParams, QueryResult, Reference, Trigger, TriggerEvent, User, WorkspaceMember,
};
use onstaq_automation::domain::ports::{
    AutomationRepository, ExecutionRepository, OnstaqApi, TriggerStateRepository,
};
use onstaq_automation::infrastructure::onstaq::InMemoryOnstaq;
use onstaq_automation::services::{
    RuleProgramExecutor, TemplateResolver, TriggerSink,
};

pub const WORKSPACE: &str = "ws-1";

pub struct TestEngine {
    pub api: Arc<InMemoryOnstaq>,
    pub automation_repo: Arc<dyn AutomationRepository>,
    pub execution_repo: Arc<dyn ExecutionRepository>,
    pub trigger_state_repo: Arc<dyn TriggerStateRepository>,
    pub executor: Arc<RuleProgramExecutor>,
}

/// An executor wired to an in-memory upstream and an in-memory SQLite store.
pub async fn engine_with_capacity(max_concurrent: usize) -> TestEngine {
    let api = Arc::new(InMemoryOnstaq::new());
    engine_with_api(api, max_concurrent).await
}

pub async fn engine_with_api(api: Arc<InMemoryOnstaq>, max_concurrent: usize) -> TestEngine {
    let api_dyn: Arc<dyn OnstaqApi> = api.clone();
    engine_with_dyn_api(api, api_dyn, max_concurrent).await
}

pub async fn engine_with_dyn_api(
    api: Arc<InMemoryOnstaq>,
    api_dyn: Arc<dyn OnstaqApi>,
    max_concurrent: usize,
) -> TestEngine {
    let pool = create_test_pool().await.expect("test pool");
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .expect("migrations");

    let automation_repo: Arc<dyn AutomationRepository> =
        Arc::new(SqliteAutomationRepository::new(pool.clone()));
    let execution_repo: Arc<dyn ExecutionRepository> =
        Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let trigger_state_repo: Arc<dyn TriggerStateRepository> =
        Arc::new(SqliteTriggerStateRepository::new(pool.clone()));

    let resolver = Arc::new(TemplateResolver::new(api_dyn.clone()));
    let executor = Arc::new(RuleProgramExecutor::new(
        automation_repo.clone(),
        execution_repo.clone(),
        api_dyn,
        resolver,
        max_concurrent,
    ));

    TestEngine {
        api,
        automation_repo,
        execution_repo,
        trigger_state_repo,
        executor,
    }
}

pub fn rule(trigger: Trigger, components: Vec<Component>) -> Automation {
    Automation {
        id: Uuid::new_v4(),
        name: "test rule".to_string(),
        description: None,
        workspace_id: WORKSPACE.to_string(),
        workspace_key: None,
        enabled: true,
        trigger,
        components,
        execution_order: 0,
        created_by: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Records dispatched trigger events instead of executing them.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(String, TriggerEvent)>>,
}

impl RecordingSink {
    pub async fn count(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl TriggerSink for RecordingSink {
    async fn dispatch(&self, automation: Automation, event: TriggerEvent) -> DomainResult<Uuid> {
        self.events.lock().await.push((automation.name, event));
        Ok(Uuid::new_v4())
    }
}

/// Delegating upstream that slows `add_comment` and records the maximum
/// number of concurrent calls, for concurrency-gate assertions.
pub struct CountingApi {
    pub inner: Arc<InMemoryOnstaq>,
    pub delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl CountingApi {
    pub fn new(inner: Arc<InMemoryOnstaq>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn observed_max(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnstaqApi for CountingApi {
    async fn get_me(&self) -> DomainResult<User> {
        self.inner.get_me().await
    }

    async fn validate_token(&self, token: &str) -> DomainResult<User> {
        self.inner.validate_token(token).await
    }

    async fn list_items(&self, catalog_id: &str, params: &ListParams) -> DomainResult<Vec<Item>> {
        self.inner.list_items(catalog_id, params).await
    }

    async fn get_item(&self, item_id: &str) -> DomainResult<Item> {
        self.inner.get_item(item_id).await
    }

    async fn find_item_by_key(&self, workspace_id: &str, key: &str) -> DomainResult<Option<Item>> {
        self.inner.find_item_by_key(workspace_id, key).await
    }

    async fn create_item(
        &self,
        catalog_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        self.inner.create_item(catalog_id, attributes).await
    }

    async fn update_item(
        &self,
        item_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        self.inner.update_item(item_id, attributes).await
    }

    async fn delete_item(&self, item_id: &str) -> DomainResult<()> {
        self.inner.delete_item(item_id).await
    }

    async fn import_items(
        &self,
        catalog_id: &str,
        rows: &[BTreeMap<String, Value>],
        key_column: Option<&str>,
    ) -> DomainResult<ImportSummary> {
        self.inner.import_items(catalog_id, rows, key_column).await
    }

    async fn list_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        self.inner.list_references(item_id).await
    }

    async fn list_back_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        self.inner.list_back_references(item_id).await
    }

    async fn create_reference(
        &self,
        from_item_id: &str,
        to_item_id: &str,
        kind: &str,
        label: Option<&str>,
    ) -> DomainResult<Reference> {
        self.inner
            .create_reference(from_item_id, to_item_id, kind, label)
            .await
    }

    async fn delete_reference(&self, item_id: &str, reference_id: &str) -> DomainResult<()> {
        self.inner.delete_reference(item_id, reference_id).await
    }

    async fn list_history(&self, item_id: &str) -> DomainResult<Vec<HistoryEntry>> {
        self.inner.list_history(item_id).await
    }

    async fn list_comments(&self, item_id: &str) -> DomainResult<Vec<Comment>> {
        self.inner.list_comments(item_id).await
    }

    async fn add_comment(&self, item_id: &str, body: &str) -> DomainResult<Comment> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.add_comment(item_id, body).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_catalogs(&self, workspace_id: &str) -> DomainResult<Vec<Catalog>> {
        self.inner.list_catalogs(workspace_id).await
    }

    async fn get_catalog(&self, catalog_id: &str) -> DomainResult<Catalog> {
        self.inner.get_catalog(catalog_id).await
    }

    async fn create_catalog(
        &self,
        workspace_id: &str,
        name: &str,
        options: &Value,
    ) -> DomainResult<Catalog> {
        self.inner.create_catalog(workspace_id, name, options).await
    }

    async fn create_attribute(
        &self,
        catalog_id: &str,
        name: &str,
        attribute_type: &str,
        options: &Value,
    ) -> DomainResult<AttributeDef> {
        self.inner
            .create_attribute(catalog_id, name, attribute_type, options)
            .await
    }

    async fn add_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> DomainResult<WorkspaceMember> {
        self.inner
            .add_workspace_member(workspace_id, user_id, role)
            .await
    }

    async fn execute_query(&self, workspace_id: &str, query: &str) -> DomainResult<QueryResult> {
        self.inner.execute_query(workspace_id, query).await
    }
}
