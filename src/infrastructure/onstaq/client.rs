//! HTTP client for the upstream Onstaq REST surface.
//!
//! Authenticates with the engine's service account (`login` on first use,
//! one re-login on 401), rate-limits and retries transient failures, and
//! keeps a single pooled connection set for every poller and action.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::error::OnstaqApiError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::ApiConfig;
use crate::domain::models::{
    AttributeDef, Catalog, Comment, HistoryEntry, ImportSummary, Item, ListParams, QueryResult,
    Reference, SortOrder, User, WorkspaceMember,
};
use crate::domain::ports::OnstaqApi;

pub struct OnstaqClient {
    http: ReqwestClient,
    base_url: String,
    credentials: Option<(String, String)>,
    token: RwLock<Option<String>>,
    rate_limiter: TokenBucketRateLimiter,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct ReferencesPage {
    references: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    entries: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct CommentsPage {
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct CatalogsPage {
    catalogs: Vec<Catalog>,
}

impl OnstaqClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;

        let credentials = if config.service_email.is_empty() {
            None
        } else {
            Some((config.service_email.clone(), config.service_password.clone()))
        };

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
            token: RwLock::new(None),
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rps),
            retry: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        })
    }

    /// A client with an injected bearer token instead of service credentials.
    pub fn with_token(config: &ApiConfig, token: String) -> anyhow::Result<Self> {
        let client = Self::new(config)?;
        Ok(Self {
            token: RwLock::new(Some(token)),
            credentials: None,
            ..client
        })
    }

    async fn login(&self) -> Result<(), OnstaqApiError> {
        let Some((email, password)) = &self.credentials else {
            return Err(OnstaqApiError::AuthFailed(
                "no service credentials configured".to_string(),
            ));
        };

        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OnstaqApiError::from_status(status, body));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| OnstaqApiError::UnexpectedResponse(e.to_string()))?;
        *self.token.write().await = Some(login.token);
        debug!("upstream login succeeded");
        Ok(())
    }

    async fn try_send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        token_override: Option<&str>,
    ) -> Result<T, OnstaqApiError> {
        let token = match token_override {
            Some(token) => Some(token.to_string()),
            None => {
                if self.token.read().await.is_none() && self.credentials.is_some() {
                    self.login().await?;
                }
                self.token.read().await.clone()
            }
        };

        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OnstaqApiError::from_status(status, body));
        }

        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(Value::Null)
                .map_err(|e| OnstaqApiError::UnexpectedResponse(e.to_string()));
        }

        response
            .json()
            .await
            .map_err(|e| OnstaqApiError::UnexpectedResponse(e.to_string()))
    }

    /// Rate-limited, retried request. A 401 triggers exactly one re-login.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T, OnstaqApiError> {
        self.rate_limiter.acquire().await;

        let attempt = self
            .retry
            .execute(|| self.try_send(method.clone(), path, query, body, None))
            .await;

        match attempt {
            Err(e) if e.is_auth() && self.credentials.is_some() => {
                self.login().await?;
                self.try_send(method, path, query, body, None).await
            }
            other => other,
        }
    }

    fn list_query(params: &ListParams) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(sort_by) = &params.sort_by {
            query.push(("sortBy".to_string(), sort_by.clone()));
        }
        if let Some(sort_order) = params.sort_order {
            let order = match sort_order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            query.push(("sortOrder".to_string(), order.to_string()));
        }
        if let Some(page) = params.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = params.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(search) = &params.search {
            query.push(("search".to_string(), search.clone()));
        }
        for (name, value) in &params.filters {
            query.push((name.clone(), value.clone()));
        }
        query
    }
}

#[async_trait]
impl OnstaqApi for OnstaqClient {
    async fn get_me(&self) -> DomainResult<User> {
        Ok(self
            .request(Method::GET, "/api/auth/me", &[], None)
            .await?)
    }

    async fn validate_token(&self, token: &str) -> DomainResult<User> {
        self.try_send(Method::GET, "/api/auth/me", &[], None, Some(token))
            .await
            .map_err(|e| match e {
                OnstaqApiError::AuthFailed(msg) => DomainError::UpstreamAuthFailed(msg),
                other => other.into(),
            })
    }

    async fn list_items(&self, catalog_id: &str, params: &ListParams) -> DomainResult<Vec<Item>> {
        let page: ItemsPage = self
            .request(
                Method::GET,
                &format!("/api/catalogs/{catalog_id}/items"),
                &Self::list_query(params),
                None,
            )
            .await?;
        Ok(page.items)
    }

    async fn get_item(&self, item_id: &str) -> DomainResult<Item> {
        self.request(Method::GET, &format!("/api/items/{item_id}"), &[], None)
            .await
            .map_err(|e| match e {
                OnstaqApiError::NotFound(_) => DomainError::ItemNotFound(item_id.to_string()),
                other => other.into(),
            })
    }

    async fn find_item_by_key(&self, workspace_id: &str, key: &str) -> DomainResult<Option<Item>> {
        let page: ItemsPage = self
            .request(
                Method::GET,
                &format!("/api/workspaces/{workspace_id}/items"),
                &Self::list_query(&ListParams::by_key(key)),
                None,
            )
            .await?;
        Ok(page.items.into_iter().next())
    }

    async fn create_item(
        &self,
        catalog_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/catalogs/{catalog_id}/items"),
                &[],
                Some(&json!({ "attributes": attributes })),
            )
            .await?)
    }

    async fn update_item(
        &self,
        item_id: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> DomainResult<Item> {
        self.request(
            Method::PATCH,
            &format!("/api/items/{item_id}"),
            &[],
            Some(&json!({ "attributes": attributes })),
        )
        .await
        .map_err(|e| match e {
            OnstaqApiError::NotFound(_) => DomainError::ItemNotFound(item_id.to_string()),
            other => other.into(),
        })
    }

    async fn delete_item(&self, item_id: &str) -> DomainResult<()> {
        let _: Value = self
            .request(Method::DELETE, &format!("/api/items/{item_id}"), &[], None)
            .await
            .map_err(|e| match e {
                OnstaqApiError::NotFound(_) => DomainError::ItemNotFound(item_id.to_string()),
                other => DomainError::from(other),
            })?;
        Ok(())
    }

    async fn import_items(
        &self,
        catalog_id: &str,
        rows: &[BTreeMap<String, Value>],
        key_column: Option<&str>,
    ) -> DomainResult<ImportSummary> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/catalogs/{catalog_id}/items/import"),
                &[],
                Some(&json!({ "rows": rows, "keyColumn": key_column })),
            )
            .await?)
    }

    async fn list_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        let page: ReferencesPage = self
            .request(
                Method::GET,
                &format!("/api/items/{item_id}/references"),
                &[],
                None,
            )
            .await?;
        Ok(page.references)
    }

    async fn list_back_references(&self, item_id: &str) -> DomainResult<Vec<Reference>> {
        let page: ReferencesPage = self
            .request(
                Method::GET,
                &format!("/api/items/{item_id}/back-references"),
                &[],
                None,
            )
            .await?;
        Ok(page.references)
    }

    async fn create_reference(
        &self,
        from_item_id: &str,
        to_item_id: &str,
        kind: &str,
        label: Option<&str>,
    ) -> DomainResult<Reference> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/items/{from_item_id}/references"),
                &[],
                Some(&json!({ "toItemId": to_item_id, "kind": kind, "label": label })),
            )
            .await?)
    }

    async fn delete_reference(&self, item_id: &str, reference_id: &str) -> DomainResult<()> {
        let _: Value = self
            .request(
                Method::DELETE,
                &format!("/api/items/{item_id}/references/{reference_id}"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }

    async fn list_history(&self, item_id: &str) -> DomainResult<Vec<HistoryEntry>> {
        let page: HistoryPage = self
            .request(
                Method::GET,
                &format!("/api/items/{item_id}/history"),
                &[],
                None,
            )
            .await?;
        Ok(page.entries)
    }

    async fn list_comments(&self, item_id: &str) -> DomainResult<Vec<Comment>> {
        let page: CommentsPage = self
            .request(
                Method::GET,
                &format!("/api/items/{item_id}/comments"),
                &[],
                None,
            )
            .await?;
        Ok(page.comments)
    }

    async fn add_comment(&self, item_id: &str, body: &str) -> DomainResult<Comment> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/items/{item_id}/comments"),
                &[],
                Some(&json!({ "body": body })),
            )
            .await?)
    }

    async fn list_catalogs(&self, workspace_id: &str) -> DomainResult<Vec<Catalog>> {
        let page: CatalogsPage = self
            .request(
                Method::GET,
                &format!("/api/workspaces/{workspace_id}/catalogs"),
                &[],
                None,
            )
            .await?;
        Ok(page.catalogs)
    }

    async fn get_catalog(&self, catalog_id: &str) -> DomainResult<Catalog> {
        self.request(
            Method::GET,
            &format!("/api/catalogs/{catalog_id}"),
            &[],
            None,
        )
        .await
        .map_err(|e| match e {
            OnstaqApiError::NotFound(_) => DomainError::CatalogNotFound(catalog_id.to_string()),
            other => other.into(),
        })
    }

    async fn create_catalog(
        &self,
        workspace_id: &str,
        name: &str,
        options: &Value,
    ) -> DomainResult<Catalog> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/workspaces/{workspace_id}/catalogs"),
                &[],
                Some(&json!({ "name": name, "options": options })),
            )
            .await?)
    }

    async fn create_attribute(
        &self,
        catalog_id: &str,
        name: &str,
        attribute_type: &str,
        options: &Value,
    ) -> DomainResult<AttributeDef> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/catalogs/{catalog_id}/attributes"),
                &[],
                Some(&json!({ "name": name, "type": attribute_type, "options": options })),
            )
            .await?)
    }

    async fn add_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> DomainResult<WorkspaceMember> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/workspaces/{workspace_id}/members"),
                &[],
                Some(&json!({ "userId": user_id, "role": role })),
            )
            .await?)
    }

    async fn execute_query(&self, workspace_id: &str, query: &str) -> DomainResult<QueryResult> {
        Ok(self
            .request(
                Method::POST,
                &format!("/api/workspaces/{workspace_id}/query"),
                &[],
                Some(&json!({ "query": query })),
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            url: base_url.to_string(),
            service_email: "svc@onstaq.test".to_string(),
            service_password: "hunter2".to_string(),
            timeout_secs: 5,
            rate_limit_rps: 100.0,
            max_retries: 1,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_login_then_get_item() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_body(r#"{"token": "tok-1"}"#)
            .create_async()
            .await;
        let item = server
            .mock("GET", "/api/items/itm-1")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(
                r#"{
                    "id": "itm-1", "catalogId": "cat-1", "workspaceId": "ws-1",
                    "attributeValues": {"Priority": "High"},
                    "createdAt": "2026-01-01T00:00:00Z",
                    "updatedAt": "2026-01-01T00:00:00Z"
                }"#,
            )
            .create_async()
            .await;

        let client = OnstaqClient::new(&test_config(&server.url())).unwrap();
        let loaded = client.get_item("itm-1").await.unwrap();
        assert_eq!(loaded.id, "itm-1");
        assert_eq!(loaded.attribute_values["Priority"], json!("High"));

        login.assert_async().await;
        item.assert_async().await;
    }

    #[tokio::test]
    async fn test_404_maps_to_item_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_body(r#"{"token": "tok-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/items/ghost")
            .with_status(404)
            .with_body("missing")
            .create_async()
            .await;

        let client = OnstaqClient::new(&test_config(&server.url())).unwrap();
        assert!(matches!(
            client.get_item("ghost").await,
            Err(DomainError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_body(r#"{"token": "tok-1"}"#)
            .create_async()
            .await;
        let rejected = server
            .mock("POST", "/api/workspaces/ws-1/query")
            .with_status(400)
            .with_body("bad query")
            .expect(1)
            .create_async()
            .await;

        let client = OnstaqClient::new(&test_config(&server.url())).unwrap();
        assert!(client.execute_query("ws-1", "FROM x").await.is_err());

        // Exactly one hit: 400s must not be retried.
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_token_forwards_caller_token() {
        let mut server = mockito::Server::new_async().await;
        let accepted = server
            .mock("GET", "/api/auth/me")
            .match_header("authorization", "Bearer caller-token")
            .with_status(200)
            .with_body(r#"{"id": "u9", "email": "caller@onstaq.test"}"#)
            .create_async()
            .await;
        let rejected = server
            .mock("GET", "/api/auth/me")
            .match_header("authorization", "Bearer stale-token")
            .with_status(401)
            .with_body("expired")
            .create_async()
            .await;

        let client = OnstaqClient::new(&test_config(&server.url())).unwrap();

        let user = client.validate_token("caller-token").await.unwrap();
        assert_eq!(user.id, "u9");

        assert!(matches!(
            client.validate_token("stale-token").await,
            Err(DomainError::UpstreamAuthFailed(_))
        ));

        accepted.assert_async().await;
        rejected.assert_async().await;
    }
}
