//! HTTP surface tests: auth, rule CRUD, manual execution, and the webhook
//! inbound route, driven through the router without binding a socket.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{engine_with_capacity, TestEngine, WORKSPACE};
use onstaq_automation::domain::models::{EngineConfig, User, WebhookSubscription};
use onstaq_automation::domain::ports::{OnstaqApi, WebhookRepository};
use onstaq_automation::infrastructure::http::{build_router, webhooks, AppState};
use onstaq_automation::services::{TriggerManager, TriggerSink};

const TOKEN: &str = "caller-token";

struct HttpHarness {
    router: Router,
    engine: TestEngine,
    webhook_repo: Arc<dyn WebhookRepository>,
}

async fn http_harness() -> HttpHarness {
    let engine = engine_with_capacity(4).await;
    engine
        .api
        .seed_token(
            TOKEN,
            User {
                id: "u1".to_string(),
                email: "ops@onstaq.test".to_string(),
                name: None,
            },
        )
        .await;

    let pool = onstaq_automation::adapters::sqlite::create_test_pool()
        .await
        .expect("pool");
    onstaq_automation::adapters::sqlite::Migrator::new(pool.clone())
        .run_embedded_migrations(onstaq_automation::adapters::sqlite::all_embedded_migrations())
        .await
        .expect("migrations");
    let webhook_repo: Arc<dyn WebhookRepository> = Arc::new(
        onstaq_automation::adapters::sqlite::SqliteWebhookRepository::new(pool),
    );

    let api_dyn: Arc<dyn OnstaqApi> = engine.api.clone();
    let sink: Arc<dyn TriggerSink> = engine.executor.clone();
    let trigger_manager = TriggerManager::new(
        api_dyn.clone(),
        engine.trigger_state_repo.clone(),
        sink,
        &EngineConfig::default(),
    );

    let state = AppState {
        automation_repo: engine.automation_repo.clone(),
        execution_repo: engine.execution_repo.clone(),
        webhook_repo: webhook_repo.clone(),
        trigger_state_repo: engine.trigger_state_repo.clone(),
        api: api_dyn,
        executor: engine.executor.clone(),
        trigger_manager,
    };

    HttpHarness {
        router: build_router(state),
        engine,
        webhook_repo,
    }
}

fn authed(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts.headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {TOKEN}").parse().unwrap(),
    );
    Request::from_parts(parts, body)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn health_is_public() {
    let harness = http_harness().await;
    let response = harness
        .router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer() {
    let harness = http_harness().await;

    let missing = harness
        .router
        .clone()
        .oneshot(Request::get("/api/automations").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = harness
        .router
        .oneshot(
            Request::get("/api/automations")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(wrong).await;
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn create_execute_and_inspect_a_rule() {
    let harness = http_harness().await;
    let catalog = harness.engine.api.seed_catalog(WORKSPACE, "Ticket").await;
    let item = harness
        .engine
        .api
        .seed_item(
            &catalog.id,
            WORKSPACE,
            BTreeMap::from([("Reporter".to_string(), json!("Alice"))]),
        )
        .await;

    let payload = json!({
        "name": "echo",
        "workspaceId": WORKSPACE,
        "trigger": { "type": "manual" },
        "components": [{
            "id": "c1",
            "componentType": "action",
            "action": {
                "type": "comment.add",
                "config": { "body": "Thanks, {{trigger.item.attributes.Reporter}}" }
            }
        }]
    });

    let created = harness
        .router
        .clone()
        .oneshot(authed(
            Request::post("/api/automations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created_body = body_json(created).await;
    let rule_id = created_body["id"].as_str().unwrap().to_string();

    let executed = harness
        .router
        .clone()
        .oneshot(authed(
            Request::post(format!("/api/automations/{rule_id}/execute"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "parameters": { "itemId": item.id } }).to_string(),
                ))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(executed.status(), StatusCode::OK);
    let execution_id = body_json(executed).await["executionId"]
        .as_str()
        .unwrap()
        .to_string();

    let fetched = harness
        .router
        .clone()
        .oneshot(authed(
            Request::get(format!("/api/executions/{execution_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let execution = body_json(fetched).await;
    assert_eq!(execution["status"], json!("SUCCESS"));

    let comments = harness.engine.api.comments_for(&item.id).await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].body, "Thanks, Alice");

    let stats = harness
        .router
        .oneshot(authed(
            Request::get(format!("/api/executions/stats/{rule_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let stats = body_json(stats).await;
    assert_eq!(stats["total"], json!(1));
    assert_eq!(stats["succeeded"], json!(1));
}

#[tokio::test]
async fn invalid_rules_are_rejected_with_400() {
    let harness = http_harness().await;

    // NOT with two children fails validation.
    let payload = json!({
        "name": "broken",
        "workspaceId": WORKSPACE,
        "trigger": { "type": "manual" },
        "components": [{
            "id": "c1",
            "componentType": "condition",
            "condition": {
                "type": "not",
                "conditions": [
                    { "type": "template", "template": "{{a}}" },
                    { "type": "template", "template": "{{b}}" }
                ]
            }
        }]
    });

    let response = harness
        .router
        .oneshot(authed(
            Request::post("/api/automations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("VALIDATION_FAILED"));
}

#[tokio::test]
async fn legacy_condition_action_payloads_are_accepted() {
    let harness = http_harness().await;

    let payload = json!({
        "name": "legacy",
        "workspaceId": WORKSPACE,
        "trigger": { "type": "manual" },
        "conditions": { "type": "template", "template": "{{trigger.type}}" },
        "actions": [
            { "type": "log", "config": { "message": "migrated" } }
        ]
    });

    let response = harness
        .router
        .oneshot(authed(
            Request::post("/api/automations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let components = body["components"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["componentType"], json!("condition"));
    assert_eq!(components[1]["componentType"], json!("action"));
}

#[tokio::test]
async fn webhook_inbound_verifies_signature_and_filter() {
    let harness = http_harness().await;

    let secret = "whsec-1";
    let now = Utc::now();
    harness
        .webhook_repo
        .create(&WebhookSubscription {
            id: Uuid::new_v4(),
            url: "https://example.test".to_string(),
            events: vec!["webhook.received".to_string()],
            secret: secret.to_string(),
            active: true,
            metadata: Some(json!({ "path": "sync" })),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let rule_payload = json!({
        "name": "webhook rule",
        "workspaceId": WORKSPACE,
        "trigger": { "type": "webhook.received", "path": "sync", "filter": { "kind": "ping" } },
        "components": []
    });
    let created = harness
        .router
        .clone()
        .oneshot(authed(
            Request::post("/api/automations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(rule_payload.to_string()))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let body = json!({ "kind": "ping", "n": 1 }).to_string();
    let signature = webhooks::sign(secret, body.as_bytes());

    let accepted = harness
        .router
        .clone()
        .oneshot(
            Request::post("/api/webhooks/inbound/sync")
                .header(header::CONTENT_TYPE, "application/json")
                .header(webhooks::SIGNATURE_HEADER, &signature)
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(body_json(accepted).await["accepted"], json!(1));

    // Filter mismatch: authenticated but routed to zero rules.
    let other = json!({ "kind": "pong" }).to_string();
    let other_signature = webhooks::sign(secret, other.as_bytes());
    let filtered = harness
        .router
        .clone()
        .oneshot(
            Request::post("/api/webhooks/inbound/sync")
                .header(webhooks::SIGNATURE_HEADER, &other_signature)
                .body(Body::from(other))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(filtered).await["accepted"], json!(0));

    // Bad signature: rejected outright.
    let forged = harness
        .router
        .oneshot(
            Request::post("/api/webhooks/inbound/sync")
                .header(webhooks::SIGNATURE_HEADER, "deadbeef")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enable_disable_round_trip() {
    let harness = http_harness().await;

    let payload = json!({
        "name": "toggle",
        "workspaceId": WORKSPACE,
        "trigger": { "type": "manual" },
        "components": []
    });
    let created = harness
        .router
        .clone()
        .oneshot(authed(
            Request::post("/api/automations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        ))
        .await
        .unwrap();
    let rule_id = body_json(created).await["id"].as_str().unwrap().to_string();

    let disabled = harness
        .router
        .clone()
        .oneshot(authed(
            Request::post(format!("/api/automations/{rule_id}/disable"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(disabled.status(), StatusCode::OK);

    let fetched = harness
        .router
        .oneshot(authed(
            Request::get(format!("/api/automations/{rule_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(fetched).await["enabled"], json!(false));
}
