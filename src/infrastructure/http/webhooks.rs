//! Inbound webhook routing.
//!
//! Deliveries are authenticated with HMAC-SHA256 over the raw JSON body
//! against the `X-Webhook-Signature` header (constant-time compare via the
//! MAC verify), matched to a subscription by path, then fanned out to every
//! enabled rule with a matching `webhook.received` trigger.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::domain::models::{Trigger, TriggerEvent};
use crate::domain::ports::AutomationFilter;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

pub async fn inbound_with_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    inbound(state, Some(path), &headers, &body).await
}

pub async fn inbound_root(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    inbound(state, None, &headers, &body).await
}

async fn inbound(
    state: AppState,
    path: Option<String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing webhook signature"))?;

    let subscriptions = state.webhook_repo.list_active().await?;
    let authorized = subscriptions
        .iter()
        .filter(|s| s.path() == path.as_deref())
        .any(|s| verify_signature(&s.secret, body, signature));
    if !authorized {
        return Err(ApiError::unauthorized("invalid webhook signature"));
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;

    let rules = state
        .automation_repo
        .list(AutomationFilter {
            enabled: Some(true),
            ..AutomationFilter::default()
        })
        .await?;

    // Rules sharing a trigger fire in execution order.
    let mut accepted = 0;
    for rule in rules {
        let Trigger::WebhookReceived {
            path: rule_path,
            filter,
        } = &rule.trigger
        else {
            continue;
        };
        if rule_path.as_deref() != path.as_deref() {
            continue;
        }
        if let Some(filter) = filter {
            let matches = filter
                .iter()
                .all(|(key, expected)| payload.get(key) == Some(expected));
            if !matches {
                debug!(automation = %rule.name, "webhook filter mismatch");
                continue;
            }
        }

        accepted += 1;
        let executor = state.executor.clone();
        let event = TriggerEvent::webhook(payload.clone());
        tokio::spawn(async move {
            let name = rule.name.clone();
            if let Err(e) = executor.execute(&rule, event).await {
                warn!(automation = %name, error = %e, "webhook-triggered execution failed");
            }
        });
    }

    Ok(Json(json!({ "accepted": accepted })))
}

/// Constant-time signature check. Accepts an optional `sha256=` prefix and a
/// hex-encoded digest.
fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the hex signature for a payload; used by tests and by operators
/// registering new subscriptions.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let secret = "s3cret";
        let body = br#"{"event": "ping"}"#;
        let signature = sign(secret, body);

        assert!(verify_signature(secret, body, &signature));
        assert!(verify_signature(secret, body, &format!("sha256={signature}")));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature(secret, b"tampered", &signature));
        assert!(!verify_signature(secret, body, "not-hex"));
    }
}
