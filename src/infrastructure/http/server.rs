//! Router assembly and serving.

use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::auth::require_bearer;
use super::handlers;
use super::state::AppState;
use super::webhooks;

pub fn build_router(state: AppState) -> Router {
    // Webhook inbound authenticates via HMAC; health is public.
    let public = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/webhooks/inbound", post(webhooks::inbound_root))
        .route(
            "/api/webhooks/inbound/:path",
            post(webhooks::inbound_with_path),
        );

    let protected = Router::new()
        .route(
            "/api/automations",
            get(handlers::list_automations).post(handlers::create_automation),
        )
        .route(
            "/api/automations/:id",
            get(handlers::get_automation)
                .put(handlers::update_automation)
                .delete(handlers::delete_automation),
        )
        .route(
            "/api/automations/:id/execute",
            post(handlers::execute_automation),
        )
        .route("/api/automations/:id/test", post(handlers::test_automation))
        .route(
            "/api/automations/:id/enable",
            post(handlers::enable_automation),
        )
        .route(
            "/api/automations/:id/disable",
            post(handlers::disable_automation),
        )
        .route("/api/executions", get(handlers::list_executions))
        .route("/api/executions/:id", get(handlers::get_execution))
        .route(
            "/api/executions/stats/:automationId",
            get(handlers::execution_stats),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the shutdown future resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server error")?;
    Ok(())
}
