//! HTTP API: chat submission, agent status, health checks and Prometheus
//! metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use router_lib::{
    agent::RequestExecutor,
    health::{ComponentStatus, HealthRegistry},
    observability::AgentMetrics,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub executor: RequestExecutor,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        executor: RequestExecutor,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            executor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub msg: Option<String>,
}

/// Chat submission: form field `msg` in, plain text out
async fn chat(State(state): State<Arc<AppState>>, Form(form): Form<ChatForm>) -> String {
    match form.msg {
        Some(message) => state.executor.execute(message).await.into_text(),
        None => "Error: missing form field 'msg'".to_string(),
    }
}

#[derive(Debug, Serialize)]
struct AgentStatus {
    generation: u64,
    model: String,
    tools: Vec<String>,
    published_at: String,
}

/// Agent status: 200 with the published generation, 503 while
/// initializing, 500 if the published agent is unusable
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(handle) = state.executor.current() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "error",
                "code": "not_initialized",
                "message": "Agent is still initializing",
            })),
        );
    };

    if handle.tools().is_empty() {
        error!(generation = handle.generation(), "Published agent has no tools");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "code": "internal_error",
                "message": "Published agent has no tools",
            })),
        );
    }

    let data = AgentStatus {
        generation: handle.generation(),
        model: handle.model_name().to_string(),
        tools: handle.tool_names(),
        published_at: handle.published_at().to_rfc3339(),
    };
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "data": data})),
    )
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once an agent is published
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get", post(chat))
        .route("/api/status", get(status))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
