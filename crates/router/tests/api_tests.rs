//! Integration tests for the gateway API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use router_lib::{
    agent::{AgentHandle, AgentSlot, RequestExecutor, INITIALIZING_MESSAGE},
    health::{components, HealthRegistry},
    llm::{self, ChatMessage, ChatModel, ChatResponse, Role, ToolDefinition, Usage},
    mcp::{self, ToolOutput, ToolProvider},
    models::ToolSpec,
    observability::AgentMetrics,
};
use serde_json::Value;
use std::sync::Arc;
use tool_router::api::{create_router, AppState};
use tower::ServiceExt;

/// Answers every conversation with the last user message, shouted
struct ShoutingModel;

#[async_trait]
impl ChatModel for ShoutingModel {
    fn name(&self) -> &str {
        "shouting"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> llm::Result<ChatResponse> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: last.to_uppercase(),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            usage: Usage::default(),
            finish_reason: "stop".into(),
        })
    }
}

struct NoTools;

#[async_trait]
impl ToolProvider for NoTools {
    async fn list_tools(&self) -> mcp::Result<Vec<ToolSpec>> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> mcp::Result<ToolOutput> {
        Err(mcp::McpError::UnknownTool(name.to_string()))
    }
}

fn spec(name: &str, backend: &str) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({"type": "object"}),
        backend: backend.into(),
    }
}

fn handle(generation: u64, specs: Vec<ToolSpec>) -> Arc<AgentHandle> {
    Arc::new(AgentHandle::new(
        generation,
        Arc::new(ShoutingModel),
        Arc::new(NoTools),
        specs,
        8,
    ))
}

async fn setup_test_app() -> (Router, Arc<AgentSlot>, HealthRegistry) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::BOOTSTRAP).await;
    health_registry.register(components::SAMPLER).await;

    let slot = Arc::new(AgentSlot::new());
    let metrics = AgentMetrics::new();
    let executor = RequestExecutor::new(slot.clone()).with_metrics(metrics.clone());
    let state = Arc::new(AppState::new(health_registry.clone(), metrics, executor));

    (create_router(state), slot, health_registry)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn chat_request(form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/get")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_chat_while_initializing() {
    let (app, _slot, _health) = setup_test_app().await;

    let response = app.oneshot(chat_request("msg=hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, INITIALIZING_MESSAGE);
}

#[tokio::test]
async fn test_chat_with_published_agent() {
    let (app, slot, _health) = setup_test_app().await;
    slot.publish(handle(1, vec![spec("add", "math")]));

    let response = app
        .oneshot(chat_request("msg=what+is+the+weather%3F"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "WHAT IS THE WEATHER?");
}

#[tokio::test]
async fn test_chat_without_msg_field() {
    let (app, _slot, _health) = setup_test_app().await;

    let response = app.oneshot(chat_request("text=hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Error: missing form field 'msg'");
}

#[tokio::test]
async fn test_status_not_initialized() {
    let (app, _slot, _health) = setup_test_app().await;

    let response = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "not_initialized");
}

#[tokio::test]
async fn test_status_reports_published_generation() {
    let (app, slot, _health) = setup_test_app().await;
    slot.publish(handle(1, vec![spec("add", "math")]));
    slot.publish(handle(
        2,
        vec![spec("add", "math"), spec("get_weather", "weather")],
    ));

    let response = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["data"]["generation"], 2);
    assert_eq!(body["data"]["model"], "shouting");
    assert_eq!(body["data"]["tools"], serde_json::json!(["add", "get_weather"]));
}

#[tokio::test]
async fn test_status_internal_error_without_tools() {
    let (app, slot, _health) = setup_test_app().await;
    slot.publish(handle(1, Vec::new()));

    let response = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["code"], "internal_error");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, _slot, health) = setup_test_app().await;
    health
        .set_degraded(components::SAMPLER, "Utilization read failed")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, _slot, health) = setup_test_app().await;
    health
        .set_unhealthy(components::BOOTSTRAP, "GROQ_API_KEY not set")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_publication() {
    let (app, _slot, health) = setup_test_app().await;

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    health.mark_published(1).await;

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["ready"], true);
    assert_eq!(body["generation"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _slot, _health) = setup_test_app().await;

    // Serve one request so the request counter has a sample
    let _ = app.clone().oneshot(chat_request("msg=hi")).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("tool_router_requests_total"));
}
