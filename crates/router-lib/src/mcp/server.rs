//! MCP server over streamable HTTP
//!
//! Hosts a set of [`ToolHandler`]s on `POST /mcp`. Replies are plain
//! `application/json`; server-initiated streams are not offered, so
//! `GET /mcp` answers 405 to SSE clients and 406 to everyone else.
//!
//! Sessions end on `DELETE /mcp`, after sitting idle past their TTL, or
//! when the table is full and a newer session needs the slot.

use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ToolDescriptor, ToolsCapability, MCP_PROTOCOL_VERSION, SESSION_HEADER,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use moka::{policy::EvictionPolicy, sync::Cache};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a single tool call, reported to the caller as `isError`
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// One callable operation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Idle time after which a session is forgotten
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Most sessions held at once
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

/// Live session ids
///
/// Idle sessions expire after the TTL; when full, the least recently used
/// session makes room for a new one.
struct SessionTable {
    entries: Cache<String, ()>,
}

impl SessionTable {
    fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = Cache::builder()
            .time_to_idle(ttl)
            .max_capacity(capacity.max(1) as u64)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    fn open(&self, id: String) {
        self.entries.insert(id, ());
    }

    /// Refresh a live session. False if it is unknown or has expired.
    fn touch(&self, id: &str) -> bool {
        self.entries.get(id).is_some()
    }

    fn close(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    #[cfg(test)]
    fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

struct ServerState {
    info: Implementation,
    tools: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<String, usize>,
    sessions: SessionTable,
}

/// An MCP server hosting tool handlers
pub struct ToolServer {
    info: Implementation,
    tools: Vec<Arc<dyn ToolHandler>>,
    session_ttl: Duration,
    session_capacity: usize,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            tools: Vec::new(),
            session_ttl: DEFAULT_SESSION_TTL,
            session_capacity: DEFAULT_SESSION_CAPACITY,
        }
    }

    /// Bound how long idle sessions live and how many are kept
    pub fn with_session_limits(mut self, ttl: Duration, capacity: usize) -> Self {
        self.session_ttl = ttl;
        self.session_capacity = capacity;
        self
    }

    pub fn with_tool(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.tools.push(Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.descriptor().name).collect()
    }

    /// Build the axum router serving `/mcp`
    pub fn router(self) -> Router {
        routes(self.into_state())
    }

    fn into_state(self) -> Arc<ServerState> {
        let index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.descriptor().name, i))
            .collect();

        Arc::new(ServerState {
            info: self.info,
            tools: self.tools,
            index,
            sessions: SessionTable::new(self.session_ttl, self.session_capacity),
        })
    }

    /// Serve until `shutdown` resolves
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let name = self.info.name.clone();
        let app = self.router();

        info!(server = %name, addr = %addr, "Starting MCP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

fn routes(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_delete(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> StatusCode {
    let Some(id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };

    if state.sessions.close(&id) {
        debug!(session = %id, "Session closed by client");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn handle_get(headers: HeaderMap) -> StatusCode {
    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    if wants_sse {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        StatusCode::NOT_ACCEPTABLE
    }
}

async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(_)) => {
            return rpc_reply(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("batch requests are not supported"),
            ))
        }
        Ok(value) => match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return rpc_reply(JsonRpcResponse::error(
                    None,
                    JsonRpcError::invalid_request(e.to_string()),
                ))
            }
        },
        Err(e) => {
            return rpc_reply(JsonRpcResponse::error(
                None,
                JsonRpcError::parse_error(e.to_string()),
            ))
        }
    };

    if request.method != "initialize" {
        if let Some(id) = session_id(&headers) {
            if !state.sessions.touch(&id) {
                debug!(session = %id, "Unknown session");
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    }

    if request.is_notification() {
        debug!(method = %request.method, "Notification received");
        return StatusCode::ACCEPTED.into_response();
    }

    let id = request.id.clone();
    let params = request.params.unwrap_or(Value::Null);

    match request.method.as_str() {
        "initialize" => {
            let result = match initialize(&state, params) {
                Ok(result) => result,
                Err(e) => return rpc_reply(JsonRpcResponse::error(id, e)),
            };
            let session_id = uuid::Uuid::new_v4().to_string();
            state.sessions.open(session_id.clone());

            let mut response = rpc_reply(JsonRpcResponse::success(id, result));
            if let Ok(value) = HeaderValue::from_str(&session_id) {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
            response
        }
        "ping" => rpc_reply(JsonRpcResponse::success(id, serde_json::json!({}))),
        "tools/list" => {
            let result = ListToolsResult {
                tools: state.tools.iter().map(|t| t.descriptor()).collect(),
                next_cursor: None,
            };
            rpc_result(id, &result)
        }
        "tools/call" => match call_tool(&state, params).await {
            Ok(result) => rpc_result(id, &result),
            Err(e) => rpc_reply(JsonRpcResponse::error(id, e)),
        },
        other => rpc_reply(JsonRpcResponse::error(
            id,
            JsonRpcError::method_not_found(other),
        )),
    }
}

fn initialize(state: &ServerState, params: Value) -> Result<Value, JsonRpcError> {
    let params: InitializeParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

    let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
    {
        params.protocol_version
    } else {
        MCP_PROTOCOL_VERSION.to_string()
    };

    info!(
        server = %state.info.name,
        client = %params.client_info.name,
        protocol_version = %protocol_version,
        "Client initialized"
    );

    let result = InitializeResult {
        protocol_version,
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
        },
        server_info: state.info.clone(),
    };
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

async fn call_tool(state: &ServerState, params: Value) -> Result<CallToolResult, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

    let handler = state
        .index
        .get(&params.name)
        .map(|&i| state.tools[i].clone())
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

    match handler.call(Value::Object(params.arguments)).await {
        Ok(text) => Ok(CallToolResult::text(text)),
        Err(e) => {
            warn!(tool = %params.name, error = %e, "Tool call failed");
            Ok(CallToolResult::error(e.to_string()))
        }
    }
}

fn rpc_result<T: serde::Serialize>(id: Option<JsonRpcId>, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => rpc_reply(JsonRpcResponse::success(id, value)),
        Err(e) => rpc_reply(JsonRpcResponse::error(
            id,
            JsonRpcError::internal_error(e.to_string()),
        )),
    }
}

fn rpc_reply(response: JsonRpcResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

/// Pull a required argument out of a tool call's argument object
pub fn required_arg<T: serde::de::DeserializeOwned>(
    arguments: &Value,
    name: &str,
) -> Result<T, ToolError> {
    let value = arguments
        .get(name)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}'", name)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ToolError::InvalidArguments(format!("'{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: Some("Echo the input".into()),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }
        }

        async fn call(&self, arguments: Value) -> Result<String, ToolError> {
            required_arg::<String>(&arguments, "text")
        }
    }

    fn app() -> Router {
        ToolServer::new("Echo", "1.0").with_tool(Echo).router()
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, HeaderMap, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, value)
    }

    #[tokio::test]
    async fn test_get_without_sse_is_not_acceptable() {
        let response = app()
            .oneshot(Request::builder().uri("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_initialize_sets_session_header() {
        let (status, headers, body) = post_json(
            app(),
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "0"}
                }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(SESSION_HEADER));
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body["result"]["serverInfo"]["name"], "Echo");
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let (status, _, body) = post_json(
            app(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header(SESSION_HEADER, "stale")
                    .body(Body::from(
                        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_call_with_bad_arguments_is_tool_error() {
        let (_, _, body) = post_json(
            app(),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {}}
            }),
        )
        .await;

        assert_eq!(body["result"]["isError"], true);
        assert_eq!(
            body["result"]["content"][0]["text"],
            "invalid arguments: missing 'text'"
        );
    }

    fn initialize_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}
            }
        })
    }

    async fn open_session(app: Router) -> String {
        let (status, headers, _) = post_json(app, initialize_body()).await;
        assert_eq!(status, StatusCode::OK);
        headers[SESSION_HEADER].to_str().unwrap().to_string()
    }

    async fn delete_session(app: Router, id: Option<&str>) -> StatusCode {
        let mut request = Request::builder().method("DELETE").uri("/mcp");
        if let Some(id) = id {
            request = request.header(SESSION_HEADER, id);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let state = ToolServer::new("Echo", "1.0").with_tool(Echo).into_state();

        for _ in 0..50 {
            let id = open_session(routes(state.clone())).await;
            assert_eq!(
                delete_session(routes(state.clone()), Some(&id)).await,
                StatusCode::OK
            );
        }
        assert_eq!(state.sessions.len(), 0);

        let id = open_session(routes(state.clone())).await;
        delete_session(routes(state.clone()), Some(&id)).await;
        let response = routes(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header(SESSION_HEADER, id.as_str())
                    .body(Body::from(
                        json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_unknown_or_missing_session() {
        assert_eq!(delete_session(app(), Some("stale")).await, StatusCode::NOT_FOUND);
        assert_eq!(delete_session(app(), None).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_abandoned_sessions_stay_bounded() {
        let state = ToolServer::new("Echo", "1.0")
            .with_tool(Echo)
            .with_session_limits(DEFAULT_SESSION_TTL, 8)
            .into_state();

        let mut ids = Vec::new();
        for _ in 0..40 {
            ids.push(open_session(routes(state.clone())).await);
        }

        assert!(state.sessions.len() <= 8);
        assert!(state.sessions.touch(ids.last().unwrap()));
        assert!(!state.sessions.touch(&ids[0]));
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let state = ToolServer::new("Echo", "1.0")
            .with_tool(Echo)
            .with_session_limits(Duration::from_millis(200), 16)
            .into_state();

        let idle = open_session(routes(state.clone())).await;
        let busy = open_session(routes(state.clone())).await;
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(state.sessions.touch(&busy));
        }

        assert!(!state.sessions.touch(&idle));
        assert_eq!(state.sessions.len(), 1);
    }

    #[test]
    fn test_session_table_close() {
        let table = SessionTable::new(DEFAULT_SESSION_TTL, 4);
        table.open("a".into());

        assert!(table.touch("a"));
        assert!(table.close("a"));
        assert!(!table.close("a"));
        assert!(!table.touch("a"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_parse_error() {
        let (_, _, body) = post_json(
            app(),
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
        )
        .await;
        assert_eq!(body["error"]["code"], -32601);

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], -32700);
    }
}
