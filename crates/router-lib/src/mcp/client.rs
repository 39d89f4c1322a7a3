//! MCP client for one backend over streamable HTTP
//!
//! This module provides a client that:
//! - Initializes a session lazily and remembers the session id
//! - Accepts both JSON and SSE framed replies
//! - Re-initializes once when the backend has forgotten the session
//! - Ends the session with `DELETE` when closed

use super::error::{McpError, Result};
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcId, JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult,
    ToolDescriptor, MCP_PROTOCOL_VERSION, SESSION_HEADER,
};
use crate::models::ServiceEndpoint;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages, guards against a cursor loop
const MAX_LIST_PAGES: usize = 64;

/// Configuration for backend clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Name reported in `clientInfo`
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            client_name: "tool-router".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    id: Option<String>,
    server: Implementation,
}

/// Client for a single MCP backend
pub struct McpHttpClient {
    endpoint: ServiceEndpoint,
    http: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Option<Session>>,
    next_id: AtomicI64,
}

impl McpHttpClient {
    pub fn new(endpoint: ServiceEndpoint, http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            endpoint,
            http,
            config,
            session: RwLock::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Name the server reported at initialization, if a session exists
    pub async fn server_name(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.server.name.clone())
    }

    /// Run the initialize handshake and store the session
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: Implementation {
                name: self.config.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let (response, session_id) = self
            .post(
                JsonRpcRequest::new(
                    self.next_id(),
                    "initialize",
                    Some(serde_json::to_value(params)?),
                ),
                None,
            )
            .await?;
        let result: InitializeResult = decode_result(response)?;

        self.post(
            JsonRpcRequest::notification("notifications/initialized"),
            session_id.as_deref(),
        )
        .await?;

        info!(
            backend = %self.endpoint.name,
            server = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP session established"
        );

        *self.session.write().await = Some(Session {
            id: session_id,
            server: result.server_info.clone(),
        });

        Ok(result)
    }

    /// List every tool the backend exposes, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = serde_json::to_value(ListToolsParams { cursor })?;
            let page: ListToolsResult = self.request("tools/list", Some(params)).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }

        Err(McpError::Protocol(format!(
            "{} kept paginating tools/list past {} pages",
            self.endpoint.name, MAX_LIST_PAGES
        )))
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        self.request("tools/call", Some(params)).await
    }

    /// Forget the session; the next request re-initializes
    pub async fn reset(&self) {
        *self.session.write().await = None;
    }

    /// End the session on the backend and forget it locally
    ///
    /// Failures are logged and swallowed: the backend drops idle
    /// sessions on its own.
    pub async fn close(&self) {
        let Some(session) = self.session.write().await.take() else {
            return;
        };
        let Some(id) = session.id else {
            return;
        };

        let result = self
            .http
            .delete(&self.endpoint.url)
            .timeout(self.config.request_timeout)
            .header(SESSION_HEADER, &id)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(backend = %self.endpoint.name, session = %id, "MCP session closed");
            }
            Ok(response) => {
                debug!(
                    backend = %self.endpoint.name,
                    status = response.status().as_u16(),
                    "Backend declined session close"
                );
            }
            Err(e) => {
                debug!(backend = %self.endpoint.name, error = %e, "Session close failed");
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T> {
        match self.request_once(method, params.clone()).await {
            Err(e) if e.is_session_expired() => {
                warn!(
                    backend = %self.endpoint.name,
                    method = %method,
                    "Session expired, re-initializing"
                );
                self.reset().await;
                self.request_once(method, params).await
            }
            other => other,
        }
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T> {
        let session_id = self.ensure_session().await?;
        let (response, _) = self
            .post(
                JsonRpcRequest::new(self.next_id(), method, params),
                session_id.as_deref(),
            )
            .await?;
        decode_result(response)
    }

    async fn ensure_session(&self) -> Result<Option<String>> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.id.clone());
        }
        self.initialize().await?;
        Ok(self.session.read().await.as_ref().and_then(|s| s.id.clone()))
    }

    /// POST one message. Returns the matching response (None for
    /// notifications) and the session id header, if the server sent one.
    async fn post(
        &self,
        message: JsonRpcRequest,
        session_id: Option<&str>,
    ) -> Result<(Option<JsonRpcResponse>, Option<String>)> {
        let mut builder = self
            .http
            .post(&self.endpoint.url)
            .timeout(self.config.request_timeout)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&message);
        if let Some(id) = session_id {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder.send().await?;
        let status = response.status();
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;

        if !status.is_success() {
            return Err(McpError::Status {
                url: self.endpoint.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let Some(id) = message.id else {
            return Ok((None, session));
        };

        debug!(
            backend = %self.endpoint.name,
            method = %message.method,
            sse = is_sse,
            "MCP response received"
        );

        let response = if is_sse {
            parse_sse_response(&body, &id)?
        } else {
            serde_json::from_str(&body)?
        };
        Ok((Some(response), session))
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn decode_result<T: DeserializeOwned>(response: Option<JsonRpcResponse>) -> Result<T> {
    let response =
        response.ok_or_else(|| McpError::Protocol("missing response to request".to_string()))?;
    if let Some(err) = response.error {
        return Err(McpError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| McpError::Protocol("response has neither result nor error".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

/// Find the JSON-RPC response for `id` in an SSE body
///
/// Events are separated by blank lines; multi-line `data:` fields are
/// joined with newlines. Server notifications interleaved before the
/// response are skipped.
pub(crate) fn parse_sse_response(body: &str, id: &JsonRpcId) -> Result<JsonRpcResponse> {
    let mut data = String::new();

    let lines = body.lines().chain(std::iter::once(""));
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    if response.id.as_ref() == Some(id) {
                        return Ok(response);
                    }
                }
                data.clear();
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    Err(McpError::Protocol(format!(
        "event stream ended without a response to request {:?}",
        id
    )))
}
