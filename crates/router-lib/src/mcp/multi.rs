use super::client::{ClientConfig, McpHttpClient};
use super::error::{McpError, Result};
use super::{ToolOutput, ToolProvider};
use crate::models::{ServiceEndpoint, ToolSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Aggregates several MCP backends behind one tool namespace
///
/// `list_tools` walks every backend in configuration order and records which
/// backend serves each tool name; `call_tool` routes by that table. When two
/// backends expose the same name the first one wins.
pub struct MultiServerClient {
    clients: Vec<McpHttpClient>,
    routes: RwLock<HashMap<String, usize>>,
}

impl MultiServerClient {
    pub fn new(endpoints: &[ServiceEndpoint], http: reqwest::Client, config: ClientConfig) -> Self {
        let clients = endpoints
            .iter()
            .cloned()
            .map(|endpoint| McpHttpClient::new(endpoint, http.clone(), config.clone()))
            .collect();

        Self {
            clients,
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn backends(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.clients.iter().map(|c| c.endpoint())
    }
}

#[async_trait]
impl ToolProvider for MultiServerClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let mut specs = Vec::new();
        let mut routes = HashMap::new();

        for (index, client) in self.clients.iter().enumerate() {
            let tools = client.list_tools().await.map_err(|e| match e {
                McpError::Http(msg) => McpError::Http(format!("{}: {}", client.name(), msg)),
                other => other,
            })?;
            debug!(backend = %client.name(), count = tools.len(), "Listed tools");

            for tool in tools {
                if routes.contains_key(&tool.name) {
                    warn!(
                        tool = %tool.name,
                        backend = %client.name(),
                        "Duplicate tool name, keeping the first backend's tool"
                    );
                    continue;
                }
                routes.insert(tool.name.clone(), index);
                specs.push(ToolSpec {
                    name: tool.name,
                    description: tool.description.unwrap_or_default(),
                    input_schema: tool.input_schema,
                    backend: client.name().to_string(),
                });
            }
        }

        *self.routes.write().await = routes;
        Ok(specs)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let index = self
            .routes
            .read()
            .await
            .get(name)
            .copied()
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(McpError::Protocol(format!(
                    "arguments for '{}' must be an object, got {}",
                    name, other
                )))
            }
        };

        let result = self.clients[index].call_tool(name, arguments).await?;
        Ok(ToolOutput {
            text: result.joined_text(),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) {
        for client in &self.clients {
            client.close().await;
        }
    }
}
