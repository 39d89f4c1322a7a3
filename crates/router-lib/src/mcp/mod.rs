//! Model Context Protocol over streamable HTTP
//!
//! Client side: [`McpHttpClient`] holds one backend session and
//! [`MultiServerClient`] aggregates backends behind [`ToolProvider`].
//! Server side: [`ToolServer`] hosts [`ToolHandler`]s on `/mcp`.

mod client;
mod error;
mod multi;
pub mod protocol;
mod server;

pub use client::{ClientConfig, McpHttpClient};
pub use error::{McpError, Result};
pub use multi::MultiServerClient;
pub use server::{
    required_arg, ToolError, ToolHandler, ToolServer, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL,
};

use crate::models::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;

/// Text result of a tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// The tool ran but reported failure; the text explains why
    pub is_error: bool,
}

/// Source of tools for an agent
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Discover every available tool
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Call a previously listed tool by name
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput>;

    /// Release backend sessions. The provider may be reused afterwards.
    async fn close(&self) {}
}
