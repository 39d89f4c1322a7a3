//! Error types shared across the router

use crate::agent::ProbeFailure;
use crate::llm::LlmError;
use crate::mcp::McpError;
use thiserror::Error;

/// Why a bootstrap attempt (or the whole orchestrator) stopped
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Required configuration is missing; retrying cannot help
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("backends not ready: {0}")]
    Connectivity(ProbeFailure),

    #[error("tool discovery failed after {attempts} attempts: {last_error}")]
    ToolDiscovery { attempts: u32, last_error: String },
}

impl BootstrapError {
    /// Fatal errors abort the orchestrator instead of restarting the cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, BootstrapError::Configuration(_))
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            BootstrapError::Configuration(_) => "configuration",
            BootstrapError::Connectivity(_) => "connectivity",
            BootstrapError::ToolDiscovery { .. } => "tool_discovery",
        }
    }
}

/// Failure while serving one request
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("model error: {0}")]
    Model(#[from] LlmError),

    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: McpError,
    },

    #[error("no final answer after {0} model steps")]
    StepLimit(usize),

    #[error("request task aborted: {0}")]
    Aborted(String),
}

/// Malformed timestamp argument to a metrics query
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not parse timestamp '{input}'; use 'YYYY-MM-DD HH:MM:SS', 'YYYY-MM-DDTHH:MM:SS' or 'YYYY-MM-DD HH:MM'")]
pub struct TimestampParseError {
    pub input: String,
}

impl TimestampParseError {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}
