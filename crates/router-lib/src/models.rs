//! Core data models for the tool router

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One host utilization reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, cpu_percent: f32, memory_percent: f32) -> Self {
        Self {
            timestamp,
            cpu_percent,
            memory_percent,
        }
    }
}

/// Wire transport spoken by a tool backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportKind {
    /// JSON-RPC over HTTP POST, JSON or SSE framed replies
    #[default]
    StreamableHttp,
}

/// A named tool backend the router depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub transport: TransportKind,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            transport: TransportKind::StreamableHttp,
        }
    }
}

/// A callable operation discovered on a backend
///
/// `description` is handed to the model verbatim; it is the only contract
/// the model sees for the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    /// Name of the backend that serves this tool
    pub backend: String,
}
