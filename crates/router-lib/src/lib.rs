//! Router library for MCP tool routing
//!
//! This crate provides the core functionality for:
//! - Host utilization sampling into a rolling time-windowed store
//! - MCP client and server over streamable HTTP
//! - The math, weather and system metrics tool backends
//! - Readiness probing and resilient agent bootstrap
//! - Serving chat requests through a tool-calling model loop
//! - Health checks and observability

pub mod agent;
pub mod backends;
pub mod error;
pub mod health;
pub mod llm;
pub mod mcp;
pub mod metrics;
pub mod models;
pub mod observability;

pub use error::{BootstrapError, InvocationError, TimestampParseError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
