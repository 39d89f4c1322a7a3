//! System metrics backend answering from the rolling sample store

use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::{required_arg, ToolError, ToolHandler, ToolServer};
use crate::metrics::{Metric, MetricsQuery};
use async_trait::async_trait;
use serde_json::{json, Value};

const AT_DESCRIPTION_SUFFIX: &str = "Provide an ISO 8601 like '2025-09-17 22:00:00' or \
'2025-09-17T22:00:00' in local time.\nReturns the closest sample at or before that time \
within the rolling window.";

pub fn server(query: MetricsQuery) -> ToolServer {
    ToolServer::new("SysInfo", env!("CARGO_PKG_VERSION"))
        .with_tool(UtilizationNow {
            metric: Metric::Cpu,
            query: query.clone(),
        })
        .with_tool(UtilizationNow {
            metric: Metric::Memory,
            query: query.clone(),
        })
        .with_tool(UtilizationAt {
            metric: Metric::Cpu,
            query: query.clone(),
        })
        .with_tool(UtilizationAt {
            metric: Metric::Memory,
            query,
        })
}

fn tool_suffix(metric: Metric) -> &'static str {
    match metric {
        Metric::Cpu => "cpu",
        Metric::Memory => "memory",
    }
}

struct UtilizationNow {
    metric: Metric,
    query: MetricsQuery,
}

#[async_trait]
impl ToolHandler for UtilizationNow {
    fn descriptor(&self) -> ToolDescriptor {
        let what = match self.metric {
            Metric::Cpu => "CPU",
            Metric::Memory => "memory",
        };
        ToolDescriptor {
            name: format!("get_{}_now", tool_suffix(self.metric)),
            description: Some(format!(
                "Return current system {} utilization percentage as a human string.",
                what
            )),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        // A direct read may sleep while the CPU baseline settles
        let query = self.query.clone();
        let metric = self.metric;
        tokio::task::spawn_blocking(move || query.now(metric))
            .await
            .map_err(|e| ToolError::Failed(format!("utilization read aborted: {}", e)))
    }
}

struct UtilizationAt {
    metric: Metric,
    query: MetricsQuery,
}

#[async_trait]
impl ToolHandler for UtilizationAt {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: format!("get_{}_at", tool_suffix(self.metric)),
            description: Some(format!(
                "Return {} utilization near a specific time.\n\n{}",
                self.metric.label(),
                AT_DESCRIPTION_SUFFIX
            )),
            input_schema: json!({
                "type": "object",
                "properties": {"timestamp_iso": {"type": "string"}},
                "required": ["timestamp_iso"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let timestamp: String = required_arg(&arguments, "timestamp_iso")?;
        self.query
            .at(self.metric, &timestamp)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}
