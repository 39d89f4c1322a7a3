//! Arithmetic backend: `add` and `multiple` on integers

use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::{required_arg, ToolError, ToolHandler, ToolServer};
use async_trait::async_trait;
use serde_json::{json, Value};

pub fn server() -> ToolServer {
    ToolServer::new("Math", env!("CARGO_PKG_VERSION"))
        .with_tool(BinaryOp::add())
        .with_tool(BinaryOp::multiply())
}

fn integer_pair_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "integer"},
            "b": {"type": "integer"}
        },
        "required": ["a", "b"]
    })
}

struct BinaryOp {
    name: &'static str,
    description: &'static str,
    apply: fn(i64, i64) -> Option<i64>,
}

impl BinaryOp {
    fn add() -> Self {
        Self {
            name: "add",
            description: "Add two numbers",
            apply: i64::checked_add,
        }
    }

    // Exposed as `multiple`, not `multiply`.
    fn multiply() -> Self {
        Self {
            name: "multiple",
            description: "Multiply two numbers",
            apply: i64::checked_mul,
        }
    }
}

#[async_trait]
impl ToolHandler for BinaryOp {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            input_schema: integer_pair_schema(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let a: i64 = required_arg(&arguments, "a")?;
        let b: i64 = required_arg(&arguments, "b")?;
        (self.apply)(a, b)
            .map(|v| v.to_string())
            .ok_or_else(|| ToolError::Failed(format!("{}({}, {}) overflows", self.name, a, b)))
    }
}
