use thiserror::Error;

pub type Result<T> = std::result::Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("http error: {0}")]
    Http(String),

    #[error("{url} answered status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl McpError {
    /// The backend forgot our session (typically it restarted)
    pub fn is_session_expired(&self) -> bool {
        matches!(self, McpError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
