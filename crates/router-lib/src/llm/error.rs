use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),

    #[error("model endpoint answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
