//! API client for communicating with the tool router gateway

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// API client for the gateway
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Chat replies wait on the model and its tool calls
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Submit a chat message; the gateway always answers with plain text
    pub async fn chat(&self, message: &str) -> Result<String> {
        let url = self.base_url.join("get").context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .form(&[("msg", message)])
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.text().await.context("Failed to read response")
    }

    /// Fetch the published agent's status
    pub async fn status(&self) -> Result<GatewayStatus> {
        let url = self.base_url.join("api/status").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        let envelope: StatusEnvelope = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse response ({}): {}", status, body))?;

        match (status, envelope.data) {
            (StatusCode::OK, Some(agent)) => Ok(GatewayStatus::Ready(agent)),
            (StatusCode::SERVICE_UNAVAILABLE, _)
                if envelope.code.as_deref() == Some("not_initialized") =>
            {
                Ok(GatewayStatus::Initializing)
            }
            _ => anyhow::bail!(
                "API error ({}): {}",
                status,
                envelope.message.or(envelope.code).unwrap_or(body)
            ),
        }
    }
}

// API response types

#[derive(Debug, Clone, Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<AgentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub generation: u64,
    pub model: String,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayStatus {
    Ready(AgentStatus),
    Initializing,
}
