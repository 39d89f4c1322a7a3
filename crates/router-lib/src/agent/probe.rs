//! Readiness probing of tool backends
//!
//! Every attempt GETs all endpoints concurrently. The probe succeeds only
//! when every endpoint answers an accepted status in the same round.

use crate::models::ServiceEndpoint;
use crate::observability::AgentMetrics;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Configuration for readiness probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-call timeout
    pub timeout: Duration,
    /// Pause between rounds
    pub interval: Duration,
    /// Rounds before giving up
    pub max_attempts: u32,
    /// Statuses that count as "up". 406 is what a streamable HTTP MCP
    /// server answers to a plain GET.
    pub accepted_statuses: Vec<u16>,
    /// Log which endpoints are still down every this many rounds
    pub diagnostic_every: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(500),
            max_attempts: 40,
            accepted_statuses: vec![200, 202, 406],
            diagnostic_every: 5,
        }
    }
}

/// Outcome of probing one endpoint in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Ready(u16),
    /// Answered, but with a status outside the accepted set
    Status(u16),
    Unreachable(String),
    NotProbed,
}

impl EndpointState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EndpointState::Ready(_))
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointState::Ready(status) => write!(f, "ready ({})", status),
            EndpointState::Status(status) => write!(f, "status {}", status),
            EndpointState::Unreachable(reason) => write!(f, "unreachable: {}", reason),
            EndpointState::NotProbed => f.write_str("not probed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub name: String,
    pub url: String,
    pub state: EndpointState,
}

/// The probe ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub attempts: u32,
    /// Last observed state of every endpoint, in configuration order
    pub endpoints: Vec<EndpointReport>,
}

impl ProbeFailure {
    pub fn not_ready(&self) -> impl Iterator<Item = &EndpointReport> {
        self.endpoints.iter().filter(|e| !e.state.is_ready())
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not all backends ready after {} attempts", self.attempts)?;
        let mut sep = ": ";
        for report in self.not_ready() {
            write!(f, "{}{} at {} ({})", sep, report.name, report.url, report.state)?;
            sep = "; ";
        }
        Ok(())
    }
}

impl std::error::Error for ProbeFailure {}

pub struct ReadinessProbe {
    http: reqwest::Client,
    config: ProbeConfig,
    metrics: Option<AgentMetrics>,
}

impl ReadinessProbe {
    pub fn new(http: reqwest::Client, config: ProbeConfig) -> Self {
        Self {
            http,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe until every endpoint is ready in one round; returns the
    /// number of rounds it took
    pub async fn probe(&self, endpoints: &[ServiceEndpoint]) -> Result<u32, ProbeFailure> {
        let mut last_round = Vec::new();

        for attempt in 1..=self.config.max_attempts {
            last_round = self.probe_once(endpoints).await;

            if last_round.iter().all(|r| r.state.is_ready()) {
                info!(attempt = attempt, endpoints = endpoints.len(), "All backends ready");
                return Ok(attempt);
            }

            if self.config.diagnostic_every > 0 && attempt % self.config.diagnostic_every == 0 {
                let waiting: Vec<String> = last_round
                    .iter()
                    .filter(|r| !r.state.is_ready())
                    .map(|r| format!("{} ({})", r.name, r.state))
                    .collect();
                info!(
                    attempt = attempt,
                    max_attempts = self.config.max_attempts,
                    waiting = ?waiting,
                    "Waiting for backends"
                );
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        if last_round.is_empty() {
            last_round = endpoints.iter().map(|e| report(e, EndpointState::NotProbed)).collect();
        }

        Err(ProbeFailure {
            attempts: self.config.max_attempts,
            endpoints: last_round,
        })
    }

    /// One concurrent round over all endpoints, results in input order
    pub async fn probe_once(&self, endpoints: &[ServiceEndpoint]) -> Vec<EndpointReport> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_probe_rounds();
        }

        let mut set = JoinSet::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            let http = self.http.clone();
            let url = endpoint.url.clone();
            let timeout = self.config.timeout;
            let accepted = self.config.accepted_statuses.clone();
            set.spawn(async move { (index, check(&http, &url, timeout, &accepted).await) });
        }

        let mut states = vec![EndpointState::NotProbed; endpoints.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, state)) => states[index] = state,
                Err(e) => debug!(error = %e, "Probe task failed"),
            }
        }

        endpoints
            .iter()
            .zip(states)
            .map(|(endpoint, state)| report(endpoint, state))
            .collect()
    }
}

fn report(endpoint: &ServiceEndpoint, state: EndpointState) -> EndpointReport {
    EndpointReport {
        name: endpoint.name.clone(),
        url: endpoint.url.clone(),
        state,
    }
}

async fn check(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
    accepted: &[u16],
) -> EndpointState {
    match http.get(url).timeout(timeout).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            if accepted.contains(&status) {
                EndpointState::Ready(status)
            } else {
                EndpointState::Status(status)
            }
        }
        Err(e) if e.is_timeout() => EndpointState::Unreachable(format!("timed out after {:?}", timeout)),
        Err(e) => EndpointState::Unreachable(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(max_attempts: u32) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(500),
            interval: Duration::from_millis(10),
            max_attempts,
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 40);
        assert_eq!(config.accepted_statuses, vec![200, 202, 406]);
        assert_eq!(config.diagnostic_every, 5);
    }

    #[tokio::test]
    async fn test_not_acceptable_counts_as_ready() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/mcp")
            .with_status(406)
            .expect(1)
            .create_async()
            .await;

        let probe = ReadinessProbe::new(reqwest::Client::new(), fast_config(3));
        let endpoints = [ServiceEndpoint::new("weather", format!("{}/mcp", server.url()))];

        assert_eq!(probe.probe(&endpoints).await, Ok(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_status_fails_after_exact_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/mcp")
            .with_status(500)
            .expect(4)
            .create_async()
            .await;

        let probe = ReadinessProbe::new(reqwest::Client::new(), fast_config(4));
        let endpoints = [ServiceEndpoint::new("math", format!("{}/mcp", server.url()))];

        let failure = probe.probe(&endpoints).await.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.endpoints[0].state, EndpointState::Status(500));
        assert!(failure.to_string().contains("math"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_named() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mcp")
            .with_status(200)
            .create_async()
            .await;

        let probe = ReadinessProbe::new(reqwest::Client::new(), fast_config(2));
        let endpoints = [
            ServiceEndpoint::new("math", format!("{}/mcp", server.url())),
            ServiceEndpoint::new("sys", "http://127.0.0.1:9/mcp"),
        ];

        let failure = probe.probe(&endpoints).await.unwrap_err();
        let down: Vec<&str> = failure.not_ready().map(|r| r.name.as_str()).collect();
        assert_eq!(down, vec!["sys"]);
        assert!(failure.endpoints[0].state.is_ready());
        assert!(matches!(failure.endpoints[1].state, EndpointState::Unreachable(_)));
        assert!(failure.to_string().contains("sys at http://127.0.0.1:9/mcp"));
    }

    #[tokio::test]
    async fn test_no_endpoints_is_trivially_ready() {
        let probe = ReadinessProbe::new(reqwest::Client::new(), fast_config(1));
        assert_eq!(probe.probe(&[]).await, Ok(1));
    }
}
