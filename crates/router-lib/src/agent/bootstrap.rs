//! Bootstrap orchestration
//!
//! Brings up a usable agent despite backends that start in any order:
//! 1. Probe every backend until all are ready in one round
//! 2. Build the multi-backend tool client
//! 3. Discover tools, retrying a bounded number of times
//! 4. Bind the chat model
//! 5. Publish a new [`AgentHandle`] generation
//!
//! Credentials are checked before the first probe so a missing key fails
//! fast. Any retryable failure restarts the whole sequence after a
//! cool-down; backend sessions opened by the failed attempt are closed.
//! Once published, the orchestrator keeps watching the backends and
//! rebuilds the agent when one of them drops out.

use super::handle::{AgentHandle, DEFAULT_MAX_STEPS};
use super::probe::{ProbeConfig, ReadinessProbe};
use crate::error::BootstrapError;
use crate::health::{components, HealthRegistry};
use crate::llm::{ChatModel, OpenAiCompatClient, DEFAULT_BASE_URL};
use crate::mcp::{ClientConfig, MultiServerClient, ToolProvider};
use crate::models::{ServiceEndpoint, ToolSpec};
use crate::observability::{AgentMetrics, StructuredLogger};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Configuration for the bootstrap sequence
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub endpoints: Vec<ServiceEndpoint>,
    pub probe: ProbeConfig,
    /// Tool discovery tries per attempt
    pub discovery_attempts: u32,
    pub discovery_interval: Duration,
    /// Pause before restarting a failed sequence
    pub cool_down: Duration,
    /// Re-probe period once an agent is published; `None` stops watching
    pub watch_interval: Option<Duration>,
    pub max_steps: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe: ProbeConfig::default(),
            discovery_attempts: 10,
            discovery_interval: Duration::from_secs(1),
            cool_down: Duration::from_secs(5),
            watch_interval: Some(Duration::from_secs(15)),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Builds the pieces an agent is made of
pub trait AgentFactory: Send + Sync {
    /// Tool client spanning all endpoints. Connections are made lazily.
    fn connect(&self, endpoints: &[ServiceEndpoint]) -> Arc<dyn ToolProvider>;

    /// The chat model; a missing credential is a configuration error
    fn bind_model(&self) -> Result<Arc<dyn ChatModel>, BootstrapError>;

    /// Check that a model can be bound at all, without building one
    fn check_credentials(&self) -> Result<(), BootstrapError> {
        Ok(())
    }
}

/// Model connection settings
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "qwen/qwen3-32b".to_string(),
            api_key: None,
        }
    }
}

/// Production factory: MCP over HTTP plus an OpenAI-compatible model
pub struct HttpAgentFactory {
    http: reqwest::Client,
    client_config: ClientConfig,
    model: ModelSettings,
}

impl HttpAgentFactory {
    pub fn new(http: reqwest::Client, client_config: ClientConfig, model: ModelSettings) -> Self {
        Self {
            http,
            client_config,
            model,
        }
    }

    fn api_key(&self) -> Result<&str, BootstrapError> {
        self.model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                BootstrapError::Configuration(
                    "GROQ_API_KEY environment variable not set. Please set your Groq API key."
                        .to_string(),
                )
            })
    }
}

impl AgentFactory for HttpAgentFactory {
    fn connect(&self, endpoints: &[ServiceEndpoint]) -> Arc<dyn ToolProvider> {
        Arc::new(MultiServerClient::new(
            endpoints,
            self.http.clone(),
            self.client_config.clone(),
        ))
    }

    fn bind_model(&self) -> Result<Arc<dyn ChatModel>, BootstrapError> {
        let api_key = self.api_key()?;

        Ok(Arc::new(OpenAiCompatClient::new(
            self.http.clone(),
            &self.model.base_url,
            api_key,
            &self.model.model,
        )))
    }

    fn check_credentials(&self) -> Result<(), BootstrapError> {
        self.api_key().map(|_| ())
    }
}

/// The currently published agent, if any
///
/// One writer (the orchestrator), any number of lock-free readers.
#[derive(Default)]
pub struct AgentSlot {
    current: ArcSwapOption<AgentHandle>,
}

impl AgentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<AgentHandle>> {
        self.current.load_full()
    }

    pub fn is_published(&self) -> bool {
        self.current.load().is_some()
    }

    /// Replace the published agent; readers holding the old one keep it
    pub fn publish(&self, handle: Arc<AgentHandle>) {
        self.current.store(Some(handle));
    }
}

enum Watch {
    Shutdown,
    BackendsLost,
}

pub struct BootstrapOrchestrator {
    config: BootstrapConfig,
    factory: Arc<dyn AgentFactory>,
    slot: Arc<AgentSlot>,
    probe: ReadinessProbe,
    metrics: Option<AgentMetrics>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
    generation: u64,
}

impl BootstrapOrchestrator {
    pub fn new(
        config: BootstrapConfig,
        factory: Arc<dyn AgentFactory>,
        slot: Arc<AgentSlot>,
        http: reqwest::Client,
    ) -> Self {
        let probe = ReadinessProbe::new(http, config.probe.clone());
        Self {
            config,
            factory,
            slot,
            probe,
            metrics: None,
            health: None,
            logger: StructuredLogger::new("tool-router"),
            generation: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.probe = self.probe.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run until shutdown, or until a configuration error makes retrying
    /// pointless
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), BootstrapError> {
        info!(
            endpoints = self.config.endpoints.len(),
            "Starting bootstrap orchestrator"
        );
        if let Err(e) = self.factory.check_credentials() {
            return Err(self.abort(0, e).await);
        }

        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.inc_bootstrap_attempts();
            }

            let result = tokio::select! {
                result = self.attempt() => result,
                _ = shutdown.recv() => {
                    info!("Bootstrap orchestrator shutting down");
                    return Ok(());
                }
            };

            match result {
                Ok(handle) => {
                    self.publish(handle).await;

                    let Some(period) = self.config.watch_interval else {
                        return Ok(());
                    };
                    match self.watch(period, &mut shutdown).await {
                        Watch::Shutdown => return Ok(()),
                        Watch::BackendsLost => continue,
                    }
                }
                Err(e) if e.is_fatal() => return Err(self.abort(attempt, e).await),
                Err(e) => {
                    self.logger
                        .log_bootstrap_failure(attempt, e.kind(), &e.to_string(), false);
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_bootstrap_failures(e.kind());
                    }
                    if let Some(health) = &self.health {
                        health.set_degraded(components::BOOTSTRAP, e.to_string()).await;
                        if let BootstrapError::Connectivity(failure) = &e {
                            for report in failure.not_ready() {
                                health
                                    .set_degraded(
                                        &components::backend(&report.name),
                                        report.state.to_string(),
                                    )
                                    .await;
                            }
                        }
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.cool_down) => {}
                        _ = shutdown.recv() => {
                            info!("Bootstrap orchestrator shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Record a fatal failure and hand it back for the caller to return
    async fn abort(&self, attempt: u64, e: BootstrapError) -> BootstrapError {
        self.logger
            .log_bootstrap_failure(attempt, e.kind(), &e.to_string(), true);
        if let Some(metrics) = &self.metrics {
            metrics.inc_bootstrap_failures(e.kind());
        }
        if let Some(health) = &self.health {
            health.set_unhealthy(components::BOOTSTRAP, e.to_string()).await;
        }
        e
    }

    /// One full bootstrap sequence
    async fn attempt(&self) -> Result<AgentHandle, BootstrapError> {
        let endpoints = &self.config.endpoints;

        let rounds = self
            .probe
            .probe(endpoints)
            .await
            .map_err(BootstrapError::Connectivity)?;
        debug!(rounds = rounds, "Backends ready");
        if let Some(health) = &self.health {
            for endpoint in endpoints {
                health.set_healthy(&components::backend(&endpoint.name)).await;
            }
        }

        let tools = self.factory.connect(endpoints);
        let built = match self.discover(tools.as_ref()).await {
            Ok(specs) => self.factory.bind_model().map(|model| (specs, model)),
            Err(e) => Err(e),
        };
        let (specs, model) = match built {
            Ok(parts) => parts,
            Err(e) => {
                tools.close().await;
                return Err(e);
            }
        };

        Ok(AgentHandle::new(
            self.generation + 1,
            model,
            tools,
            specs,
            self.config.max_steps,
        ))
    }

    async fn discover(&self, tools: &dyn ToolProvider) -> Result<Vec<ToolSpec>, BootstrapError> {
        let attempts = self.config.discovery_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tools.list_tools().await {
                Ok(specs) if !specs.is_empty() => {
                    debug!(attempt = attempt, tools = specs.len(), "Tools discovered");
                    return Ok(specs);
                }
                Ok(_) => last_error = "backends exposed no tools".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                attempt = attempt,
                max_attempts = attempts,
                error = %last_error,
                "Tool discovery failed"
            );
            if attempt < attempts {
                tokio::time::sleep(self.config.discovery_interval).await;
            }
        }

        Err(BootstrapError::ToolDiscovery {
            attempts,
            last_error,
        })
    }

    async fn publish(&mut self, handle: AgentHandle) {
        self.generation = handle.generation();
        let tool_names = handle.tool_names();
        let model = handle.model_name().to_string();

        self.slot.publish(Arc::new(handle));

        self.logger
            .log_agent_published(self.generation, &model, &tool_names);
        if let Some(metrics) = &self.metrics {
            metrics.set_agent_generation(self.generation, tool_names.len());
        }
        if let Some(health) = &self.health {
            health.set_healthy(components::BOOTSTRAP).await;
            health.mark_published(self.generation).await;
        }
    }

    /// Re-probe periodically; the published handle keeps serving meanwhile
    async fn watch(&self, period: Duration, shutdown: &mut broadcast::Receiver<()>) -> Watch {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown.recv() => {
                    info!("Bootstrap orchestrator shutting down");
                    return Watch::Shutdown;
                }
            }

            let round = self.probe.probe_once(&self.config.endpoints).await;
            let down: Vec<_> = round.iter().filter(|r| !r.state.is_ready()).collect();
            if down.is_empty() {
                continue;
            }

            for report in &down {
                warn!(
                    backend = %report.name,
                    url = %report.url,
                    state = %report.state,
                    generation = self.generation,
                    "Backend dropped out, rebuilding agent"
                );
                if let Some(health) = &self.health {
                    health
                        .set_degraded(&components::backend(&report.name), report.state.to_string())
                        .await;
                }
            }
            return Watch::BackendsLost;
        }
    }
}
