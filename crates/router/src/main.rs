//! Tool router gateway
//!
//! Runs the utilization sampler and (by default) the system metrics backend
//! in-process, bootstraps the agent against all configured backends in the
//! background, and serves chat requests on the API port.

use anyhow::{Context, Result};
use router_lib::{
    agent::{AgentSlot, BootstrapOrchestrator, HttpAgentFactory, RequestExecutor},
    backends,
    health::{components, HealthRegistry},
    mcp::ClientConfig,
    metrics::{MetricsQuery, RollingStore, SamplerBuilder, SysinfoReader},
    observability::{AgentMetrics, StructuredLogger},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tool_router::{api, config::RouterConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ROUTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tool-router");

    let config = RouterConfig::load()?;
    info!(
        api_port = config.api_port,
        backends = ?config.backends,
        model = %config.model,
        "Router configured"
    );
    if config.api_key.is_none() {
        warn!("GROQ_API_KEY is not set; the agent cannot be bootstrapped without it");
    }

    let health_registry = HealthRegistry::new();
    health_registry.register(components::BOOTSTRAP).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new("tool-router");
    logger.log_startup(ROUTER_VERSION, &config.backends.keys().cloned().collect::<Vec<_>>());

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let mut tasks = Vec::new();

    if config.embedded_sys {
        health_registry.register(components::SAMPLER).await;

        let store = Arc::new(RollingStore::default());
        let sampler = SamplerBuilder::new()
            .reader(Arc::new(SysinfoReader::new()))
            .store(store.clone())
            .interval(config.sample_interval())
            .metrics(metrics.clone())
            .health(health_registry.clone())
            .build()
            .context("Invalid sampler configuration")?;
        tasks.push(tokio::spawn(sampler.run(shutdown_tx.subscribe())));

        // Direct reads keep their own CPU baseline
        let query = MetricsQuery::new(store).with_fallback(Arc::new(SysinfoReader::new()));
        let addr = SocketAddr::from(([0, 0, 0, 0], config.sys_port()));
        let mut server_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = backends::system::server(query)
                .serve(addr, async move {
                    let _ = server_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Embedded sys backend stopped");
            }
        }));
    }

    let http = reqwest_client()?;
    let slot = Arc::new(AgentSlot::new());
    let factory = Arc::new(HttpAgentFactory::new(
        http.clone(),
        ClientConfig::default(),
        config.model_settings(),
    ));
    let orchestrator =
        BootstrapOrchestrator::new(config.bootstrap_config(), factory, slot.clone(), http)
            .with_metrics(metrics.clone())
            .with_health(health_registry.clone())
            .with_logger(logger.clone());
    let mut orchestrator = tokio::spawn(orchestrator.run(shutdown_tx.subscribe()));

    let executor = RequestExecutor::new(slot).with_metrics(metrics.clone());
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        executor,
    ));
    let mut api_shutdown = shutdown_tx.subscribe();
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    // Run until ctrl-c, a fatal bootstrap error, or the API server dying
    let mut orchestrator_done = false;
    let outcome: Result<()> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                break Ok(());
            }
            joined = &mut orchestrator, if !orchestrator_done => {
                orchestrator_done = true;
                match joined {
                    Ok(Ok(())) => info!("Bootstrap finished; agent stays published"),
                    Ok(Err(e)) => {
                        logger.log_shutdown("fatal bootstrap error");
                        break Err(e).context("Agent bootstrap aborted");
                    }
                    Err(e) => break Err(e).context("Bootstrap task failed"),
                }
            }
            served = &mut api_handle => {
                break match served {
                    Ok(result) => result.context("API server stopped"),
                    Err(e) => Err(e).context("API server task failed"),
                };
            }
        }
    };

    info!("Shutting down");
    let _ = shutdown_tx.send(());
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }

    outcome
}

fn reqwest_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}
