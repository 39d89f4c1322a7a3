//! Serve a built-in backend as an MCP server

use anyhow::{Context, Result};
use router_lib::{
    backends::{self, Backend},
    mcp::ToolServer,
    metrics::{MetricsQuery, RollingStore, SamplerBuilder, SysinfoReader},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::print_info;

/// Run `backend` on `host:port` until ctrl-c
pub async fn serve_backend(
    backend: Backend,
    host: &str,
    port: u16,
    sample_interval_ms: u64,
) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let mut sampler_task = None;

    let server: ToolServer = match backend {
        Backend::Math => backends::math::server(),
        Backend::Weather => backends::weather::server(),
        Backend::Sys => {
            let store = Arc::new(RollingStore::default());
            let sampler = SamplerBuilder::new()
                .reader(Arc::new(SysinfoReader::new()))
                .store(store.clone())
                .interval(Duration::from_millis(sample_interval_ms))
                .build()
                .context("Invalid sampler configuration")?;
            sampler_task = Some(tokio::spawn(sampler.run(shutdown_tx.subscribe())));

            let fallback = Arc::new(SysinfoReader::new());
            backends::system::server(MetricsQuery::new(store).with_fallback(fallback))
        }
    };

    print_info(&format!(
        "Serving {} backend ({}) at http://{}/mcp",
        backend,
        server.tool_names().join(", "),
        addr
    ));

    let shutdown_signal = shutdown_tx.clone();
    let served = server
        .serve(addr, async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Shutting down");
            let _ = shutdown_signal.send(());
        })
        .await;

    let _ = shutdown_tx.send(());
    if let Some(task) = sampler_task {
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }

    served.with_context(|| format!("{} backend stopped", backend))
}
