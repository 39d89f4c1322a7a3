//! Tool router CLI
//!
//! Serves the built-in tool backends and talks to a running gateway:
//! sends chat messages and reports which agent generation is published.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{chat, serve, status};
use router_lib::backends::Backend;

const DEFAULT_API_URL: &str = "http://localhost:5001";

/// Tool router CLI
#[derive(Parser)]
#[command(name = "trctl")]
#[command(author, version, about = "CLI for the Tool Router", long_about = None)]
pub struct Cli {
    /// Gateway URL (can also be set via TRCTL_API_URL env var)
    #[arg(long, env = "TRCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve one of the built-in tool backends over MCP
    Serve {
        /// Backend to serve (math, weather, sys)
        backend: Backend,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind (defaults to the backend's conventional port)
        #[arg(long, short)]
        port: Option<u16>,

        /// Utilization sampling period for the sys backend, in milliseconds
        #[arg(long, default_value_t = 2000)]
        sample_interval_ms: u64,
    },

    /// Send a message to the gateway and print the reply
    Chat {
        /// Message text
        message: String,
    },

    /// Show the published agent on the gateway
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(file_config.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let format = cli
        .format
        .or_else(|| file_config.default_format.as_deref().and_then(output::OutputFormat::parse))
        .unwrap_or_default();

    match cli.command {
        Commands::Serve {
            backend,
            host,
            port,
            sample_interval_ms,
        } => {
            let port = port.unwrap_or_else(|| backend.default_port());
            serve::serve_backend(backend, &host, port, sample_interval_ms).await?;
        }
        Commands::Chat { message } => {
            let client = client::ApiClient::new(&api_url)?;
            chat::send_message(&client, &message, format).await?;
        }
        Commands::Status => {
            let client = client::ApiClient::new(&api_url)?;
            status::show_status(&client, format).await?;
        }
    }

    Ok(())
}
