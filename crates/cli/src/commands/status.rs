//! Published agent status

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, GatewayStatus};
use crate::output::{format_timestamp, print_success, print_warning, OutputFormat};

/// Row for the tools table
#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Tool")]
    name: String,
}

/// Show the gateway's published agent
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => {
            let json = match &status {
                GatewayStatus::Ready(agent) => {
                    serde_json::json!({"status": "ok", "data": agent})
                }
                GatewayStatus::Initializing => {
                    serde_json::json!({"status": "initializing"})
                }
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => match status {
            GatewayStatus::Initializing => {
                print_warning("Agent is still initializing");
            }
            GatewayStatus::Ready(agent) => {
                print_success(&format!("Agent generation {} is serving", agent.generation));
                println!();
                println!("Model:       {}", agent.model.cyan());
                if let Some(published_at) = &agent.published_at {
                    println!("Published:   {}", format_timestamp(published_at));
                }
                println!();

                let rows: Vec<ToolRow> = agent
                    .tools
                    .iter()
                    .enumerate()
                    .map(|(i, name)| ToolRow {
                        index: i + 1,
                        name: name.clone(),
                    })
                    .collect();

                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
                println!("\nTotal: {} tools", agent.tools.len());
            }
        },
    }

    Ok(())
}
