//! Chat with the gateway

use anyhow::Result;
use router_lib::agent::INITIALIZING_MESSAGE;
use serde::Serialize;

use crate::client::ApiClient;
use crate::output::{print_error, print_warning, OutputFormat};

#[derive(Serialize)]
struct ChatExchange<'a> {
    message: &'a str,
    reply: &'a str,
}

/// Send one message and print the reply
pub async fn send_message(client: &ApiClient, message: &str, format: OutputFormat) -> Result<()> {
    let reply = client.chat(message).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ChatExchange {
                message,
                reply: &reply,
            })?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if reply == INITIALIZING_MESSAGE {
                print_warning(&reply);
            } else if let Some(error) = reply.strip_prefix("Error: ") {
                print_error(error);
            } else {
                println!("{}", reply);
            }
        }
    }

    Ok(())
}
