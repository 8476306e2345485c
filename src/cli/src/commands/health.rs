//! Health check command.
//!
//! Queries the `/health` endpoint and displays server status and the
//! registered handlers.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {}

pub async fn execute(_args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = health
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            output::print_header("Server Health");
            output::print_detail("Status", status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }

            if let Some(handlers) = health.get("handlers").and_then(|v| v.as_array()) {
                let names: Vec<&str> = handlers.iter().filter_map(|h| h.as_str()).collect();
                output::print_detail("Handlers", &names.join(", "));
            }

            if status == "healthy" {
                output::print_success("Server is up");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format),
    }

    Ok(())
}
