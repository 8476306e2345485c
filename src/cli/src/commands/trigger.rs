//! Worker trigger command.
//!
//! Fires the same authenticated POST the self-dispatch loop uses, for
//! manually kicking a stalled queue.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct TriggerArgs {
    /// Handler identifier (e.g. webhooks)
    #[arg(short = 'H', long)]
    pub handler: String,

    /// Trigger token for the handler (printed in the server startup log)
    #[arg(short, long, env = "CONVEYOR_TRIGGER_TOKEN")]
    pub token: String,
}

pub async fn execute(args: TriggerArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client
        .post_no_content(
            &format!("/worker/{}", args.handler),
            &[("x-conveyor-token", args.token.as_str())],
        )
        .await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!(
                "Worker '{}' triggered ({})",
                args.handler, status
            ));
        }
        _ => output::print_item(
            &serde_json::json!({
                "handler": args.handler,
                "status": status.as_u16(),
            }),
            format,
        ),
    }

    Ok(())
}
