//! Job management commands.
//!
//! Provides create, list, get, fail, and delete operations for jobs.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a new job (queues it and triggers the worker)
    Create {
        /// Handler identifier (e.g. webhooks)
        #[arg(short = 'H', long)]
        handler: String,

        /// Item payload as a JSON array, e.g. '["a","b","c"]'
        #[arg(short, long)]
        data: Option<String>,

        /// Path to a JSON file holding the item payload array
        #[arg(long, conflicts_with = "data")]
        data_file: Option<String>,

        /// Extra attributes as a JSON object, merged into the job document
        #[arg(short, long)]
        attrs: Option<String>,
    },

    /// List jobs
    List {
        /// Handler identifier
        #[arg(short = 'H', long)]
        handler: String,

        /// Filter by status (queued, processing, completed, failed);
        /// comma-separated for several
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Get a job document
    Get {
        /// Handler identifier
        #[arg(short = 'H', long)]
        handler: String,

        /// Job ID
        job_id: Uuid,
    },

    /// Fail a job with a reason
    Fail {
        /// Handler identifier
        #[arg(short = 'H', long)]
        handler: String,

        /// Job ID
        job_id: Uuid,

        /// Failure reason
        #[arg(short, long)]
        reason: String,
    },

    /// Delete a job
    Delete {
        /// Handler identifier
        #[arg(short = 'H', long)]
        handler: String,

        /// Job ID
        job_id: Uuid,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct JobInfo {
    id: Uuid,
    status: String,
    #[serde(default)]
    progress: u64,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Progress")]
    progress: u64,
    #[tabled(rename = "Created By")]
    created_by: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct DeleteResponse {
    id: Uuid,
    deleted: bool,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: JobCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        JobCommands::Create {
            handler,
            data,
            data_file,
            attrs,
        } => {
            let mut body: serde_json::Map<String, serde_json::Value> = match attrs {
                Some(raw) => serde_json::from_str(&raw)
                    .context("Failed to parse --attrs as a JSON object")?,
                None => serde_json::Map::new(),
            };

            let payload = match (data, data_file) {
                (Some(raw), _) => Some(
                    serde_json::from_str(&raw)
                        .context("Failed to parse --data as a JSON array")?,
                ),
                (None, Some(path)) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read payload file: {}", path))?;
                    Some(
                        serde_json::from_str(&content)
                            .context("Failed to parse payload file as a JSON array")?,
                    )
                }
                (None, None) => None,
            };
            if let Some(payload) = payload {
                body.insert("data".to_string(), payload);
            }

            let resp: JobInfo = client
                .post(&format!("/api/v1/jobs/{}", handler), &body)
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success("Job created");
                    output::print_detail("ID", &resp.id.to_string());
                    output::print_detail("Status", &resp.status);
                    output::print_detail("Handler", &handler);
                }
                _ => output::print_item(&resp, format),
            }
        }

        JobCommands::List { handler, status } => {
            let path = match &status {
                Some(s) => format!("/api/v1/jobs/{}?status={}", handler, s),
                None => format!("/api/v1/jobs/{}", handler),
            };

            let jobs: Vec<JobInfo> = client.get(&path).await?;

            let rows: Vec<JobRow> = jobs
                .into_iter()
                .map(|j| JobRow {
                    id: j.id.to_string(),
                    status: j.status,
                    progress: j.progress,
                    created_by: j.created_by,
                    created_at: j.created_at,
                })
                .collect();

            output::print_list(&rows, format);
        }

        JobCommands::Get { handler, job_id } => {
            let job: JobInfo = client
                .get(&format!("/api/v1/jobs/{}/{}", handler, job_id))
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Job: {}", job_id));
                    output::print_detail("Status", &job.status);
                    output::print_detail("Progress", &job.progress.to_string());
                    output::print_detail("Created By", &job.created_by);
                    output::print_detail("Created", &job.created_at);
                    if let Some(reason) = &job.failure_reason {
                        output::print_detail("Failure Reason", reason);
                    }
                }
                _ => output::print_item(&job, format),
            }
        }

        JobCommands::Fail {
            handler,
            job_id,
            reason,
        } => {
            let job: JobInfo = client
                .post(
                    &format!("/api/v1/jobs/{}/{}/fail", handler, job_id),
                    &serde_json::json!({ "reason": reason }),
                )
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Job {} failed", job_id));
                    output::print_detail(
                        "Reason",
                        job.failure_reason.as_deref().unwrap_or(&reason),
                    );
                }
                _ => output::print_item(&job, format),
            }
        }

        JobCommands::Delete { handler, job_id } => {
            let resp: DeleteResponse = client
                .delete(&format!("/api/v1/jobs/{}/{}", handler, job_id))
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Job {} deleted", resp.id));
                }
                _ => output::print_item(&resp, format),
            }
        }
    }

    Ok(())
}
