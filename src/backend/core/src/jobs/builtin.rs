//! Built-in item processors.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::processor::{ItemContext, ItemError, ItemProcessor, ItemResult};

/// Delivers each payload item as a webhook POST.
///
/// Items are objects shaped `{"url": "...", "body": <any JSON>}`. A
/// non-success response fails the item — and with it the whole job, since
/// the core loop does not retry items. Deployments that want
/// per-destination tolerance wrap this processor and swallow what they
/// consider acceptable.
pub struct WebhookDeliveryProcessor {
    client: reqwest::Client,
}

impl WebhookDeliveryProcessor {
    /// Create a processor with the given per-delivery timeout.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ItemProcessor for WebhookDeliveryProcessor {
    fn name(&self) -> &'static str {
        "webhook_delivery"
    }

    async fn process(&self, item: &Value, ctx: &ItemContext<'_>) -> ItemResult {
        let url = item
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ItemError::new("item has no 'url' field"))?;
        let body = item.get("body").cloned().unwrap_or(Value::Null);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ItemError::new(format!("delivery to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ItemError::new(format!(
                "webhook endpoint {} returned {}",
                url,
                response.status()
            )));
        }

        debug!(
            handler = ctx.handler,
            job_id = %ctx.job.id,
            index = ctx.index,
            url = url,
            "Webhook delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, JobId, JobStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_job() -> Job {
        Job {
            id: JobId::new(),
            status: JobStatus::Processing,
            created_at: chrono::Utc::now(),
            created_by: "tests".to_string(),
            updated_at: None,
            started_processing_at: None,
            completed_at: None,
            failed_at: None,
            failure_reason: None,
            progress: 0,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_delivers_item_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({"event": "done"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let processor = WebhookDeliveryProcessor::new(Duration::from_secs(5)).unwrap();
        let job = sample_job();
        let ctx = ItemContext {
            handler: "webhooks",
            job: &job,
            index: 0,
        };
        let item = json!({
            "url": format!("{}/hook", server.uri()),
            "body": {"event": "done"},
        });

        processor.process(&item, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_response_fails_the_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let processor = WebhookDeliveryProcessor::new(Duration::from_secs(5)).unwrap();
        let job = sample_job();
        let ctx = ItemContext {
            handler: "webhooks",
            job: &job,
            index: 0,
        };
        let item = json!({"url": format!("{}/hook", server.uri())});

        let error = processor.process(&item, &ctx).await.unwrap_err();
        assert!(error.message().contains("500"));
    }

    #[tokio::test]
    async fn test_item_without_url_fails() {
        let processor = WebhookDeliveryProcessor::new(Duration::from_secs(5)).unwrap();
        let job = sample_job();
        let ctx = ItemContext {
            handler: "webhooks",
            job: &job,
            index: 0,
        };

        let error = processor.process(&json!({}), &ctx).await.unwrap_err();
        assert!(error.message().contains("url"));
    }
}
