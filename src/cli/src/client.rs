//! HTTP client for communicating with the Conveyor API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// API response wrapper matching the server's ApiResponse format.
#[derive(Debug, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// HTTP client for the Conveyor API.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        let api_resp: ApiResponse<T> = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected response from {} ({}): {}", url, status, text))?;

        if api_resp.success {
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
        } else {
            Err(anyhow::anyhow!(
                "API error ({}): {}",
                status,
                api_resp.error.unwrap_or_else(|| "Unknown error".into())
            ))
        }
    }

    /// Perform a GET request and deserialize the response data.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// Perform a POST request with a JSON body and deserialize the response.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Perform a DELETE request and deserialize the response.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::DELETE, path, None).await
    }

    /// Perform a raw GET request and return the full JSON value (for the
    /// health endpoint, which is not wrapped in ApiResponse).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// POST without a body, expecting an empty 2xx response (the worker
    /// trigger endpoint). Extra headers carry the trigger token.
    pub async fn post_no_content(&self, path: &str, headers: &[(&str, &str)]) -> Result<StatusCode> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.post(&url);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(status)
    }
}
