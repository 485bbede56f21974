use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::ProxyError;
use crate::metrics::{UPSTREAM_ERRORS, UPSTREAM_LATENCY};

pub const API_KEY_HEADER: &str = "x-goog-api-key";

// Forwards payloads to the image API with the server-side key attached
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl UpstreamClient {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        Ok(Self { client, url, api_key })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    // POST the payload untouched and hand back whatever JSON comes out
    pub async fn forward(&self, payload: &Value) -> Result<Value, ProxyError> {
        let api_key = self.api_key.as_deref().ok_or(ProxyError::MissingCredential)?;

        let start = Instant::now();
        tracing::info!(url = %self.url, "forwarding request upstream");

        let result = self.send(api_key, payload).await;

        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            UPSTREAM_ERRORS.inc();
            tracing::warn!(error = %e, status = e.status_code().as_u16(), "upstream call failed");
        }

        result
    }

    async fn send(&self, api_key: &str, payload: &Value) -> Result<Value, ProxyError> {
        let res = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, api_key)
            .json(payload)
            .send()
            .await?;

        let status = res.status();
        tracing::info!(status = status.as_u16(), "upstream responded");

        if status != StatusCode::OK {
            let details = match res.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read upstream error body");
                    format!("failed to read upstream error body: {}", e)
                }
            };
            return Err(ProxyError::Upstream { status, details });
        }

        let bytes = res.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProxyError::InvalidUpstreamBody(e.to_string()))
    }
}
