//! Remote headless-browser fetcher backed by a Browserless `/content` endpoint.
//!
//! Browserless opens a new incognito context per request, so isolation comes
//! for free. The wait condition is forwarded as launch options and the target
//! page's HTTP status comes back in the `X-Response-Code` header.

use super::{
    BrowserPool, Document, PageFetcher, WaitCondition, blocked_status, check_interstitial,
    validate_url,
};
use crate::error::{FetchError, PipelineError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

pub struct BrowserlessFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    pool: BrowserPool,
}

impl BrowserlessFetcher {
    pub fn new(base_url: &str, token: Option<&str>, pool: BrowserPool) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            pool,
        })
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={}", urlencoding::encode(token)));
        }
        endpoint
    }

    async fn render(&self, url: &str, wait: &WaitCondition, timeout: Duration) -> Result<Document, FetchError> {
        let resp = self
            .client
            .post(self.endpoint())
            .json(&content_request(url, wait, timeout))
            .send()
            .await
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 408 {
            return Err(FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(url, status = status.as_u16(), %message, "Browserless API error");
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: format!("browserless API error (status {status})"),
            });
        }

        let target_status = resp
            .headers()
            .get("x-response-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok());
        if let Some(blocked) = target_status.and_then(|code| blocked_status(url, code)) {
            return Err(blocked);
        }

        let html = resp.text().await.map_err(|e| FetchError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        check_interstitial(url, &html)?;
        Ok(Document::new(url, html, target_status))
    }
}

/// Request body for `/content`, carrying the wait condition.
fn content_request(url: &str, wait: &WaitCondition, timeout: Duration) -> Value {
    let timeout_ms = timeout.as_millis() as u64;
    let mut body = json!({
        "url": url,
        "gotoOptions": { "waitUntil": "domcontentloaded", "timeout": timeout_ms },
    });
    match wait {
        WaitCondition::NetworkIdle => {
            body["gotoOptions"]["waitUntil"] = json!("networkidle0");
        }
        WaitCondition::Selector(css) => {
            body["waitForSelector"] = json!({ "selector": css, "timeout": timeout_ms });
        }
        WaitCondition::FixedDelay(ms) => {
            body["waitForTimeout"] = json!(ms);
        }
    }
    body
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    #[instrument(level = "info", skip_all, fields(%url, fetcher = "browserless"))]
    async fn fetch(
        &self,
        url: &str,
        wait: &WaitCondition,
        timeout: Duration,
    ) -> Result<Document, FetchError> {
        validate_url(url)?;
        let t0 = Instant::now();
        let deadline = t0 + timeout;
        let _slot = self.pool.acquire(url, deadline).await?;

        let doc = tokio::time::timeout_at(deadline, self.render(url, wait, timeout))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            })??;

        info!(
            bytes = doc.html.len(),
            status = ?doc.status,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Rendered page via browserless"
        );
        Ok(doc)
    }

    fn name(&self) -> &str {
        "browserless"
    }
}
