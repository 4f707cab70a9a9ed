//! Plain HTTP fetcher.
//!
//! Loads pages with a single `reqwest` GET and no JavaScript. Good enough for
//! server-rendered quote pages and much cheaper than a browser, so it doubles
//! as the backend for quick checks and tests against static fixtures.

use super::{Document, PageFetcher, WaitCondition, blocked_status, check_interstitial, validate_url};
use crate::error::{FetchError, PipelineError};
use crate::extractor::has_selector;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// How often a selector wait re-polls the page.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            // No cookie store: every request is its own isolated context.
            .build()
            .map_err(|e| PipelineError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn load(&self, url: &str) -> Result<Document, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| map_reqwest(url, e))?;
        let status = resp.status();
        if let Some(blocked) = blocked_status(url, status.as_u16()) {
            warn!(url, status = status.as_u16(), "Access denied by status");
            return Err(blocked);
        }
        if !status.is_success() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        let html = resp.text().await.map_err(|e| map_reqwest(url, e))?;
        check_interstitial(url, &html)?;
        Ok(Document::new(url, html, Some(status.as_u16())))
    }

    async fn load_until(&self, url: &str, wait: &WaitCondition) -> Result<Document, FetchError> {
        match wait {
            WaitCondition::NetworkIdle => self.load(url).await,
            WaitCondition::FixedDelay(ms) => {
                let doc = self.load(url).await?;
                sleep(Duration::from_millis(*ms)).await;
                Ok(doc)
            }
            WaitCondition::Selector(css) => loop {
                let doc = self.load(url).await?;
                if has_selector(&doc.html, css) {
                    return Ok(doc);
                }
                debug!(url, selector = %css, "Selector not present yet; polling again");
                sleep(SELECTOR_POLL_INTERVAL).await;
            },
        }
    }
}

fn map_reqwest(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after: Duration::ZERO,
        }
    } else {
        FetchError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url, fetcher = "http"))]
    async fn fetch(
        &self,
        url: &str,
        wait: &WaitCondition,
        timeout: Duration,
    ) -> Result<Document, FetchError> {
        validate_url(url)?;
        let t0 = Instant::now();
        let doc = tokio::time::timeout(timeout, self.load_until(url, wait))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            })??;
        info!(
            bytes = doc.html.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(doc)
    }

    fn name(&self) -> &str {
        "http"
    }
}
