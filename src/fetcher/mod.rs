//! Page fetchers: load a URL and hand back the rendered document.
//!
//! Every backend implements [`PageFetcher`]. A call opens its own isolated
//! browsing context, waits for the requested [`WaitCondition`], and returns an
//! owned [`Document`]. Calls are bounded by the caller's timeout and release
//! everything they acquired on every exit path, including cancellation.
//!
//! | Backend | Module | Rendering |
//! |---------|--------|-----------|
//! | Headless Chromium | [`chrome`] | Local `--dump-dom`, fresh profile per call |
//! | Browserless | [`browserless`] | Remote `/content` API |
//! | Plain HTTP | [`http`] | No JavaScript |
//!
//! Access-denial is detected both from HTTP status (where the backend sees one)
//! and from page content via [`interstitial`].

pub mod browserless;
pub mod chrome;
pub mod http;
pub mod interstitial;
pub mod pool;

#[cfg(test)]
pub(crate) mod scripted;

use crate::config::{Backend, FetchConfig};
use crate::error::{FetchError, PipelineError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub use browserless::BrowserlessFetcher;
pub use chrome::ChromeFetcher;
pub use http::HttpFetcher;
pub use pool::BrowserPool;

/// What the fetcher waits for before capturing the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaitRepr", into = "WaitRepr")]
pub enum WaitCondition {
    /// Wait until the page's network activity has settled.
    NetworkIdle,
    /// Wait until a node matching this CSS selector is present.
    Selector(String),
    /// Wait a fixed number of milliseconds after navigation.
    FixedDelay(u64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WaitRepr {
    Named(String),
    Selector { selector: String },
    Delay { fixed_delay_ms: u64 },
}

impl TryFrom<WaitRepr> for WaitCondition {
    type Error = String;

    fn try_from(repr: WaitRepr) -> Result<Self, Self::Error> {
        match repr {
            WaitRepr::Named(name) if name == "network_idle" => Ok(WaitCondition::NetworkIdle),
            WaitRepr::Named(name) => Err(format!("unknown wait condition {name:?}")),
            WaitRepr::Selector { selector } => Ok(WaitCondition::Selector(selector)),
            WaitRepr::Delay { fixed_delay_ms } => Ok(WaitCondition::FixedDelay(fixed_delay_ms)),
        }
    }
}

impl From<WaitCondition> for WaitRepr {
    fn from(wait: WaitCondition) -> Self {
        match wait {
            WaitCondition::NetworkIdle => WaitRepr::Named("network_idle".to_string()),
            WaitCondition::Selector(selector) => WaitRepr::Selector { selector },
            WaitCondition::FixedDelay(fixed_delay_ms) => WaitRepr::Delay { fixed_delay_ms },
        }
    }
}

/// A loaded page. Owned and immutable; parsing happens in the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub html: String,
    /// HTTP status when the backend exposes one.
    pub status: Option<u16>,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            status,
            fetched_at: Utc::now(),
        }
    }
}

/// Loads a URL into a [`Document`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        wait: &WaitCondition,
        timeout: Duration,
    ) -> Result<Document, FetchError>;

    fn name(&self) -> &str;
}

/// Parse `url` and require http or https. Malformed URLs are terminal.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            message: format!("only http/https URLs are allowed, got {other}"),
        }),
    }
}

/// Map an HTTP status to a terminal access-denial, if it is one.
pub fn blocked_status(url: &str, status: u16) -> Option<FetchError> {
    match status {
        401 | 403 | 429 | 451 => Some(FetchError::Blocked {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        }),
        _ => None,
    }
}

/// Fail BLOCKED when a successfully loaded page is really a denial interstitial.
pub fn check_interstitial(url: &str, html: &str) -> Result<(), FetchError> {
    match interstitial::detect(html) {
        Some(marker) => Err(FetchError::Blocked {
            url: url.to_string(),
            reason: format!("access-denial page ({marker})"),
        }),
        None => Ok(()),
    }
}

/// Build the configured backend.
pub fn build_fetcher(config: &FetchConfig) -> Result<Arc<dyn PageFetcher>, PipelineError> {
    let fetcher: Arc<dyn PageFetcher> = match config.backend {
        Backend::Chrome => Arc::new(ChromeFetcher::new(
            config.chrome_bin.clone(),
            BrowserPool::new(config.pool_size),
        )),
        Backend::Http => Arc::new(HttpFetcher::new(&config.user_agent)?),
        Backend::Browserless => {
            let base_url = config.browserless_url.as_deref().ok_or_else(|| {
                PipelineError::Config("browserless backend needs a browserless_url".into())
            })?;
            Arc::new(BrowserlessFetcher::new(
                base_url,
                config.browserless_token.as_deref(),
                BrowserPool::new(config.pool_size),
            )?)
        }
    };
    Ok(fetcher)
}
