//! Runtime settings for the pipeline.
//!
//! Settings come from an optional YAML file; every section has defaults so an
//! empty or partial file is valid. CLI flags are applied on top in `main`.
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 1000
//!   max_delay_ms: 30000
//!   jitter_ms: 250
//! fetch:
//!   backend: chrome
//!   timeout_ms: 30000
//!   wait: network_idle        # or { selector: "#quote" } or { fixed_delay_ms: 2000 }
//!   pool_size: 2
//!   chrome_bin: chromium
//! concurrency: 4
//! news_limit: 5
//! ```

use crate::error::PipelineError;
use crate::fetcher::WaitCondition;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Retry/backoff parameters handed to the retry controller at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff delay.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Which page-loading backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Local headless Chromium (`--dump-dom`).
    Chrome,
    /// Plain HTTP GET without JavaScript rendering.
    Http,
    /// Remote headless browser behind a Browserless `/content` endpoint.
    Browserless,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub backend: Backend,
    pub timeout_ms: u64,
    pub wait: WaitCondition,
    /// Maximum number of browser renders in flight at once.
    pub pool_size: usize,
    pub chrome_bin: String,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Chrome,
            timeout_ms: 30_000,
            wait: WaitCondition::NetworkIdle,
            pool_size: 2,
            chrome_bin: "chromium".to_string(),
            browserless_url: None,
            browserless_token: None,
            user_agent: concat!("market_scout/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retry: RetryConfig,
    pub fetch: FetchConfig,
    /// Maximum number of symbols fetched in parallel.
    pub concurrency: usize,
    /// Maximum number of headlines returned per search.
    pub news_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
            concurrency: 4,
            news_limit: 5,
        }
    }
}

impl Settings {
    /// Parse settings from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load settings from a YAML file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
        let settings = Self::from_yaml(&text)?;
        info!("Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(PipelineError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.fetch.pool_size == 0 {
            return Err(PipelineError::Config("fetch.pool_size must be at least 1".into()));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(PipelineError::Config("fetch.timeout_ms must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::Config("concurrency must be at least 1".into()));
        }
        if self.news_limit == 0 {
            return Err(PipelineError::Config("news_limit must be at least 1".into()));
        }
        if let WaitCondition::Selector(css) = &self.fetch.wait {
            if scraper::Selector::parse(css).is_err() {
                return Err(PipelineError::Config(format!(
                    "fetch.wait selector {css:?} is not valid CSS"
                )));
            }
        }
        if self.fetch.backend == Backend::Browserless && self.fetch.browserless_url.is_none() {
            return Err(PipelineError::Config(
                "fetch.browserless_url is required for the browserless backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let s = Settings::from_yaml("").unwrap();
        assert_eq!(s, Settings::default());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r##"
retry:
  max_attempts: 5
fetch:
  backend: http
  wait:
    selector: "#quote-price"
concurrency: 2
"##;
        let s = Settings::from_yaml(yaml).unwrap();
        assert_eq!(s.retry.max_attempts, 5);
        assert_eq!(s.retry.base_delay_ms, 1000);
        assert_eq!(s.fetch.backend, Backend::Http);
        assert_eq!(s.fetch.wait, WaitCondition::Selector("#quote-price".to_string()));
        assert_eq!(s.fetch.pool_size, 2);
        assert_eq!(s.concurrency, 2);
        assert_eq!(s.news_limit, 5);
    }

    #[test]
    fn test_fixed_delay_wait() {
        let s = Settings::from_yaml("fetch:\n  wait:\n    fixed_delay_ms: 2000\n").unwrap();
        assert_eq!(s.fetch.wait, WaitCondition::FixedDelay(2000));
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let err = Settings::from_yaml("retry: [1, 2").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut s = Settings::default();
        s.retry.max_attempts = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut s = Settings::default();
        s.retry.base_delay_ms = 60_000;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_wait_selector() {
        let mut s = Settings::default();
        s.fetch.wait = WaitCondition::Selector("div[".to_string());
        assert!(matches!(s.validate(), Err(PipelineError::Config(_))));
        s.fetch.wait = WaitCondition::Selector("div.quote".to_string());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_browserless_url() {
        let mut s = Settings::default();
        s.fetch.backend = Backend::Browserless;
        assert!(s.validate().is_err());
        s.fetch.browserless_url = Some("http://localhost:3000".to_string());
        assert!(s.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "news_limit: 3\n").await.unwrap();
        let s = Settings::load(&path).await.unwrap();
        assert_eq!(s.news_limit, 3);
    }
}
