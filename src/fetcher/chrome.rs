//! Headless Chromium fetcher.
//!
//! Renders pages with `chromium --headless --dump-dom`. Every call gets a fresh
//! temporary profile directory, so no cookies, storage or history leak between
//! concurrent fetches. The profile is removed when the call returns, and the
//! process is killed if the call is cancelled or times out.
//!
//! Wait conditions map onto Chromium's virtual time budget:
//! - network idle: a fixed budget long enough for typical quote widgets
//! - fixed delay: the delay itself
//! - selector present: re-render with growing budgets until the node shows up

use super::{BrowserPool, Document, PageFetcher, WaitCondition, check_interstitial, validate_url};
use crate::error::FetchError;
use crate::extractor::has_selector;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Virtual time granted to scripts when waiting for the network to settle.
const NETWORK_IDLE_BUDGET_MS: u64 = 5_000;

/// Budgets tried in turn while waiting for a selector; the last one repeats.
const SELECTOR_BUDGETS_MS: [u64; 4] = [1_000, 3_000, 8_000, 15_000];

#[derive(Debug, Clone)]
pub struct ChromeFetcher {
    chrome_bin: String,
    pool: BrowserPool,
}

impl ChromeFetcher {
    pub fn new(chrome_bin: impl Into<String>, pool: BrowserPool) -> Self {
        let chrome_bin = chrome_bin.into();
        info!(%chrome_bin, max_concurrent = pool.size(), "Using ChromeFetcher");
        Self { chrome_bin, pool }
    }

    /// Launch one isolated render and return the serialized DOM.
    async fn dump_dom(&self, url: &str, budget_ms: u64) -> Result<String, FetchError> {
        let profile = tempfile::tempdir().map_err(|e| FetchError::Navigation {
            url: url.to_string(),
            message: format!("creating browser profile: {e}"),
        })?;

        let output = Command::new(&self.chrome_bin)
            .args(chrome_args(url, &profile.path().display().to_string(), budget_ms))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                message: format!("launching {}: {e}", self.chrome_bin),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url, stderr = %truncate_for_log(&stderr, 300), "Chrome exited with error");
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: format!("chrome exited with {}", output.status),
            });
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: "empty DOM".to_string(),
            });
        }
        check_interstitial(url, &html)?;
        Ok(html)
    }

    async fn render(&self, url: &str, wait: &WaitCondition) -> Result<String, FetchError> {
        match wait {
            WaitCondition::NetworkIdle => self.dump_dom(url, NETWORK_IDLE_BUDGET_MS).await,
            WaitCondition::FixedDelay(ms) => self.dump_dom(url, *ms).await,
            WaitCondition::Selector(css) => {
                let mut round = 0usize;
                loop {
                    let budget = SELECTOR_BUDGETS_MS[round.min(SELECTOR_BUDGETS_MS.len() - 1)];
                    let html = self.dump_dom(url, budget).await?;
                    if has_selector(&html, css) {
                        return Ok(html);
                    }
                    debug!(url, selector = %css, budget_ms = budget, "Selector not rendered yet");
                    round += 1;
                }
            }
        }
    }
}

fn chrome_args(url: &str, profile_dir: &str, budget_ms: u64) -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        format!("--user-data-dir={profile_dir}"),
        format!("--virtual-time-budget={budget_ms}"),
        "--dump-dom".to_string(),
        url.to_string(),
    ]
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    #[instrument(level = "info", skip_all, fields(%url, fetcher = "chrome"))]
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

        let html = tokio::time::timeout_at(deadline, self.render(url, wait))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            })??;

        info!(
            bytes = html.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Rendered page"
        );
        Ok(Document::new(url, html, None))
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_args_isolate_profile() {
        let args = chrome_args("https://example.com", "/tmp/profile-1", 2000);
        assert!(args.contains(&"--user-data-dir=/tmp/profile-1".to_string()));
        assert!(args.contains(&"--virtual-time-budget=2000".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_navigation_error() {
        let fetcher = ChromeFetcher::new("/nonexistent/chromium-binary", BrowserPool::new(1));
        let err = fetcher
            .fetch(
                "https://example.com",
                &WaitCondition::NetworkIdle,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_skips_pool() {
        let pool = BrowserPool::new(1);
        let fetcher = ChromeFetcher::new("chromium", pool.clone());
        let err = fetcher
            .fetch("javascript:alert(1)", &WaitCondition::NetworkIdle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert_eq!(pool.available(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_browser_times_out_and_frees_slot() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("chromium");
        std::fs::write(&stub, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let pool = BrowserPool::new(1);
        let fetcher = ChromeFetcher::new(stub.display().to_string(), pool.clone());
        let t0 = std::time::Instant::now();
        let err = fetcher
            .fetch(
                "https://example.com",
                &WaitCondition::NetworkIdle,
                Duration::from_millis(300),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
        assert!(t0.elapsed() < Duration::from_secs(10));
        assert_eq!(pool.available(), pool.size());
    }
}
