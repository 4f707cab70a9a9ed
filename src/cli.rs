//! Command-line interface definitions for Market Scout.
//!
//! Fetch-related options can be set via flags, environment variables or the
//! YAML config file; flags and environment win over the file.

use crate::config::{Backend, Settings};
use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for Market Scout.
///
/// # Examples
///
/// ```sh
/// # Quote a few symbols with the local headless Chromium
/// market_scout quote AAPL GOOG TSLA
///
/// # Search Reuters, print JSON and keep a report file
/// market_scout --format json -j ./reports news "chip stocks" --source reuters
///
/// # Run an agent tool call through a Browserless instance
/// BROWSERLESS_URL=http://localhost:3000 market_scout --backend browserless \
///     tool '{"tool":"get_stock_data","symbol":"aapl"}'
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Page-loading backend
    #[arg(long, value_enum, global = true)]
    pub backend: Option<Backend>,

    /// Chromium/Chrome binary for the chrome backend
    #[arg(long, env = "CHROME_BIN", global = true)]
    pub chrome_bin: Option<String>,

    /// Base URL of a Browserless instance
    #[arg(long, env = "BROWSERLESS_URL", global = true)]
    pub browserless_url: Option<String>,

    /// Browserless API token
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true, global = true)]
    pub browserless_token: Option<String>,

    /// Per-fetch timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Attempts per page before giving up
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Also write a JSON report file under this directory
    #[arg(short, long, env = "JSON_OUTPUT_DIR", global = true)]
    pub json_output_dir: Option<String>,

    /// Output format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch live quotes for one or more ticker symbols
    Quote {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Search a news source for market headlines
    News {
        /// Search terms (joined with spaces)
        #[arg(required = true)]
        query: Vec<String>,

        /// bloomberg, reuters, cnbc, wsj, financial times or dow jones
        #[arg(short, long, default_value = "bloomberg")]
        source: String,
    },
    /// Run a JSON tool call, e.g. '{"tool":"get_stock_data","symbol":"aapl"}'
    Tool { json: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Apply flag and environment overrides on top of file settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(backend) = self.backend {
            settings.fetch.backend = backend;
        }
        if let Some(bin) = &self.chrome_bin {
            settings.fetch.chrome_bin = bin.clone();
        }
        if let Some(url) = &self.browserless_url {
            settings.fetch.browserless_url = Some(url.clone());
        }
        if let Some(token) = &self.browserless_token {
            settings.fetch.browserless_token = Some(token.clone());
        }
        if let Some(ms) = self.timeout_ms {
            settings.fetch.timeout_ms = ms;
        }
        if let Some(n) = self.max_attempts {
            settings.retry.max_attempts = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_parsing() {
        let cli = Cli::parse_from(["market_scout", "quote", "aapl", "goog", "tsla"]);
        assert_eq!(
            cli.command,
            Command::Quote {
                symbols: vec!["aapl".into(), "goog".into(), "tsla".into()]
            }
        );
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.json_output_dir.is_none());
    }

    #[test]
    fn test_quote_requires_a_symbol() {
        assert!(Cli::try_parse_from(["market_scout", "quote"]).is_err());
    }

    #[test]
    fn test_news_parsing_with_source_and_global_flags() {
        let cli = Cli::parse_from([
            "market_scout",
            "news",
            "chip",
            "stocks",
            "--source",
            "reuters",
            "--format",
            "json",
            "-j",
            "/tmp/reports",
        ]);
        assert_eq!(
            cli.command,
            Command::News {
                query: vec!["chip".into(), "stocks".into()],
                source: "reuters".into()
            }
        );
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/reports"));
    }

    #[test]
    fn test_news_default_source() {
        let cli = Cli::parse_from(["market_scout", "news", "fed"]);
        assert!(matches!(cli.command, Command::News { ref source, .. } if source == "bloomberg"));
    }

    #[test]
    fn test_overrides_apply_to_settings() {
        let cli = Cli::parse_from([
            "market_scout",
            "--backend",
            "http",
            "--timeout-ms",
            "5000",
            "--max-attempts",
            "5",
            "tool",
            r#"{"tool":"get_stock_data","symbol":"aapl"}"#,
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.fetch.backend, Backend::Http);
        assert_eq!(settings.fetch.timeout_ms, 5000);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.fetch.pool_size, 2);
    }
}
