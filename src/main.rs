//! # Market Scout
//!
//! Fetches live stock quotes and market headlines from rendered finance pages
//! and prints them as text or JSON. Pages are loaded through a pluggable
//! backend (local headless Chromium, plain HTTP or a Browserless endpoint).
//!
//! ## Usage
//!
//! ```sh
//! market_scout quote AAPL GOOG TSLA
//! market_scout news "rate cut" --source reuters
//! market_scout --format json tool '{"tool":"search_news","query":"oil"}'
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: load a page with the configured backend
//! 2. **Extraction**: walk the selector fallback chain for the field
//! 3. **Normalization**: parse prices, changes and headlines into typed values
//! 4. **Retry**: back off on timeouts and missing content, stop on access denial
//!
//! A symbol or search that cannot be served comes back as "unavailable"
//! rather than failing the whole run.

use clap::Parser;
use market_scout::cli::{Cli, Command, OutputFormat};
use market_scout::config::Settings;
use market_scout::outputs::json;
use market_scout::pipeline::Pipeline;
use market_scout::tool::{self, ToolRequest, ToolResponse};
use market_scout::utils::ensure_writable_dir;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("market_scout starting up");

    let args = Cli::parse();
    debug!(?args.command, ?args.format, ?args.json_output_dir, "Parsed CLI arguments");

    // --- Settings: file, then flags/env ---
    let mut settings = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    args.apply(&mut settings);

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let pipeline = match Pipeline::from_settings(&settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let (kind, response) = match &args.command {
        Command::Quote { symbols } if symbols.len() == 1 => (
            "quote",
            ToolResponse::GetStockData(pipeline.quote(&symbols[0]).await),
        ),
        Command::Quote { symbols } => (
            "quotes",
            ToolResponse::GetStockQuotes(pipeline.quotes(symbols).await),
        ),
        Command::News { query, source } => (
            "news",
            ToolResponse::SearchNews(pipeline.news(&query.join(" "), source).await),
        ),
        Command::Tool { json } => {
            let request = ToolRequest::parse(json)?;
            ("tool", tool::invoke(&pipeline, request).await)
        }
    };

    match args.format {
        OutputFormat::Text => println!("{}", tool::render_text(&response)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
    }

    if let Some(dir) = &args.json_output_dir {
        let path = json::write_report(&response, kind, dir).await?;
        info!(path = %path.display(), "Saved report");
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        elapsed_ms = elapsed.as_millis() as u64,
        "market_scout completed"
    );
    Ok(())
}
