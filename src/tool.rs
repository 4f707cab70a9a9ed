//! Agent tool surface.
//!
//! An agent sends one JSON object naming the tool and its arguments:
//!
//! ```json
//! {"tool": "get_stock_data", "symbol": "aapl"}
//! {"tool": "get_stock_quotes", "symbols": ["AAPL", "TSLA"]}
//! {"tool": "search_news", "query": "chip stocks", "news_source": "reuters"}
//! ```
//!
//! The response is typed ([`ToolResponse`]) and can also be rendered as the
//! plain-text summary agents read back ([`render_text`]).

use crate::error::PipelineError;
use crate::models::{NewsOutcome, QuoteOutcome, StockQuote, Unavailable};
use crate::pipeline::Pipeline;
use crate::utils::truncate_for_log;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Upper bound on symbols in one `get_stock_quotes` call.
pub const MAX_SYMBOLS: usize = 25;

fn default_news_source() -> String {
    "bloomberg".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    GetStockData {
        symbol: String,
    },
    GetStockQuotes {
        symbols: Vec<String>,
    },
    SearchNews {
        query: String,
        #[serde(default = "default_news_source")]
        news_source: String,
    },
}

impl ToolRequest {
    /// Parse and sanity-check a JSON tool call.
    pub fn parse(json: &str) -> Result<Self, PipelineError> {
        let request: ToolRequest = serde_json::from_str(json).map_err(|e| {
            PipelineError::InvalidInput(format!(
                "bad tool call {}: {e}",
                truncate_for_log(json, 200)
            ))
        })?;
        if let ToolRequest::GetStockQuotes { symbols } = &request {
            if symbols.is_empty() {
                return Err(PipelineError::InvalidInput(
                    "get_stock_quotes needs at least one symbol".to_string(),
                ));
            }
            if symbols.len() > MAX_SYMBOLS {
                return Err(PipelineError::InvalidInput(format!(
                    "get_stock_quotes accepts at most {MAX_SYMBOLS} symbols, got {}",
                    symbols.len()
                )));
            }
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "result", rename_all = "snake_case")]
pub enum ToolResponse {
    GetStockData(QuoteOutcome),
    GetStockQuotes(Vec<QuoteOutcome>),
    SearchNews(NewsOutcome),
}

/// Run a tool call. Never fails: missing data comes back as an unavailable outcome.
#[instrument(level = "info", skip_all)]
pub async fn invoke(pipeline: &Pipeline, request: ToolRequest) -> ToolResponse {
    debug!(?request, "Invoking tool");
    match request {
        ToolRequest::GetStockData { symbol } => ToolResponse::GetStockData(pipeline.quote(&symbol).await),
        ToolRequest::GetStockQuotes { symbols } => {
            ToolResponse::GetStockQuotes(pipeline.quotes(&symbols).await)
        }
        ToolRequest::SearchNews { query, news_source } => {
            ToolResponse::SearchNews(pipeline.news(&query, &news_source).await)
        }
    }
}

/// Plain-text summary of a response.
pub fn render_text(response: &ToolResponse) -> String {
    match response {
        ToolResponse::GetStockData(outcome) => render_quote(outcome),
        ToolResponse::GetStockQuotes(outcomes) => outcomes
            .iter()
            .map(render_quote)
            .collect::<Vec<_>>()
            .join("\n\n"),
        ToolResponse::SearchNews(outcome) => render_news(outcome),
    }
}

fn signed_percent(change: Decimal) -> String {
    if change.is_sign_positive() && !change.is_zero() {
        format!("+{change}%")
    } else {
        format!("{change}%")
    }
}

fn render_quote(outcome: &QuoteOutcome) -> String {
    match outcome {
        QuoteOutcome::Quote(StockQuote {
            symbol,
            price,
            currency,
            change_percent,
            source_url,
            ..
        }) => {
            let mut out = format!("Stock data for {symbol}:\nPrice: {price} {currency}");
            if let Some(change) = change_percent {
                out.push_str(&format!("\nChange: {}", signed_percent(*change)));
            }
            out.push_str(&format!("\nSource: {source_url}"));
            out
        }
        QuoteOutcome::Unavailable(u) => {
            format!("Stock data for {} unavailable: {}", u.subject, describe(u))
        }
    }
}

fn render_news(outcome: &NewsOutcome) -> String {
    match outcome {
        NewsOutcome::News {
            query,
            source,
            items,
            ..
        } => {
            let lines = items
                .iter()
                .map(|item| match &item.url {
                    Some(url) => format!("- {} ({url})", item.headline),
                    None => format!("- {}", item.headline),
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{source} news for '{query}':\n{lines}")
        }
        NewsOutcome::Unavailable(u) => {
            format!("News for '{}' unavailable: {}", u.subject, describe(u))
        }
    }
}

fn describe(u: &Unavailable) -> String {
    match u.attempts {
        0 => u.reason.to_string(),
        1 => format!("{} (1 attempt)", u.reason),
        n => format!("{} ({n} attempts)", u.reason),
    }
}
