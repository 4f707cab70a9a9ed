//! Where quotes and headlines live, and how to find them on each page.
//!
//! # Quote pages
//!
//! Tried in order; the first page that yields a price wins.
//!
//! | Page | URL |
//! |------|-----|
//! | Google Finance (NASDAQ listing) | `https://www.google.com/finance/quote/{SYM}:NASDAQ` |
//! | Google Finance | `https://www.google.com/finance/quote/{SYM}` |
//! | Yahoo Finance | `https://finance.yahoo.com/quote/{SYM}` |
//! | MarketWatch | `https://www.marketwatch.com/investing/stock/{sym}` |
//!
//! # News sources
//!
//! Bloomberg, Reuters, CNBC, WSJ, Financial Times and Dow Jones search pages.
//! Unknown source names fall back to Bloomberg.

use crate::models::{ExtractionTarget, FieldKind};
use itertools::Itertools;

/// Price selectors, primary layouts first, text pattern last.
pub const PRICE_SELECTORS: &[&str] = &[
    r#"[data-symbol] [data-field="regularMarketPrice"]"#,
    r#"[data-testid="qsp-price"]"#,
    r".Fw\(b\).Fz\(36px\)",
    ".YMlKec.fxKbKc",
    "bg-quote.value",
    ".intraday__price .value",
    r"text:(?i)(?:last|current)?\s*price[:\s]+((?:US)?\$?\s?[\d,]+\.\d+)",
];

/// Change selectors. Only nodes that carry a percentage are listed; absolute
/// moves (`regularMarketChange`, `qsp-price-change`) never parse as one.
pub const CHANGE_SELECTORS: &[&str] = &[
    r#"[data-field="regularMarketChangePercent"]"#,
    r#"[data-testid="qsp-price-change-percent"]"#,
    ".JwB6zf",
    ".change--percent--q bg-quote",
    r"text:([+\-−]?\d+(?:\.\d+)?%)",
];

/// Generic headline selectors tried after a source's own.
const GENERIC_HEADLINE_SELECTORS: &[&str] = &["article h3", "h3 a", "h2 a", "article h2"];

/// Words that mark a body-text line as market news.
const HEADLINE_KEYWORDS: &[&str] = &["stock", "market", "company", "business", "economy", "financial"];

/// Quote pages to try for `symbol`, in fallback order.
///
/// # Arguments
/// * `symbol` - Canonical ticker, already upper-cased.
///
/// # Returns
/// Google Finance (NASDAQ listing, then unqualified), Yahoo Finance, then
/// MarketWatch. Each is on a different host from the one before it.
pub fn quote_urls(symbol: &str) -> Vec<String> {
    vec![
        format!("https://www.google.com/finance/quote/{symbol}:NASDAQ"),
        format!("https://www.google.com/finance/quote/{symbol}"),
        format!("https://finance.yahoo.com/quote/{symbol}"),
        format!(
            "https://www.marketwatch.com/investing/stock/{}",
            symbol.to_lowercase()
        ),
    ]
}

fn owned(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}

/// Price extraction on a quote page.
///
/// # Arguments
/// * `url` - One of the [`quote_urls`].
///
/// # Returns
/// A target carrying the full [`PRICE_SELECTORS`] chain.
pub fn price_target(url: &str) -> ExtractionTarget {
    ExtractionTarget::new(url, PRICE_SELECTORS.iter().copied(), FieldKind::Price)
}

/// Change-percent extraction on a quote page, using [`CHANGE_SELECTORS`].
pub fn change_target(url: &str) -> ExtractionTarget {
    ExtractionTarget::new(url, CHANGE_SELECTORS.iter().copied(), FieldKind::Change)
}

/// A news site's search page and its headline selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsSource {
    pub name: &'static str,
    search_url: &'static str,
    headline_selectors: &'static [&'static str],
}

const BLOOMBERG: NewsSource = NewsSource {
    name: "bloomberg",
    search_url: "https://www.bloomberg.com/search?query={q}",
    headline_selectors: &[r#"[class*="headline"] a"#, r#"a[class*="headline"]"#],
};

const NEWS_SOURCES: &[(&str, NewsSource)] = &[
    ("bloomberg", BLOOMBERG),
    (
        "reuters",
        NewsSource {
            name: "reuters",
            search_url: "https://www.reuters.com/search/news?blob={q}",
            headline_selectors: &[r#"[data-testid="Heading"]"#, r#"a[data-testid="Title"]"#],
        },
    ),
    (
        "cnbc",
        NewsSource {
            name: "cnbc",
            search_url: "https://www.cnbc.com/search/?query={q}",
            headline_selectors: &[".SearchResult-searchResultTitle", ".Card-title"],
        },
    ),
    (
        "wall street journal",
        NewsSource {
            name: "wsj",
            search_url: "https://www.wsj.com/search?query={q}",
            headline_selectors: &[r#"[class*="headline"] a"#, "h3 a span"],
        },
    ),
    (
        "financial times",
        NewsSource {
            name: "ft",
            search_url: "https://www.ft.com/search?q={q}",
            headline_selectors: &[".o-teaser__heading a", ".js-teaser-heading-link"],
        },
    ),
    (
        "dow jones",
        NewsSource {
            name: "dow jones",
            search_url: "https://www.dowjones.com/search/?q={q}",
            headline_selectors: &[".search-result__title a", "article h4"],
        },
    ),
];

const ALIASES: &[(&str, &str)] = &[("wsj", "wall street journal"), ("ft", "financial times")];

impl NewsSource {
    /// Look up a source by (case-insensitive) name or alias; Bloomberg otherwise.
    pub fn resolve(name: &str) -> NewsSource {
        let key = name.split_whitespace().join(" ").to_lowercase();
        let key = ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, full)| full.to_string())
            .unwrap_or(key);
        NEWS_SOURCES
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, source)| *source)
            .unwrap_or(BLOOMBERG)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        NEWS_SOURCES.iter().map(|(k, _)| *k).chain(ALIASES.iter().map(|(a, _)| *a))
    }

    pub fn search_url(&self, query: &str) -> String {
        self.search_url.replace("{q}", &urlencoding::encode(query))
    }

    /// Source-specific selectors followed by the generic ones.
    pub fn headline_selectors(&self) -> Vec<String> {
        owned(self.headline_selectors)
            .into_iter()
            .chain(owned(GENERIC_HEADLINE_SELECTORS))
            .collect()
    }

    /// Headline extraction on this source's search results for `query`.
    pub fn headline_target(&self, query: &str) -> ExtractionTarget {
        ExtractionTarget {
            url: self.search_url(query),
            field_selectors: self.headline_selectors(),
            field_kind: FieldKind::Headline,
        }
    }
}

/// Body-text fallback: lines of plausible headline length that mention markets.
pub fn headline_lines(lines: &[String], limit: usize) -> Vec<String> {
    lines
        .iter()
        .filter(|line| {
            let len = line.chars().count();
            let lower = line.to_lowercase();
            len > 20 && len < 200 && HEADLINE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(limit)
        .cloned()
        .collect()
}
