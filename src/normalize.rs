//! Turn raw extracted strings into typed values.
//!
//! - [`normalize_price`]: `"$1,234.56"` → `1234.56 USD`
//! - [`normalize_change_percent`]: `"-0.65%"`, `"+2.10 (+1.23%)"` → signed decimal
//! - [`normalize_news`]: raw headline matches → de-duplicated [`NewsItem`]s
//! - [`canonical_symbol`] / [`canonical_query`]: validate caller input
//!
//! Parse failures are [`ParseError`]s; callers report them as "not found".

use crate::error::{ParseError, PipelineError};
use crate::extractor::RawItem;
use crate::models::{NewsItem, PriceFragment};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

const DEFAULT_CURRENCY: &str = "USD";
const MAX_QUERY_LEN: usize = 200;

/// Currency symbols, longest first so `US$` wins over `$`.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("HK$", "HKD"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
];

const ISO_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "HKD", "INR", "KRW", "SEK",
];

/// A sign only counts when it sits directly on the digits ("-3.50", not "Apple - 189.84").
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([-−]?)(\d+(?:\.\d+)?)").expect("number regex"));
static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+\-−]?)\s*(\d+(?:\.\d+)?)\s*%").expect("percent regex"));
static ISO_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{3})\b").expect("iso regex"));
static SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9^][A-Z0-9.\-^=]{0,14}$").expect("symbol regex"));

/// Detect the quoted currency; `USD` when nothing is recognised.
pub fn detect_currency(raw: &str) -> String {
    if let Some((_, code)) = CURRENCY_SYMBOLS.iter().find(|(sym, _)| raw.contains(sym)) {
        return code.to_string();
    }
    ISO_CODE
        .captures_iter(raw)
        .map(|c| c[1].to_string())
        .find(|code| ISO_CODES.contains(&code.as_str()))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// Parse a price. Strips currency symbols and thousands separators, then
/// takes the first decimal number. Prices are never negative.
///
/// # Arguments
/// * `raw` - Node text such as `"$1,234.56"` or `"189.84 USD"`.
///
/// # Returns
/// The price with its detected currency, or a [`ParseError`] when no number
/// is present or it carries a minus sign.
pub fn normalize_price(raw: &str) -> Result<PriceFragment, ParseError> {
    let currency = detect_currency(raw);
    let mut cleaned = raw.replace(',', "");
    for (sym, _) in CURRENCY_SYMBOLS {
        cleaned = cleaned.replace(sym, " ");
    }

    let caps = NUMBER
        .captures(&cleaned)
        .ok_or_else(|| ParseError::NoNumber(raw.to_string()))?;
    if !caps[1].is_empty() {
        return Err(ParseError::Negative(raw.to_string()));
    }
    let price = Decimal::from_str(&caps[2]).map_err(|_| ParseError::NoNumber(raw.to_string()))?;
    Ok(PriceFragment { price, currency })
}

/// Parse a percentage change. A missing sign means positive.
pub fn normalize_change_percent(raw: &str) -> Result<Decimal, ParseError> {
    let cleaned = raw.replace(',', "");
    let caps = PERCENT
        .captures(&cleaned)
        .ok_or_else(|| ParseError::NoPercent(raw.to_string()))?;
    let magnitude =
        Decimal::from_str(&caps[2]).map_err(|_| ParseError::NoPercent(raw.to_string()))?;
    match &caps[1] {
        "-" | "−" => Ok(-magnitude),
        _ => Ok(magnitude),
    }
}

/// Case- and whitespace-insensitive key used to de-duplicate headlines.
pub fn headline_key(headline: &str) -> String {
    headline.split_whitespace().join(" ").to_lowercase()
}

/// Build news items from raw matches: tidy whitespace, drop duplicates
/// (first occurrence wins) and keep page order.
pub fn normalize_news(raw_items: Vec<RawItem>, source: &str) -> Vec<NewsItem> {
    raw_items
        .into_iter()
        .map(|raw| NewsItem {
            headline: raw.text.split_whitespace().join(" "),
            source: source.to_string(),
            url: raw.link,
            timestamp: raw.datetime.as_deref().and_then(parse_timestamp),
        })
        .filter(|item| !item.headline.is_empty())
        .unique_by(|item| headline_key(&item.headline))
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve free-text ticker input to a canonical uppercase symbol.
pub fn canonical_symbol(input: &str) -> Result<String, PipelineError> {
    let symbol = input.trim().trim_start_matches('$').trim().to_uppercase();
    if SYMBOL.is_match(&symbol) {
        Ok(symbol)
    } else {
        Err(PipelineError::InvalidInput(format!("not a ticker symbol: {input:?}")))
    }
}

/// Tidy a news query; rejects empty and overlong queries.
pub fn canonical_query(input: &str) -> Result<String, PipelineError> {
    let query = input.split_whitespace().join(" ");
    if query.is_empty() {
        return Err(PipelineError::InvalidInput("empty news query".to_string()));
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(PipelineError::InvalidInput(format!(
            "news query longer than {MAX_QUERY_LEN} characters"
        )));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn raw(text: &str) -> RawItem {
        RawItem {
            text: text.to_string(),
            link: None,
            datetime: None,
        }
    }

    #[test]
    fn test_dollar_price_with_thousands() {
        let p = normalize_price("$1,234.56").unwrap();
        assert_eq!(p.price, dec("1234.56"));
        assert_eq!(p.currency, "USD");
    }

    #[test]
    fn test_plain_price_defaults_to_usd() {
        let p = normalize_price("189.84").unwrap();
        assert_eq!(p.price, dec("189.84"));
        assert_eq!(p.currency, "USD");
    }

    #[test]
    fn test_other_currencies() {
        assert_eq!(normalize_price("€98.10").unwrap().currency, "EUR");
        assert_eq!(normalize_price("£1,020.00").unwrap().price, dec("1020.00"));
        assert_eq!(normalize_price("2,450.00 GBP").unwrap().currency, "GBP");
        assert_eq!(normalize_price("HK$312.40").unwrap().currency, "HKD");
    }

    #[test]
    fn test_malformed_prices_are_parse_errors() {
        for bad in ["N/A", "", "--", "   ", "Price unavailable"] {
            assert!(
                matches!(normalize_price(bad), Err(ParseError::NoNumber(_))),
                "expected NoNumber for {bad:?}"
            );
        }
    }

    #[test]
    fn test_negative_price_is_rejected() {
        assert!(matches!(normalize_price("-3.50"), Err(ParseError::Negative(_))));
    }

    #[test]
    fn test_detached_dash_is_not_a_sign() {
        assert_eq!(normalize_price("Apple - 189.84").unwrap().price, dec("189.84"));
        assert_eq!(normalize_price("AAPL – $ 189.84").unwrap().price, dec("189.84"));
        assert!(matches!(normalize_price("−3.50"), Err(ParseError::Negative(_))));
    }

    #[test]
    fn test_price_with_trailing_change() {
        let p = normalize_price("212.44 +1.20 (+0.57%)").unwrap();
        assert_eq!(p.price, dec("212.44"));
    }

    #[test]
    fn test_change_percent_signs() {
        assert_eq!(normalize_change_percent("+1.23%").unwrap(), dec("1.23"));
        assert_eq!(normalize_change_percent("-0.65%").unwrap(), dec("-0.65"));
        assert_eq!(normalize_change_percent("−2.10%").unwrap(), dec("-2.10"));
        assert_eq!(normalize_change_percent("0.40%").unwrap(), dec("0.40"));
    }

    #[test]
    fn test_change_percent_inside_parentheses() {
        assert_eq!(normalize_change_percent("+2.10 (+1.23%)").unwrap(), dec("1.23"));
        assert_eq!(normalize_change_percent("-1.05 (-0.50%)").unwrap(), dec("-0.50"));
    }

    #[test]
    fn test_change_without_percent_fails() {
        assert!(matches!(normalize_change_percent("+2.10"), Err(ParseError::NoPercent(_))));
    }

    #[test]
    fn test_news_dedup_first_occurrence_wins() {
        let items = normalize_news(
            vec![raw("Fed raises rates"), raw("FED RAISES RATES "), raw("Fed raises rates")],
            "reuters",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].headline, "Fed raises rates");
        assert_eq!(items[0].source, "reuters");
    }

    #[test]
    fn test_news_preserves_page_order() {
        let items = normalize_news(
            vec![raw("Stocks rally"), raw("Oil slides"), raw("stocks   rally"), raw("Bonds steady")],
            "cnbc",
        );
        let headlines: Vec<_> = items.iter().map(|i| i.headline.as_str()).collect();
        assert_eq!(headlines, vec!["Stocks rally", "Oil slides", "Bonds steady"]);
    }

    #[test]
    fn test_news_timestamp_parsing() {
        let mut item = raw("Fed holds");
        item.datetime = Some("2025-05-06T14:00:00-04:00".to_string());
        let mut bad = raw("Markets open");
        bad.datetime = Some("2 hours ago".to_string());
        let items = normalize_news(vec![item, bad], "wsj");
        assert_eq!(items[0].timestamp.unwrap().to_rfc3339(), "2025-05-06T18:00:00+00:00");
        assert_eq!(items[1].timestamp, None);
    }

    #[test]
    fn test_canonical_symbol() {
        assert_eq!(canonical_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(canonical_symbol("$tsla").unwrap(), "TSLA");
        assert_eq!(canonical_symbol("brk.b").unwrap(), "BRK.B");
        assert_eq!(canonical_symbol("^gspc").unwrap(), "^GSPC");
        assert!(canonical_symbol("").is_err());
        assert!(canonical_symbol("apple inc").is_err());
        assert!(canonical_symbol("AAPL/../x").is_err());
    }

    #[test]
    fn test_canonical_query() {
        assert_eq!(canonical_query("  tech   stocks ").unwrap(), "tech stocks");
        assert!(canonical_query("   ").is_err());
        assert!(canonical_query(&"x".repeat(201)).is_err());
    }
}
