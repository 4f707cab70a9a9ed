//! Data models for extraction requests and their typed results.
//!
//! - [`ExtractionTarget`]: what to load and which selectors to try
//! - [`ExtractionResult`]: the single, immutable outcome of one extraction call
//! - [`StockQuote`] and [`NewsItem`]: the typed values handed to callers
//! - [`Unavailable`]: the explicit "no data" marker with a human-readable reason
//!
//! All of these are request-scoped. Nothing here is cached or persisted.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of value an [`ExtractionTarget`] locates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    Price,
    Change,
    Headline,
    Link,
}

/// A page plus an ordered fallback chain of selectors.
///
/// Earlier selectors are strictly preferred: the extractor returns the first
/// one that matches a non-blank node even when a later one would also match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTarget {
    pub url: String,
    pub field_selectors: Vec<String>,
    pub field_kind: FieldKind,
}

impl ExtractionTarget {
    pub fn new<S: Into<String>>(url: impl Into<String>, selectors: impl IntoIterator<Item = S>, kind: FieldKind) -> Self {
        Self {
            url: url.into(),
            field_selectors: selectors.into_iter().map(Into::into).collect(),
            field_kind: kind,
        }
    }
}

/// The outcome category of an extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Ok,
    NotFound,
    Timeout,
    Blocked,
}

impl From<ErrorKind> for ResultKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Timeout => ResultKind::Timeout,
            ErrorKind::Blocked => ResultKind::Blocked,
            // Unparseable text is treated as absent data.
            ErrorKind::NotFound
            | ErrorKind::ParseError
            | ErrorKind::Exhausted
            | ErrorKind::InvalidInput => ResultKind::NotFound,
        }
    }
}

/// A price together with the currency it was quoted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFragment {
    pub price: Decimal,
    pub currency: String,
}

/// The typed value carried by a successful [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Price(PriceFragment),
    ChangePercent(Decimal),
    Headline(String),
    Link(String),
}

/// Produced once per extraction call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub kind: ResultKind,
    pub value: Option<Payload>,
    pub raw_text: Option<String>,
    pub attempts: u32,
}

impl ExtractionResult {
    pub fn ok(value: Payload, raw_text: String, attempts: u32) -> Self {
        Self {
            kind: ResultKind::Ok,
            value: Some(value),
            raw_text: Some(raw_text),
            attempts,
        }
    }

    pub fn failed(kind: ErrorKind, attempts: u32) -> Self {
        Self {
            kind: kind.into(),
            value: None,
            raw_text: None,
            attempts,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == ResultKind::Ok
    }
}

/// A news headline as presented on a source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub source: String,
    pub url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A live stock quote. `price` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    pub price: Decimal,
    pub currency: String,
    pub change_percent: Option<Decimal>,
    pub as_of: DateTime<Utc>,
    pub source_url: String,
}

/// Why data could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    RateLimited,
    LayoutChanged,
    NetworkTimeout,
    InvalidRequest,
}

impl From<ErrorKind> for UnavailableReason {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Blocked => UnavailableReason::RateLimited,
            ErrorKind::Timeout => UnavailableReason::NetworkTimeout,
            ErrorKind::NotFound | ErrorKind::ParseError | ErrorKind::Exhausted => {
                UnavailableReason::LayoutChanged
            }
            ErrorKind::InvalidInput => UnavailableReason::InvalidRequest,
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnavailableReason::RateLimited => "rate-limited",
            UnavailableReason::LayoutChanged => "page layout changed",
            UnavailableReason::NetworkTimeout => "network timeout",
            UnavailableReason::InvalidRequest => "invalid request",
        };
        f.write_str(s)
    }
}

/// Explicit "no data" marker. A valid, expected outcome, not a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unavailable {
    /// The symbol or query the caller asked about.
    pub subject: String,
    pub reason: UnavailableReason,
    pub detail: String,
    pub attempts: u32,
}

/// Per-symbol outcome of a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Quote(StockQuote),
    Unavailable(Unavailable),
}

impl QuoteOutcome {
    pub fn quote(&self) -> Option<&StockQuote> {
        match self {
            QuoteOutcome::Quote(q) => Some(q),
            QuoteOutcome::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.quote().is_some()
    }
}

/// Outcome of a news search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NewsOutcome {
    News {
        query: String,
        source: String,
        url: String,
        items: Vec<NewsItem>,
    },
    Unavailable(Unavailable),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_has_no_value() {
        let r = ExtractionResult::failed(ErrorKind::ParseError, 3);
        assert_eq!(r.kind, ResultKind::NotFound);
        assert!(r.value.is_none());
        assert!(r.raw_text.is_none());
        assert_eq!(r.attempts, 3);
        assert!(!r.is_ok());
    }

    #[test]
    fn test_unavailable_reason_mapping() {
        assert_eq!(UnavailableReason::from(ErrorKind::Blocked), UnavailableReason::RateLimited);
        assert_eq!(UnavailableReason::from(ErrorKind::Timeout), UnavailableReason::NetworkTimeout);
        assert_eq!(UnavailableReason::from(ErrorKind::NotFound), UnavailableReason::LayoutChanged);
        assert_eq!(UnavailableReason::RateLimited.to_string(), "rate-limited");
    }

    #[test]
    fn test_quote_outcome_serialization() {
        let outcome = QuoteOutcome::Unavailable(Unavailable {
            subject: "GOOG".to_string(),
            reason: UnavailableReason::NetworkTimeout,
            detail: "timed out".to_string(),
            attempts: 3,
        });
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""status":"unavailable""#));
        assert!(json.contains(r#""reason":"network_timeout""#));
        assert!(!outcome.is_available());
    }

    #[test]
    fn test_target_builder() {
        let t = ExtractionTarget::new("https://example.com", [".a", ".b"], FieldKind::Price);
        assert_eq!(t.field_selectors, vec![".a".to_string(), ".b".to_string()]);
        assert_eq!(t.field_kind, FieldKind::Price);
    }
}
