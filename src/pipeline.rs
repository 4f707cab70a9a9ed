//! The extraction pipeline: fetch → extract → normalize, under retry.
//!
//! Every public operation returns a typed value the caller can branch on.
//! Missing data is an expected outcome ([`Unavailable`]), so one bad symbol
//! never prevents the others in a compound request from completing.

use crate::config::{RetryConfig, Settings};
use crate::error::{ErrorKind, ExtractionError, PipelineError};
use crate::extractor::{self, RawItem, SelectorStrategy};
use crate::fetcher::{self, Document, PageFetcher, WaitCondition};
use crate::models::{
    ExtractionResult, ExtractionTarget, FieldKind, NewsItem, NewsOutcome, Payload, QuoteOutcome,
    StockQuote, Unavailable,
};
use crate::normalize::{
    canonical_query, canonical_symbol, normalize_change_percent, normalize_news, normalize_price,
};
use crate::retry::{Retried, RetryController, RetryError};
use crate::sources::{self, NewsSource};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

/// Extra raw headlines pulled per requested one, so de-duplication can still fill the list.
const NEWS_OVERFETCH: usize = 3;

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryConfig,
    wait: WaitCondition,
    timeout: Duration,
    concurrency: usize,
    news_limit: usize,
}

impl Pipeline {
    /// Assemble a pipeline around an already-built fetcher.
    ///
    /// # Arguments
    /// * `fetcher` - Backend shared by every extraction.
    /// * `settings` - Retry budget, wait condition, timeout, concurrency and news limit.
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &Settings) -> Self {
        Self {
            fetcher,
            retry: settings.retry.clone(),
            wait: settings.fetch.wait.clone(),
            timeout: settings.fetch.timeout(),
            concurrency: settings.concurrency.max(1),
            news_limit: settings.news_limit,
        }
    }

    /// Validate `settings` and build the configured fetcher backend.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        settings.validate()?;
        let fetcher = fetcher::build_fetcher(&settings.fetch)?;
        info!(
            fetcher = fetcher.name(),
            max_attempts = settings.retry.max_attempts,
            timeout_ms = settings.fetch.timeout_ms,
            "Pipeline ready"
        );
        Ok(Self::new(fetcher, settings))
    }

    fn controller(&self) -> RetryController {
        RetryController::new(self.retry.clone())
    }

    async fn fetch(&self, url: &str) -> Result<Document, PipelineError> {
        Ok(self.fetcher.fetch(url, &self.wait, self.timeout).await?)
    }

    /// Fetch one field under retry and return its typed value.
    ///
    /// # Arguments
    ///
    /// * `target` - Page URL, selector chain and the kind of field to read
    ///
    /// # Returns
    ///
    /// An [`ExtractionResult`] for every fetched outcome, including exhausted
    /// retries and access denial. Malformed input (an unusable URL or a
    /// selector that does not parse) is an `Err` and no page is loaded.
    #[instrument(level = "info", skip_all, fields(url = %target.url, kind = ?target.field_kind))]
    pub async fn extract(&self, target: &ExtractionTarget) -> Result<ExtractionResult, PipelineError> {
        fetcher::validate_url(&target.url)?;
        let chain = extractor::parse_chain(&target.field_selectors)?;
        let chain = &chain;

        let outcome = self
            .controller()
            .run(move |_| async move {
                let doc = self.fetch(&target.url).await?;
                let raw = match target.field_kind {
                    FieldKind::Change => extractor::extract_where(&doc, chain, is_change_percent)?,
                    _ => extractor::extract(&doc, chain)?,
                };
                let payload = to_payload(target.field_kind, &raw, &doc)?;
                Ok::<_, PipelineError>((payload, raw))
            })
            .await;

        match outcome {
            Ok(Retried {
                value: (payload, raw),
                attempts,
            }) => Ok(ExtractionResult::ok(payload, raw, attempts)),
            Err(RetryError::Terminal { source, attempts }) if source.kind() == ErrorKind::Blocked => {
                Ok(ExtractionResult::failed(ErrorKind::Blocked, attempts))
            }
            Err(RetryError::Terminal { source, .. }) => Err(source),
            Err(RetryError::Exhausted { last, attempts }) => {
                Ok(ExtractionResult::failed(last.kind(), attempts))
            }
        }
    }

    async fn quote_from(&self, symbol: &str, url: &str) -> Result<Retried<StockQuote>, RetryError> {
        let terminal = |source| RetryError::Terminal { source, attempts: 0 };
        let price_chain = extractor::parse_chain(&sources::price_target(url).field_selectors).map_err(terminal)?;
        let change_chain = extractor::parse_chain(&sources::change_target(url).field_selectors).map_err(terminal)?;
        let (price_chain, change_chain) = (&price_chain, &change_chain);

        self.controller()
            .run(move |_| async move {
                let doc = self.fetch(url).await?;
                let raw_price = extractor::extract(&doc, price_chain)?;
                let price = normalize_price(&raw_price)?;
                // Change is optional: a page with a price but no change still yields a quote.
                let change_percent = extractor::extract_where(&doc, change_chain, is_change_percent)
                    .ok()
                    .and_then(|raw| normalize_change_percent(&raw).ok());
                Ok::<_, PipelineError>(StockQuote {
                    symbol: symbol.to_string(),
                    price: price.price,
                    currency: price.currency,
                    change_percent,
                    as_of: doc.fetched_at,
                    source_url: url.to_string(),
                })
            })
            .await
    }

    /// Quote one symbol, trying each quote page in order.
    #[instrument(level = "info", skip_all, fields(symbol = %input))]
    pub async fn quote(&self, input: &str) -> QuoteOutcome {
        let symbol = match canonical_symbol(input) {
            Ok(s) => s,
            Err(e) => return QuoteOutcome::Unavailable(unavailable(input, &e, 0, e.to_string())),
        };

        let mut attempts = 0;
        let mut failures = Vec::new();
        let mut last = None;
        for url in sources::quote_urls(&symbol) {
            match self.quote_from(&symbol, &url).await {
                Ok(retried) => {
                    info!(
                        %url,
                        price = %retried.value.price,
                        attempts = retried.attempts,
                        "Quote extracted"
                    );
                    return QuoteOutcome::Quote(retried.value);
                }
                Err(e) => {
                    warn!(%url, attempts = e.attempts(), error = %e, "Quote page failed; trying next");
                    attempts += e.attempts();
                    failures.push(format!("{url}: {}", e.error()));
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) => QuoteOutcome::Unavailable(unavailable(&symbol, e.error(), attempts, failures.join("; "))),
            None => QuoteOutcome::Unavailable(unavailable(
                &symbol,
                &PipelineError::from(ExtractionError::NotFound { tried: 0 }),
                0,
                "no quote pages configured".to_string(),
            )),
        }
    }

    /// Quote several symbols concurrently. Output order follows input order and
    /// every symbol gets an outcome.
    #[instrument(level = "info", skip_all, fields(count = symbols.len()))]
    pub async fn quotes(&self, symbols: &[String]) -> Vec<QuoteOutcome> {
        let outcomes: Vec<QuoteOutcome> = stream::iter(symbols)
            .map(|s| self.quote(s))
            .buffered(self.concurrency)
            .collect()
            .await;

        let available = outcomes.iter().filter(|o| o.is_available()).count();
        info!(
            total = outcomes.len(),
            available,
            unavailable = outcomes.len() - available,
            "Completed quote batch"
        );
        outcomes
    }

    /// Search a news source and return de-duplicated headlines in page order.
    #[instrument(level = "info", skip_all, fields(%query, %source_name))]
    pub async fn news(&self, query: &str, source_name: &str) -> NewsOutcome {
        let query = match canonical_query(query) {
            Ok(q) => q,
            Err(e) => return NewsOutcome::Unavailable(unavailable(query, &e, 0, e.to_string())),
        };
        let source = NewsSource::resolve(source_name);
        let target = source.headline_target(&query);
        let chain = match extractor::parse_chain(&target.field_selectors) {
            Ok(chain) => chain,
            Err(e) => return NewsOutcome::Unavailable(unavailable(&query, &e, 0, e.to_string())),
        };
        let limit = self.news_limit;
        let (target_ref, chain) = (&target, &chain);

        let outcome = self
            .controller()
            .run(move |_| async move {
                let doc = self.fetch(&target_ref.url).await?;
                let items = headlines_from(&doc, chain, source.name, limit);
                if items.is_empty() {
                    return Err(ExtractionError::NotFound { tried: chain.len() }.into());
                }
                Ok::<_, PipelineError>(items)
            })
            .await;

        match outcome {
            Ok(retried) => {
                info!(count = retried.value.len(), attempts = retried.attempts, "Headlines extracted");
                NewsOutcome::News {
                    query,
                    source: source.name.to_string(),
                    url: target.url,
                    items: retried.value,
                }
            }
            Err(e) => {
                warn!(error = %e, "News search unavailable");
                NewsOutcome::Unavailable(unavailable(&query, e.error(), e.attempts(), e.to_string()))
            }
        }
    }
}

/// Headlines by selector chain, falling back to market-flavoured body lines.
fn headlines_from(doc: &Document, chain: &[SelectorStrategy], source: &str, limit: usize) -> Vec<NewsItem> {
    let overfetch = limit.saturating_mul(NEWS_OVERFETCH);
    let mut raw = extractor::extract_all(doc, chain, overfetch);
    if raw.is_empty() {
        raw = sources::headline_lines(&extractor::body_lines(doc), overfetch)
            .into_iter()
            .map(|text| RawItem {
                text,
                link: None,
                datetime: None,
            })
            .collect();
    }
    let mut items = normalize_news(raw, source);
    items.truncate(limit);
    items
}

/// Change nodes may hold an absolute move; only percentages are taken.
fn is_change_percent(raw: &str) -> bool {
    normalize_change_percent(raw).is_ok()
}

fn to_payload(kind: FieldKind, raw: &str, doc: &Document) -> Result<Payload, PipelineError> {
    Ok(match kind {
        FieldKind::Price => Payload::Price(normalize_price(raw)?),
        FieldKind::Change => Payload::ChangePercent(normalize_change_percent(raw)?),
        FieldKind::Headline => Payload::Headline(raw.to_string()),
        FieldKind::Link => {
            let link = Url::parse(&doc.url)
                .and_then(|base| base.join(raw))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string());
            Payload::Link(link)
        }
    })
}

fn unavailable(subject: &str, error: &PipelineError, attempts: u32, detail: String) -> Unavailable {
    Unavailable {
        subject: subject.to_string(),
        reason: error.kind().into(),
        detail,
        attempts,
    }
}
