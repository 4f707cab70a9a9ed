//! Resilient stock-quote and market-news extraction.
//!
//! [`pipeline::Pipeline`] composes a [`fetcher::PageFetcher`], the selector
//! fallback [`extractor`], the [`retry`] controller and the [`normalize`]
//! functions. [`tool`] exposes the pipeline as JSON tool calls.

pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod outputs;
pub mod pipeline;
pub mod retry;
pub mod sources;
pub mod tool;
pub mod utils;

pub use error::{ErrorKind, PipelineError};
pub use models::{ExtractionResult, ExtractionTarget, NewsItem, NewsOutcome, QuoteOutcome, StockQuote};
pub use pipeline::Pipeline;
