//! In-memory fetcher for tests: each URL replays a script of responses.

use super::{Document, PageFetcher, WaitCondition, check_interstitial, validate_url};
use crate::error::FetchError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Page(String),
    /// Sleep past the caller's timeout, then report TIMEOUT.
    Hang,
    Fail(FetchError),
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue steps for `url`. The last step repeats once the queue runs dry.
    pub(crate) fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into_iter().collect());
        self
    }

    pub(crate) fn page(self, url: &str, html: &str) -> Self {
        self.script(url, vec![Step::Page(html.to_string())])
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Step::Fail(FetchError::Navigation {
                url: url.to_string(),
                message: "no script".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _wait: &WaitCondition,
        timeout: Duration,
    ) -> Result<Document, FetchError> {
        validate_url(url)?;
        self.calls.lock().unwrap().push(url.to_string());
        match self.next_step(url) {
            Step::Page(html) => {
                check_interstitial(url, &html)?;
                Ok(Document::new(url, html, Some(200)))
            }
            Step::Hang => {
                tokio::time::sleep(timeout).await;
                Err(FetchError::Timeout {
                    url: url.to_string(),
                    after: timeout,
                })
            }
            Step::Fail(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
