//! Auto-retrying assertions
//!
//! Every assertion re-reads the page until the observation matches or the
//! expect timeout runs out, then reports the last thing it saw.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::spec::Locator;

/// What an assertion waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation<'a> {
    Text(&'a str),
    Count(usize),
    Visible(bool),
    Value(&'a str),
}

impl Expectation<'_> {
    fn expected(&self) -> String {
        match self {
            Expectation::Text(text) => normalize_whitespace(text),
            Expectation::Count(n) => n.to_string(),
            Expectation::Visible(visible) => visibility(*visible).to_string(),
            Expectation::Value(value) => value.to_string(),
        }
    }
}

fn visibility(visible: bool) -> &'static str {
    if visible { "visible" } else { "hidden" }
}

/// Collapse whitespace runs and trim, as browsers' text matchers do
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum Observed {
    Value(String),
    Missing,
}

/// Polling assertion helper
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    timeout: Duration,
    interval: Duration,
}

impl Expect {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_millis(100),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until `target` satisfies `expectation`
    pub async fn check(
        &self,
        page: &mut dyn Page,
        target: &Locator,
        expectation: Expectation<'_>,
    ) -> E2eResult<()> {
        let expected = expectation.expected();
        let start = Instant::now();

        let last = loop {
            let observed = match observe(page, target, expectation).await {
                Ok(value) if value == expected => return Ok(()),
                Ok(value) => Observed::Value(value),
                Err(E2eError::ElementNotFound { .. }) => Observed::Missing,
                Err(e) => return Err(e),
            };

            if start.elapsed() >= self.timeout {
                break observed;
            }
            sleep(self.interval).await;
        };

        debug!("Expectation on {} timed out after {:?}", target, self.timeout);

        match last {
            Observed::Missing => Err(E2eError::ElementNotFound {
                selector: target.to_string(),
            }),
            Observed::Value(observed) => Err(E2eError::Assertion {
                selector: target.to_string(),
                expected,
                observed,
            }),
        }
    }
}

async fn observe(
    page: &mut dyn Page,
    target: &Locator,
    expectation: Expectation<'_>,
) -> E2eResult<String> {
    match expectation {
        Expectation::Text(_) => Ok(normalize_whitespace(&page.text(target).await?)),
        Expectation::Count(_) => Ok(page.count(target).await?.to_string()),
        Expectation::Visible(_) => Ok(visibility(page.is_visible(target).await?).to_string()),
        Expectation::Value(_) => page.input_value(target).await,
    }
}
