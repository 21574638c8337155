//! Browser collaborator seams
//!
//! The runner never talks to a browser directly. It asks a [`BrowserLauncher`] for a
//! fresh [`Page`] per scenario attempt and drives it through these calls.
//! Reads return the current state without waiting; polling lives in
//! [`crate::expect`]. Actions wait for the element to become actionable up to
//! the implementation's own timeout.

use std::path::Path;
use async_trait::async_trait;

use crate::error::E2eResult;
use crate::spec::Locator;

/// Factory for isolated page contexts
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open a page in a brand new context (no cookies, storage or history shared)
    async fn new_page(&self) -> E2eResult<Box<dyn Page>>;
}

/// One page inside an exclusively owned browser context
#[async_trait]
pub trait Page: Send {
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    async fn click(&mut self, target: &Locator) -> E2eResult<()>;

    /// Replace the value of an input
    async fn fill(&mut self, target: &Locator, value: &str) -> E2eResult<()>;

    async fn press(&mut self, target: &Locator, key: &str) -> E2eResult<()>;

    /// Text content of the single matched element
    async fn text(&mut self, target: &Locator) -> E2eResult<String>;

    async fn input_value(&mut self, target: &Locator) -> E2eResult<String>;

    async fn count(&mut self, target: &Locator) -> E2eResult<usize>;

    /// False when nothing matches
    async fn is_visible(&mut self, target: &Locator) -> E2eResult<bool>;

    async fn url(&mut self) -> E2eResult<String>;

    /// Serialized DOM of the current document
    async fn content(&mut self) -> E2eResult<String>;

    /// Write a full-page PNG screenshot to `path`
    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    /// Tear down the context
    async fn close(self: Box<Self>) -> E2eResult<()>;
}
