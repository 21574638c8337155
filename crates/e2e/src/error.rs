//! Error types for E2E testing

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("Element {selector} is not interactable: {reason}")]
    ElementNotInteractable { selector: String, reason: String },

    #[error("Assertion failed on {selector}: expected {expected:?}, observed {observed:?}")]
    Assertion {
        selector: String,
        expected: String,
        observed: String,
    },

    #[error("Snapshot '{label}' via {provider} failed: {reason}")]
    Snapshot {
        provider: String,
        label: String,
        reason: String,
    },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Focused scenarios are not allowed on CI: {}", .0.join(", "))]
    ForbiddenOnly(Vec<String>),

    #[error("Visual regression: {0}")]
    VisualRegression(String),

    #[error("Screenshot mismatch: {name} differs by {diff_percent:.2}% (threshold: {threshold:.2}%)")]
    ScreenshotMismatch {
        name: String,
        diff_percent: f64,
        threshold: f64,
    },

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Coarse classification of a step failure, as recorded in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    ElementNotFound,
    ElementNotInteractable,
    Assertion,
    Timeout,
    Driver,
    Other,
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::Navigation { .. } => FailureKind::Navigation,
            E2eError::ElementNotFound { .. } => FailureKind::ElementNotFound,
            E2eError::ElementNotInteractable { .. } => FailureKind::ElementNotInteractable,
            E2eError::Assertion { .. } => FailureKind::Assertion,
            E2eError::Timeout(_) => FailureKind::Timeout,
            E2eError::Driver(_) | E2eError::PlaywrightNotFound => FailureKind::Driver,
            _ => FailureKind::Other,
        }
    }

    /// Selector the error refers to, if any
    pub fn selector(&self) -> Option<&str> {
        match self {
            E2eError::ElementNotFound { selector }
            | E2eError::ElementNotInteractable { selector, .. }
            | E2eError::Assertion { selector, .. } => Some(selector),
            _ => None,
        }
    }
}
