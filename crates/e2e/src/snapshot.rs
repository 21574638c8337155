//! Visual capture collaborators
//!
//! Captures are advisory. A provider error never fails a scenario; the runner
//! turns it into a [`SnapshotWarning`] on the attempt report.

use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::Page;

/// Something that can record a visual snapshot of a page
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn capture(&self, page: &mut dyn Page, label: &str) -> E2eResult<()>;
}

/// A capture that did not happen or did not match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotWarning {
    pub provider: String,
    pub label: String,
    pub message: String,
}

/// Turn a human label into a file-system friendly name
pub fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

pub const DEFAULT_PERCY_ADDRESS: &str = "http://localhost:5338";

const CLIENT_INFO: &str = concat!("taskpro-e2e/", env!("CARGO_PKG_VERSION"));

/// Sends DOM snapshots to a locally running Percy agent (`percy exec -- ...`).
///
/// The agent is health-checked once; when it is not running every capture is
/// reported as skipped.
pub struct PercyProvider {
    client: reqwest::Client,
    address: String,
    available: OnceCell<bool>,
}

impl PercyProvider {
    pub fn new(address: impl Into<String>) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
            available: OnceCell::new(),
        })
    }

    /// Use `PERCY_SERVER_ADDRESS` or the agent's default address
    pub fn from_env() -> E2eResult<Self> {
        let address = std::env::var("PERCY_SERVER_ADDRESS")
            .ok()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_PERCY_ADDRESS.to_string());
        Self::new(address)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let url = format!("{}/percy/healthcheck", self.address);
                match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        info!("Percy agent found at {}", self.address);
                        true
                    }
                    Ok(resp) => {
                        warn!("Percy healthcheck returned {}, disabling snapshots", resp.status());
                        false
                    }
                    Err(e) => {
                        warn!("Percy is not running, disabling snapshots ({})", e);
                        false
                    }
                }
            })
            .await
    }

    fn failure(&self, label: &str, reason: impl Into<String>) -> E2eError {
        E2eError::Snapshot {
            provider: self.name().to_string(),
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SnapshotProvider for PercyProvider {
    fn name(&self) -> &str {
        "percy"
    }

    async fn capture(&self, page: &mut dyn Page, label: &str) -> E2eResult<()> {
        if !self.is_available().await {
            return Err(self.failure(label, "Percy agent is not running"));
        }

        let body = json!({
            "name": label,
            "url": page.url().await?,
            "domSnapshot": page.content().await?,
            "clientInfo": CLIENT_INFO,
            "environmentInfo": "playwright",
        });

        let resp = self
            .client
            .post(format!("{}/percy/snapshot", self.address))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.failure(label, format!("agent returned {}: {}", status, text)));
        }

        debug!("Percy snapshot '{}' uploaded", label);
        Ok(())
    }
}
