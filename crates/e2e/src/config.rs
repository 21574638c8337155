//! Run configuration, resolved once from the environment

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::playwright::Browser;

/// Where the sample app is served by `npm run preview`
pub const DEFAULT_BASE_URL: &str = "http://localhost:4173/sample-webapp/";

/// Command that starts the local preview server
pub const PREVIEW_COMMAND: &str = "npm run preview";

/// Environment inputs the resolver looks at
#[derive(Debug, Clone, Default)]
pub struct EnvInputs {
    /// Set when running under continuous integration
    pub ci: bool,

    /// Externally hosted target, replacing the local preview server
    pub base_url: Option<String>,
}

impl EnvInputs {
    /// Read `CI` and `BASE_URL` from the process environment.
    ///
    /// Empty values count as unset.
    pub fn from_env() -> Self {
        Self {
            ci: non_empty_var("CI").is_some(),
            base_url: non_empty_var("BASE_URL"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Worker pool size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workers {
    /// Let the runner pick (half the available cores)
    Auto,
    Fixed(usize),
}

impl Workers {
    pub fn resolve(self) -> usize {
        match self {
            Workers::Fixed(n) => n.max(1),
            Workers::Auto => std::thread::available_parallelism()
                .map(|n| n.get() / 2)
                .unwrap_or(1)
                .max(1),
        }
    }
}

/// When to record a step trace for an attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePolicy {
    Off,
    On,
    #[default]
    OnFirstRetry,
    OnAllRetries,
}

impl TracePolicy {
    /// Whether attempt `attempt` (0 = first run) is traced
    pub fn records(self, attempt: u32) -> bool {
        match self {
            TracePolicy::Off => false,
            TracePolicy::On => true,
            TracePolicy::OnFirstRetry => attempt == 1,
            TracePolicy::OnAllRetries => attempt >= 1,
        }
    }
}

/// Browser project the scenarios run against
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub browser: Browser,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        // Desktop Chrome device profile
        Self {
            name: "chromium".to_string(),
            browser: Browser::Chromium,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// Local preview server bootstrap
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Shell command that starts the server
    pub command: String,

    /// URL polled until the server answers
    pub url: String,

    /// Use a server that is already answering on `url` instead of failing
    pub reuse_existing: bool,

    pub startup_timeout: Duration,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            command: PREVIEW_COMMAND.to_string(),
            url: DEFAULT_BASE_URL.to_string(),
            reuse_existing: true,
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Immutable configuration for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: String,
    pub fully_parallel: bool,
    pub forbid_only: bool,
    pub retries: u32,
    pub workers: Workers,
    pub trace: TracePolicy,
    pub project: ProjectConfig,
    pub web_server: Option<WebServerConfig>,

    /// How long assertions keep polling
    pub expect_timeout: Duration,

    /// How long the browser waits for an element to become actionable
    pub action_timeout: Duration,

    /// Hard upper bound for any single non-snapshot step
    pub step_timeout: Duration,

    /// Upper bound for one snapshot provider call
    pub snapshot_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::resolve(&EnvInputs::default())
    }
}

impl RunConfig {
    /// Build the configuration from environment inputs
    pub fn resolve(env: &EnvInputs) -> Self {
        let web_server = match env.base_url {
            Some(_) => None,
            None => Some(WebServerConfig {
                reuse_existing: !env.ci,
                ..Default::default()
            }),
        };

        Self {
            base_url: env
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            fully_parallel: true,
            forbid_only: env.ci,
            retries: if env.ci { 2 } else { 0 },
            workers: if env.ci { Workers::Fixed(1) } else { Workers::Auto },
            trace: TracePolicy::OnFirstRetry,
            project: ProjectConfig::default(),
            web_server,
            expect_timeout: Duration::from_secs(5),
            action_timeout: Duration::from_secs(10),
            step_timeout: Duration::from_secs(30),
            snapshot_timeout: Duration::from_secs(30),
        }
    }

    /// Resolve from the current process environment
    pub fn from_env() -> Self {
        Self::resolve(&EnvInputs::from_env())
    }

    /// Number of scenarios allowed in flight at once
    pub fn effective_workers(&self, scenario_count: usize) -> usize {
        if !self.fully_parallel {
            return 1;
        }
        self.workers.resolve().min(scenario_count.max(1))
    }
}
