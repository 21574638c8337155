//! Task Manager Pro E2E Test Framework
//!
//! This crate drives the Task Manager Pro sample app through a headless
//! browser and checks what the DOM shows after each interaction:
//! - Resolves the run configuration (target URL, retries, workers) from the environment
//! - Starts or reuses the local preview server
//! - Runs declarative scenarios, each in a fresh browser context
//! - Hands labelled captures to zero or more visual snapshot providers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunConfig::from_env()          CI, BASE_URL                │
//! │  TestRunner                                                 │
//! │    ├── WebServerHandle::start() (unless BASE_URL is set)    │
//! │    ├── BrowserLauncher::new_page() per attempt              │
//! │    ├── steps: navigate / fill / click / press               │
//! │    │          assert_{text,count,visible,not_visible,value} │
//! │    ├── snapshot { label } -> [SnapshotProvider]             │
//! │    └── retries -> passed / flaky / failed / skipped         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators                                              │
//! │    ├── PlaywrightBrowser (node driver, JSON lines)          │
//! │    ├── PercyProvider (local Percy agent)                    │
//! │    └── BaselineProvider (screenshot pixel diff)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod expect;
pub mod page;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod server;
pub mod snapshot;
pub mod spec;
pub mod visual;

pub use config::{EnvInputs, RunConfig, Workers};
pub use error::{E2eError, E2eResult, FailureKind};
pub use page::{BrowserLauncher, Page};
pub use report::{ScenarioStatus, SuiteReport};
pub use runner::TestRunner;
pub use snapshot::{SnapshotProvider, SnapshotWarning};
pub use spec::{Locator, Scenario, Step, Suite};
