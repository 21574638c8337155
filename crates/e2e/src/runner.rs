//! Main test runner that orchestrates the preview server, browser pages and
//! snapshot providers

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::{E2eError, E2eResult};
use crate::expect::{Expect, Expectation};
use crate::page::{BrowserLauncher, Page};
use crate::report::{AttemptReport, ScenarioReport, StepFailure, SuiteReport};
use crate::server::WebServerHandle;
use crate::snapshot::{slug, SnapshotProvider, SnapshotWarning};
use crate::spec::{Step, Suite};

/// Main E2E test runner
pub struct TestRunner {
    config: Arc<RunConfig>,
    browser: Arc<dyn BrowserLauncher>,
    snapshots: Vec<Arc<dyn SnapshotProvider>>,

    /// Where traces go; tracing is off without it
    output_dir: Option<PathBuf>,
}

/// What every scenario task shares for the duration of a run
struct RunnerInner {
    config: Arc<RunConfig>,
    browser: Arc<dyn BrowserLauncher>,
    snapshots: Vec<Arc<dyn SnapshotProvider>>,
    output_dir: Option<PathBuf>,
}

/// A scenario ready to run: setup steps already prepended
struct PlannedScenario {
    title: String,
    steps: Vec<Step>,
}

#[derive(Debug, Serialize)]
struct TraceEntry {
    index: usize,
    step: String,
    duration_ms: u64,
    outcome: String,
}

impl TestRunner {
    pub fn new(config: RunConfig, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            config: Arc::new(config),
            browser,
            snapshots: Vec::new(),
            output_dir: None,
        }
    }

    /// Register a visual capture collaborator
    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots.push(provider);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every scenario of `suites` and collect the results.
    ///
    /// Fails only when the run cannot start at all (focused scenarios on CI,
    /// preview server not coming up). Scenario failures end up in the report.
    pub async fn run(&self, suites: Vec<Suite>) -> E2eResult<SuiteReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let config = &self.config;

        let focused: Vec<String> = suites.iter().flat_map(|s| s.focused()).collect();
        if !focused.is_empty() && config.forbid_only {
            return Err(E2eError::ForbiddenOnly(focused));
        }

        let mut planned = Vec::new();
        let mut slots: Vec<Option<ScenarioReport>> = Vec::new();
        for suite in &suites {
            for scenario in &suite.scenarios {
                let title = suite.full_title(scenario);
                let excluded = !focused.is_empty() && !scenario.only;
                if scenario.skip || excluded {
                    debug!("Skipping {}", title);
                    slots.push(Some(ScenarioReport::skipped(title)));
                    continue;
                }
                let steps = suite.before_each.iter().chain(&scenario.steps).cloned().collect();
                planned.push((slots.len(), PlannedScenario { title, steps }));
                slots.push(None);
            }
        }

        check_unique_names(planned.iter().map(|(_, p)| p))?;

        // The preview server must answer before the first navigation
        let server = match (&config.web_server, planned.is_empty()) {
            (Some(web_server), false) => Some(WebServerHandle::start(web_server).await?),
            _ => None,
        };

        let workers = config.effective_workers(planned.len());
        info!("Running {} scenario(s) using {} worker(s)...", planned.len(), workers);

        let inner = Arc::new(RunnerInner {
            config: Arc::clone(&self.config),
            browser: Arc::clone(&self.browser),
            snapshots: self.snapshots.clone(),
            output_dir: self.output_dir.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for (slot, scenario) in planned {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| E2eError::Internal(e.to_string()))?;
            let inner = Arc::clone(&inner);
            tasks.spawn(async move {
                // A panic inside the scenario fails that scenario only
                let title = scenario.title.clone();
                let report = match tokio::spawn(async move { inner.run_scenario(&scenario).await }).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!("✗ {} - scenario task died: {}", title, e);
                        ScenarioReport::crashed(title, format!("scenario task died: {}", e))
                    }
                };
                drop(permit);
                (slot, report)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (slot, report) = joined.map_err(|e| E2eError::Internal(format!("scenario worker failed: {}", e)))?;
            slots[slot] = Some(report);
        }

        if let Some(server) = server {
            server.shutdown().await;
        }

        let scenarios = slots.into_iter().flatten().collect();
        let duration_ms = start.elapsed().as_millis() as u64;
        Ok(SuiteReport::new(started_at, duration_ms, scenarios))
    }
}

impl RunnerInner {
    /// Run one scenario, retrying failed attempts in fresh pages
    async fn run_scenario(&self, scenario: &PlannedScenario) -> ScenarioReport {
        let max_attempts = self.config.retries + 1;
        let mut attempts = Vec::new();

        for attempt in 0..max_attempts {
            let report = self.run_attempt(scenario, attempt).await;
            let passed = report.passed();
            attempts.push(report);

            if passed {
                break;
            }
            if attempt + 1 < max_attempts {
                warn!("{} failed, retrying ({}/{})", scenario.title, attempt + 1, self.config.retries);
            }
        }

        let report = ScenarioReport::from_attempts(scenario.title.clone(), attempts);
        match report.failure() {
            Some(failure) => error!("✗ {} - {}", report.name, failure.message),
            None => info!("✓ {} ({} ms)", report.name, report.duration_ms),
        }
        report
    }

    async fn run_attempt(&self, scenario: &PlannedScenario, attempt: u32) -> AttemptReport {
        let start = Instant::now();
        let tracing_on = self.config.trace.records(attempt) && self.output_dir.is_some();
        let mut trace = Vec::new();
        let mut warnings = Vec::new();
        let mut failure = None;
        let mut steps_run = 0;

        debug!("Running {} (attempt {})", scenario.title, attempt + 1);

        match self.browser.new_page().await {
            Err(e) => failure = Some(StepFailure::setup(&e)),
            Ok(mut page) => {
                for (index, step) in scenario.steps.iter().enumerate() {
                    let step_start = Instant::now();
                    steps_run = index + 1;

                    let result = match step {
                        Step::Snapshot { label } => {
                            warnings.extend(self.capture(page.as_mut(), label).await);
                            Ok(())
                        }
                        _ => timeout(self.config.step_timeout, self.execute_step(page.as_mut(), step))
                            .await
                            .unwrap_or_else(|_| Err(E2eError::Timeout(step.describe()))),
                    };

                    if tracing_on {
                        trace.push(TraceEntry {
                            index,
                            step: step.describe(),
                            duration_ms: step_start.elapsed().as_millis() as u64,
                            outcome: match &result {
                                Ok(()) => "ok".to_string(),
                                Err(e) => e.to_string(),
                            },
                        });
                    }

                    if let Err(e) = result {
                        debug!("Step {} ({}) failed: {}", index, step.describe(), e);
                        failure = Some(StepFailure::new(index, step, &e));
                        break;
                    }
                }

                if let Err(e) = page.close().await {
                    warn!("Failed to close page for {}: {}", scenario.title, e);
                }
            }
        }

        let trace_path = if tracing_on {
            self.write_trace(&scenario.title, attempt, &trace)
        } else {
            None
        };

        AttemptReport {
            attempt,
            duration_ms: start.elapsed().as_millis() as u64,
            steps_run,
            failure,
            warnings,
            trace_path,
        }
    }

    async fn execute_step(&self, page: &mut dyn Page, step: &Step) -> E2eResult<()> {
        let expect = Expect::new(self.config.expect_timeout);

        match step {
            Step::Navigate { path } => {
                let url = resolve_url(&self.config.base_url, path)?;
                page.goto(&url).await
            }
            Step::Fill { target, value } => page.fill(target, value).await,
            Step::Click { target } => page.click(target).await,
            Step::Press { target, key } => page.press(target, key).await,
            Step::AssertText { target, expected } => {
                expect.check(page, target, Expectation::Text(expected)).await
            }
            Step::AssertCount { target, expected } => {
                expect.check(page, target, Expectation::Count(*expected)).await
            }
            Step::AssertVisible { target } => {
                expect.check(page, target, Expectation::Visible(true)).await
            }
            Step::AssertNotVisible { target } => {
                expect.check(page, target, Expectation::Visible(false)).await
            }
            Step::AssertValue { target, expected } => {
                expect.check(page, target, Expectation::Value(expected)).await
            }
            // Captures are routed through `capture`, they never fail a step
            Step::Snapshot { .. } => Ok(()),
        }
    }

    /// Ask every provider for a capture; failures come back as warnings
    async fn capture(&self, page: &mut dyn Page, label: &str) -> Vec<SnapshotWarning> {
        let mut warnings = Vec::new();

        for provider in &self.snapshots {
            let outcome = timeout(self.config.snapshot_timeout, provider.capture(&mut *page, label)).await;
            let message = match outcome {
                Ok(Ok(())) => {
                    debug!("Captured '{}' via {}", label, provider.name());
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.config.snapshot_timeout),
            };

            warn!("Snapshot '{}' via {} skipped: {}", label, provider.name(), message);
            warnings.push(SnapshotWarning {
                provider: provider.name().to_string(),
                label: label.to_string(),
                message,
            });
        }

        warnings
    }

    fn write_trace(&self, title: &str, attempt: u32, trace: &[TraceEntry]) -> Option<PathBuf> {
        let dir = self.output_dir.as_ref()?.join("traces");
        let path = dir.join(format!("{}-retry{}.json", slug(title), attempt));

        let written = std::fs::create_dir_all(&dir)
            .map_err(E2eError::from)
            .and_then(|_| Ok(serde_json::to_string_pretty(trace)?))
            .and_then(|json| Ok(std::fs::write(&path, json)?));

        match written {
            Ok(()) => {
                info!("Trace written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to write trace for {}: {}", title, e);
                None
            }
        }
    }
}

/// Titles and snapshot labels name files on disk (traces, screenshots), so
/// two of them must not map to the same slug
fn check_unique_names<'a>(planned: impl Iterator<Item = &'a PlannedScenario>) -> E2eResult<()> {
    let mut titles: HashMap<String, &str> = HashMap::new();
    let mut labels: HashMap<String, &str> = HashMap::new();

    for scenario in planned {
        if let Some(other) = titles.insert(slug(&scenario.title), scenario.title.as_str()) {
            return Err(E2eError::SpecParse(format!(
                "scenario titles '{}' and '{}' are not distinct",
                other, scenario.title
            )));
        }
        for step in &scenario.steps {
            if let Step::Snapshot { label } = step {
                if let Some(other) = labels.insert(slug(label), label.as_str()) {
                    return Err(E2eError::SpecParse(format!(
                        "snapshot labels '{}' and '{}' are not distinct",
                        other, label
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Resolve a navigation target against the base URL (standard URL joining)
pub fn resolve_url(base_url: &str, path: &str) -> E2eResult<String> {
    reqwest::Url::parse(base_url)
        .and_then(|base| base.join(path))
        .map(String::from)
        .map_err(|e| E2eError::Navigation {
            url: path.to_string(),
            reason: format!("cannot resolve against {}: {}", base_url, e),
        })
}
