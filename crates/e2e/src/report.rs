//! Run results: per-attempt, per-scenario and suite-wide

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{E2eError, E2eResult, FailureKind};
use crate::snapshot::SnapshotWarning;
use crate::spec::Step;

/// Why an attempt stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Position in the attempt's step sequence (setup steps included)
    pub step_index: usize,
    pub step: String,
    pub kind: FailureKind,
    pub selector: Option<String>,
    pub expected: Option<String>,
    pub observed: Option<String>,
    pub message: String,
}

impl StepFailure {
    pub fn new(step_index: usize, step: &Step, err: &E2eError) -> Self {
        let (expected, observed) = match err {
            E2eError::Assertion { expected, observed, .. } => (Some(expected.clone()), Some(observed.clone())),
            _ => (None, None),
        };
        Self {
            step_index,
            step: step.describe(),
            kind: err.kind(),
            selector: err.selector().map(String::from),
            expected,
            observed,
            message: err.to_string(),
        }
    }

    /// A scenario whose task died (panicked) before producing a report
    pub fn crashed(message: impl Into<String>) -> Self {
        Self {
            step_index: 0,
            step: "scenario".to_string(),
            kind: FailureKind::Other,
            selector: None,
            expected: None,
            observed: None,
            message: message.into(),
        }
    }

    /// Failure that happened before any step ran, e.g. the page could not open
    pub fn setup(err: &E2eError) -> Self {
        Self {
            step_index: 0,
            step: "open_page".to_string(),
            kind: err.kind(),
            selector: None,
            expected: None,
            observed: None,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    /// 0 for the first run, 1 for the first retry, ...
    pub attempt: u32,
    pub duration_ms: u64,
    pub steps_run: usize,
    pub failure: Option<StepFailure>,
    pub warnings: Vec<SnapshotWarning>,
    pub trace_path: Option<PathBuf>,
}

impl AttemptReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    /// Failed at least once, then passed on retry
    Flaky,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptReport>,
}

impl ScenarioReport {
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ScenarioStatus::Skipped,
            duration_ms: 0,
            attempts: Vec::new(),
        }
    }

    pub fn from_attempts(name: impl Into<String>, attempts: Vec<AttemptReport>) -> Self {
        let status = match attempts.last() {
            Some(last) if last.passed() && attempts.len() == 1 => ScenarioStatus::Passed,
            Some(last) if last.passed() => ScenarioStatus::Flaky,
            Some(_) => ScenarioStatus::Failed,
            None => ScenarioStatus::Skipped,
        };
        Self {
            name: name.into(),
            status,
            duration_ms: attempts.iter().map(|a| a.duration_ms).sum(),
            attempts,
        }
    }

    /// Failed scenario whose task died without reporting its attempts
    pub fn crashed(name: impl Into<String>, message: impl Into<String>) -> Self {
        let attempt = AttemptReport {
            attempt: 0,
            duration_ms: 0,
            steps_run: 0,
            failure: Some(StepFailure::crashed(message)),
            warnings: Vec::new(),
            trace_path: None,
        };
        Self::from_attempts(name, vec![attempt])
    }

    /// Failure of the last attempt, if the scenario ultimately failed
    pub fn failure(&self) -> Option<&StepFailure> {
        match self.status {
            ScenarioStatus::Failed => self.attempts.last().and_then(|a| a.failure.as_ref()),
            _ => None,
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SnapshotWarning> {
        self.attempts.iter().flat_map(|a| a.warnings.iter())
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub flaky: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(started_at: DateTime<Utc>, duration_ms: u64, scenarios: Vec<ScenarioReport>) -> Self {
        let count = |status| scenarios.iter().filter(|s| s.status == status).count();
        Self {
            started_at,
            total: scenarios.len(),
            passed: count(ScenarioStatus::Passed),
            flaky: count(ScenarioStatus::Flaky),
            failed: count(ScenarioStatus::Failed),
            skipped: count(ScenarioStatus::Skipped),
            duration_ms,
            scenarios,
        }
    }

    /// True when no scenario ultimately failed
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Recap failures, flaky scenarios and snapshot warnings, then totals
    pub fn log_summary(&self) {
        for scenario in &self.scenarios {
            match scenario.status {
                ScenarioStatus::Flaky => warn!(
                    "~ {} passed after {} attempts (flaky)",
                    scenario.name,
                    scenario.attempts.len()
                ),
                ScenarioStatus::Failed => error!(
                    "✗ {} - {}",
                    scenario.name,
                    scenario.failure().map(|f| f.message.as_str()).unwrap_or("unknown error")
                ),
                ScenarioStatus::Passed | ScenarioStatus::Skipped => {}
            }
            for warning in scenario.warnings() {
                warn!("  snapshot '{}' ({}): {}", warning.label, warning.provider, warning.message);
            }
        }

        info!(
            "Test Results: {} passed, {} flaky, {} failed, {} skipped ({} ms)",
            self.passed, self.flaky, self.failed, self.skipped, self.duration_ms
        );
    }

    /// Write results as JSON under `output_dir`
    pub fn write_json(&self, output_dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
