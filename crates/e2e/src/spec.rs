//! Declarative scenario model: suites, scenarios, steps and locators

use std::fmt;
use std::path::Path;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// One link in a locator chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorPart {
    /// Match by the `data-testid` attribute
    TestId(String),

    /// Match by a CSS selector
    Css(String),

    /// Keep only the n-th match; negative counts from the end
    Nth(i64),
}

/// A chain of element queries, each scoped to the matches of the previous one.
///
/// The text form joins parts with ` >> `, e.g.
/// `testid=stats >> css=.stat-card >> nth=0 >> css=.stat-number`.
/// A part without a prefix is treated as CSS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    parts: Vec<LocatorPart>,
}

impl Locator {
    pub fn test_id(id: impl Into<String>) -> Self {
        Self { parts: vec![LocatorPart::TestId(id.into())] }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self { parts: vec![LocatorPart::Css(selector.into())] }
    }

    /// Narrow to CSS matches inside the current matches
    pub fn locator(mut self, selector: impl Into<String>) -> Self {
        self.parts.push(LocatorPart::Css(selector.into()));
        self
    }

    /// Narrow to test-id matches inside the current matches
    pub fn by_test_id(mut self, id: impl Into<String>) -> Self {
        self.parts.push(LocatorPart::TestId(id.into()));
        self
    }

    pub fn nth(mut self, index: i64) -> Self {
        self.parts.push(LocatorPart::Nth(index));
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    pub fn last(self) -> Self {
        self.nth(-1)
    }

    pub fn parts(&self) -> &[LocatorPart] {
        &self.parts
    }

    /// Render as a Playwright selector chain
    pub fn to_selector(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                LocatorPart::TestId(id) => format!("[data-testid=\"{}\"]", id.replace('"', "\\\"")),
                LocatorPart::Css(css) => css.clone(),
                LocatorPart::Nth(n) => format!("nth={}", n),
            })
            .collect::<Vec<_>>()
            .join(" >> ")
    }

    pub fn parse(text: &str) -> E2eResult<Self> {
        let mut parts = Vec::new();
        for raw in text.split(">>") {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(E2eError::SpecParse(format!("empty locator part in '{}'", text)));
            }
            let part = if let Some(id) = raw.strip_prefix("testid=") {
                LocatorPart::TestId(id.to_string())
            } else if let Some(css) = raw.strip_prefix("css=") {
                LocatorPart::Css(css.to_string())
            } else if let Some(n) = raw.strip_prefix("nth=") {
                let index = n.parse::<i64>().map_err(|e| {
                    E2eError::SpecParse(format!("bad nth index '{}' in '{}': {}", n, text, e))
                })?;
                LocatorPart::Nth(index)
            } else {
                LocatorPart::Css(raw.to_string())
            };
            parts.push(part);
        }
        Ok(Self { parts })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match part {
                LocatorPart::TestId(id) => write!(f, "testid={}", id)?,
                LocatorPart::Css(css) => write!(f, "css={}", css)?,
                LocatorPart::Nth(n) => write!(f, "nth={}", n)?,
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for Locator {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a path, resolved against the base URL
    Navigate { path: String },

    Fill { target: Locator, value: String },

    Click { target: Locator },

    /// Press a key while the target has focus
    Press { target: Locator, key: String },

    AssertText { target: Locator, expected: String },

    AssertCount { target: Locator, expected: usize },

    AssertVisible { target: Locator },

    AssertNotVisible { target: Locator },

    AssertValue { target: Locator, expected: String },

    /// Ask every registered snapshot provider for a capture
    Snapshot { label: String },
}

impl Step {
    /// Short name used in logs, traces and failure reports
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { path } => format!("navigate:{}", path),
            Step::Fill { target, .. } => format!("fill:{}", target),
            Step::Click { target } => format!("click:{}", target),
            Step::Press { target, key } => format!("press:{}:{}", target, key),
            Step::AssertText { target, .. } => format!("assert_text:{}", target),
            Step::AssertCount { target, .. } => format!("assert_count:{}", target),
            Step::AssertVisible { target } => format!("assert_visible:{}", target),
            Step::AssertNotVisible { target } => format!("assert_not_visible:{}", target),
            Step::AssertValue { target, .. } => format!("assert_value:{}", target),
            Step::Snapshot { label } => format!("snapshot:{}", label),
        }
    }
}

/// One independently executable test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    pub steps: Vec<Step>,

    /// Run only focused scenarios when any is focused
    #[serde(default)]
    pub only: bool,

    #[serde(default)]
    pub skip: bool,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            only: false,
            skip: false,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn fill(self, target: Locator, value: impl Into<String>) -> Self {
        self.step(Step::Fill { target, value: value.into() })
    }

    pub fn click(self, target: Locator) -> Self {
        self.step(Step::Click { target })
    }

    pub fn press(self, target: Locator, key: impl Into<String>) -> Self {
        self.step(Step::Press { target, key: key.into() })
    }

    pub fn expect_text(self, target: Locator, expected: impl Into<String>) -> Self {
        self.step(Step::AssertText { target, expected: expected.into() })
    }

    pub fn expect_count(self, target: Locator, expected: usize) -> Self {
        self.step(Step::AssertCount { target, expected })
    }

    pub fn expect_visible(self, target: Locator) -> Self {
        self.step(Step::AssertVisible { target })
    }

    pub fn expect_not_visible(self, target: Locator) -> Self {
        self.step(Step::AssertNotVisible { target })
    }

    pub fn expect_value(self, target: Locator, expected: impl Into<String>) -> Self {
        self.step(Step::AssertValue { target, expected: expected.into() })
    }

    pub fn snapshot(self, label: impl Into<String>) -> Self {
        self.step(Step::Snapshot { label: label.into() })
    }
}

/// A named group of scenarios sharing setup steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,

    /// Steps run before every scenario, in a fresh page
    #[serde(default)]
    pub before_each: Vec<Step>,

    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            E2eError::SpecParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all suites from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Title used for filtering and reporting
    pub fn full_title(&self, scenario: &Scenario) -> String {
        format!("{} {}", self.name, scenario.name)
    }

    /// Keep only scenarios whose full title matches `pattern`
    pub fn filter(mut self, pattern: &Regex) -> Self {
        let name = self.name.clone();
        self.scenarios
            .retain(|s| pattern.is_match(&format!("{} {}", name, s.name)));
        self
    }

    /// Names of focused scenarios
    pub fn focused(&self) -> Vec<String> {
        self.scenarios
            .iter()
            .filter(|s| s.only)
            .map(|s| self.full_title(s))
            .collect()
    }
}
