//! Playwright browser automation
//!
//! Each page is backed by its own `node` process running a small driver
//! script. The driver owns one browser, one context and one page, and answers
//! one JSON line per request on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserLauncher, Page};
use crate::spec::Locator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Driver(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Actionability wait before click/fill/press give up
    pub action_timeout: Duration,

    pub navigation_timeout: Duration,

    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            project_dir: PathBuf::from("."),
        }
    }
}

/// Launches a driver process per page
pub struct PlaywrightBrowser {
    config: PlaywrightConfig,
    script: String,
}

impl PlaywrightBrowser {
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.project_dir)?;
        let script = driver_script(&config);
        Ok(Self { config, script })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(project_dir: &Path) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let mut child = TokioCommand::new("node")
            .arg("--eval")
            .arg(&self.script)
            .current_dir(&self.config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Driver(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdout unavailable".into()))?;

        let mut page = PlaywrightPage {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            reply_timeout: self.config.navigation_timeout + Duration::from_secs(5),
        };

        // The driver announces itself once the browser is up
        let ready = page.read_response().await?;
        if !ready.ok {
            return Err(E2eError::Driver(ready.error.unwrap_or_else(|| "driver failed to start".into())));
        }
        debug!("Playwright driver ready ({})", self.config.browser.as_str());

        Ok(Box::new(page))
    }
}

/// Request sent to the driver over stdin (one JSON line)
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Goto { url: &'a str },
    Click { selector: String },
    Fill { selector: String, value: &'a str },
    Press { selector: String, key: &'a str },
    Text { selector: String },
    Value { selector: String },
    Count { selector: String },
    Visible { selector: String },
    Url,
    Content,
    Screenshot { path: String },
    Close,
}

/// Response read from the driver's stdout (one JSON line)
#[derive(Debug, Deserialize)]
struct DriverResponse {
    ok: bool,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    value: serde_json::Value,
}

pub struct PlaywrightPage {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    reply_timeout: Duration,
}

impl PlaywrightPage {
    async fn read_response(&mut self) -> E2eResult<DriverResponse> {
        let line = timeout(self.reply_timeout, self.stdout.next_line())
            .await
            .map_err(|_| E2eError::Timeout("browser driver reply".into()))??
            .ok_or_else(|| E2eError::Driver("driver exited unexpectedly".into()))?;
        Ok(serde_json::from_str(&line)?)
    }

    /// Send one request and map a failed reply onto the error taxonomy
    async fn request(&mut self, request: &DriverRequest<'_>, target: Option<&Locator>) -> E2eResult<serde_json::Value> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let response = self.read_response().await?;
        if response.ok {
            return Ok(response.value);
        }

        Err(reply_error(request, target, response))
    }

    async fn request_string(&mut self, request: &DriverRequest<'_>, target: Option<&Locator>) -> E2eResult<String> {
        match self.request(request, target).await? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.request(&DriverRequest::Goto { url }, None).await.map(drop)
    }

    async fn click(&mut self, target: &Locator) -> E2eResult<()> {
        let request = DriverRequest::Click { selector: target.to_selector() };
        self.request(&request, Some(target)).await.map(drop)
    }

    async fn fill(&mut self, target: &Locator, value: &str) -> E2eResult<()> {
        let request = DriverRequest::Fill { selector: target.to_selector(), value };
        self.request(&request, Some(target)).await.map(drop)
    }

    async fn press(&mut self, target: &Locator, key: &str) -> E2eResult<()> {
        let request = DriverRequest::Press { selector: target.to_selector(), key };
        self.request(&request, Some(target)).await.map(drop)
    }

    async fn text(&mut self, target: &Locator) -> E2eResult<String> {
        let request = DriverRequest::Text { selector: target.to_selector() };
        self.request_string(&request, Some(target)).await
    }

    async fn input_value(&mut self, target: &Locator) -> E2eResult<String> {
        let request = DriverRequest::Value { selector: target.to_selector() };
        self.request_string(&request, Some(target)).await
    }

    async fn count(&mut self, target: &Locator) -> E2eResult<usize> {
        let request = DriverRequest::Count { selector: target.to_selector() };
        let value = self.request(&request, Some(target)).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| E2eError::Driver(format!("count returned {}", value)))
    }

    async fn is_visible(&mut self, target: &Locator) -> E2eResult<bool> {
        let request = DriverRequest::Visible { selector: target.to_selector() };
        let value = self.request(&request, Some(target)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn url(&mut self) -> E2eResult<String> {
        self.request_string(&DriverRequest::Url, None).await
    }

    async fn content(&mut self) -> E2eResult<String> {
        self.request_string(&DriverRequest::Content, None).await
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let request = DriverRequest::Screenshot { path: path.to_string_lossy().to_string() };
        self.request(&request, None).await.map(drop)
    }

    async fn close(self: Box<Self>) -> E2eResult<()> {
        let mut this = self;
        if let Err(e) = this.request(&DriverRequest::Close, None).await {
            warn!("Driver did not close cleanly: {}", e);
        }
        match timeout(Duration::from_secs(5), this.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => {
                warn!("Driver still running after close, killing it");
                this.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Map a failed driver reply onto the error taxonomy
fn reply_error(request: &DriverRequest<'_>, target: Option<&Locator>, response: DriverResponse) -> E2eError {
    let reason = response.error.unwrap_or_default();
    let selector = target.map(|t| t.to_string()).unwrap_or_default();
    match response.kind.as_deref() {
        Some("navigation") => E2eError::Navigation {
            url: match request {
                DriverRequest::Goto { url } => url.to_string(),
                _ => String::new(),
            },
            reason,
        },
        Some("not_found") => E2eError::ElementNotFound { selector },
        Some("not_interactable") => E2eError::ElementNotInteractable { selector, reason },
        _ => E2eError::Driver(reason),
    }
}

/// Build the Node driver for a given configuration
pub fn driver_script(config: &PlaywrightConfig) -> String {
    format!(
        r#"
const readline = require('readline');
const {{ chromium, firefox, webkit }} = require('playwright');

const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {{
  let browser;
  let page;
  try {{
    browser = await {browser}.launch({{ headless: {headless} }});
    const context = await browser.newContext({{
      viewport: {{ width: {width}, height: {height} }}
    }});
    context.setDefaultTimeout({action_timeout});
    context.setDefaultNavigationTimeout({navigation_timeout});
    page = await context.newPage();
  }} catch (error) {{
    reply({{ ok: false, kind: 'driver', error: error.message }});
    process.exit(1);
  }}
  reply({{ ok: true }});

  const classify = async (selector, error) => {{
    if (error && error.name === 'TimeoutError') {{
      const count = await page.locator(selector).count().catch(() => 0);
      return count === 0 ? 'not_found' : 'not_interactable';
    }}
    return 'driver';
  }};

  // Reads follow the locator strictness rules: more than one match is an error
  const single = async (selector) => {{
    const locator = page.locator(selector);
    const count = await locator.count();
    if (count > 1) {{
      const error = new Error(`strict mode violation: ${{selector}} resolved to ${{count}} elements`);
      error.name = 'StrictModeViolation';
      throw error;
    }}
    return count === 0 ? null : locator;
  }};

  const rl = readline.createInterface({{ input: process.stdin }});
  for await (const line of rl) {{
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {{
      switch (req.cmd) {{
        case 'goto':
          try {{
            await page.goto(req.url);
            reply({{ ok: true }});
          }} catch (error) {{
            reply({{ ok: false, kind: 'navigation', error: error.message }});
          }}
          break;
        case 'click':
          await page.locator(req.selector).click();
          reply({{ ok: true }});
          break;
        case 'fill':
          await page.locator(req.selector).fill(req.value);
          reply({{ ok: true }});
          break;
        case 'press':
          await page.locator(req.selector).press(req.key);
          reply({{ ok: true }});
          break;
        case 'text': {{
          const el = await single(req.selector);
          if (!el) {{ reply({{ ok: false, kind: 'not_found', error: 'no match' }}); break; }}
          reply({{ ok: true, value: await el.textContent() }});
          break;
        }}
        case 'value': {{
          const el = await single(req.selector);
          if (!el) {{ reply({{ ok: false, kind: 'not_found', error: 'no match' }}); break; }}
          reply({{ ok: true, value: await el.inputValue() }});
          break;
        }}
        case 'count':
          reply({{ ok: true, value: await page.locator(req.selector).count() }});
          break;
        case 'visible': {{
          const el = await single(req.selector);
          reply({{ ok: true, value: el ? await el.isVisible() : false }});
          break;
        }}
        case 'url':
          reply({{ ok: true, value: page.url() }});
          break;
        case 'content':
          reply({{ ok: true, value: await page.content() }});
          break;
        case 'screenshot':
          await page.screenshot({{ path: req.path, fullPage: true }});
          reply({{ ok: true }});
          break;
        case 'close':
          await browser.close();
          reply({{ ok: true }});
          process.exit(0);
        default:
          reply({{ ok: false, kind: 'driver', error: 'unknown command ' + req.cmd }});
      }}
    }} catch (error) {{
      reply({{ ok: false, kind: await classify(req.selector, error), error: error.message }});
    }}
  }}
  await browser.close();
}})();
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
        action_timeout = config.action_timeout.as_millis(),
        navigation_timeout = config.navigation_timeout.as_millis(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_driver_script_embeds_config() {
        let script = driver_script(&PlaywrightConfig {
            browser: Browser::Firefox,
            headless: false,
            action_timeout: Duration::from_millis(2500),
            ..Default::default()
        });
        assert!(script.contains("await firefox.launch({ headless: false })"));
        assert!(script.contains("viewport: { width: 1280, height: 720 }"));
        assert!(script.contains("context.setDefaultTimeout(2500)"));
    }

    #[test]
    fn test_request_wire_format() {
        let locator = Locator::test_id("task-input");
        let request = DriverRequest::Fill { selector: locator.to_selector(), value: "New E2E Test Task" };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cmd"], "fill");
        assert_eq!(json["selector"], "[data-testid=\"task-input\"]");
        assert_eq!(json["value"], "New E2E Test Task");

        let json = serde_json::to_value(DriverRequest::Close).unwrap();
        assert_eq!(json, serde_json::json!({ "cmd": "close" }));
    }

    #[test]
    fn test_reads_are_strict() {
        let script = driver_script(&PlaywrightConfig::default());
        assert!(script.contains("if (count > 1)"));
        assert!(script.contains("strict mode violation"));
        assert!(!script.contains(".first()"));
    }

    #[test]
    fn test_reply_error_mapping() {
        let badges = Locator::css(".status-badge");
        let request = DriverRequest::Text { selector: badges.to_selector() };
        let reply = |kind: &str, error: &str| DriverResponse {
            ok: false,
            kind: Some(kind.to_string()),
            error: Some(error.to_string()),
            value: serde_json::Value::Null,
        };

        let err = reply_error(
            &request,
            Some(&badges),
            reply("driver", "strict mode violation: .status-badge resolved to 4 elements"),
        );
        assert!(matches!(err, E2eError::Driver(ref msg) if msg.contains("strict mode violation")));
        assert_eq!(err.kind(), FailureKind::Driver);

        let err = reply_error(&request, Some(&badges), reply("not_found", "no match"));
        assert!(matches!(err, E2eError::ElementNotFound { ref selector } if selector == "css=.status-badge"));

        let goto = DriverRequest::Goto { url: "http://localhost:4173/sample-webapp/" };
        let err = reply_error(&goto, None, reply("navigation", "net::ERR_CONNECTION_REFUSED"));
        assert!(matches!(err, E2eError::Navigation { ref url, .. } if url == "http://localhost:4173/sample-webapp/"));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert_eq!("webkit".parse::<Browser>().unwrap(), Browser::Webkit);
        assert!("netscape".parse::<Browser>().is_err());
    }
}
