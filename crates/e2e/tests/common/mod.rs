//! In-memory stand-in for the Task Manager Pro app.
//!
//! `TaskBoard` implements the browser seams over a tiny DOM tree that mirrors
//! the markup the real app renders, so the runner can be exercised without
//! node, Playwright or a preview server.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use taskpro_e2e::config::EnvInputs;
use taskpro_e2e::spec::{Locator, LocatorPart};
use taskpro_e2e::{BrowserLauncher, E2eError, E2eResult, Page, RunConfig};

pub const BASE_URL: &str = "http://board.test/sample-webapp/";

/// Config pointed at an external target, so no preview server is started
pub fn test_config(ci: bool) -> RunConfig {
    let mut config = RunConfig::resolve(&EnvInputs {
        ci,
        base_url: Some(BASE_URL.to_string()),
    });
    config.expect_timeout = Duration::from_millis(200);
    config
}

/// Answer every request with `200 OK` until the test ends; returns the URL
/// and a counter of requests served
pub async fn serve_ok() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                    .await;
            });
        }
    });

    (format!("http://{}/sample-webapp/", addr), hits)
}

/// A local URL nothing is listening on
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/sample-webapp/", addr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    InProgress,
    Completed,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Completed => "completed",
        }
    }
}

/// Ways the app can be broken
#[derive(Debug, Clone, Copy, Default)]
pub struct Quirks {
    /// Toggling a completed task sends it back to pending
    pub toggle_wraps: bool,

    /// The input keeps its text after a task is added
    pub keeps_input: bool,

    /// Enter in the input does nothing
    pub ignores_enter: bool,

    /// Shifts the rendered colours, so every screenshot changes
    pub restyled: bool,
}

#[derive(Debug, Clone)]
struct Task {
    id: u32,
    title: String,
    status: Status,
}

#[derive(Debug, Clone)]
struct Board {
    tasks: Vec<Task>,
    next_id: u32,
    input: String,
}

impl Board {
    fn initial() -> Self {
        let tasks = [
            ("Set up project structure", Status::Completed),
            ("Implement task list", Status::InProgress),
            ("Write end-to-end tests", Status::Pending),
            ("Deploy to GitHub Pages", Status::Pending),
        ]
        .into_iter()
        .zip(1..)
        .map(|((title, status), id)| Task { id, title: title.to_string(), status })
        .collect();

        Self { tasks, next_id: 5, input: String::new() }
    }

    fn stats(&self) -> [usize; 3] {
        let count = |status| self.tasks.iter().filter(|t| t.status == status).count();
        [count(Status::Completed), count(Status::InProgress), count(Status::Pending)]
    }
}

/// Element of the rendered tree
#[derive(Debug, Clone)]
struct Node {
    tag: &'static str,
    test_id: Option<String>,
    classes: Vec<&'static str>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn new(tag: &'static str) -> Self {
        Self { tag, test_id: None, classes: Vec::new(), text: String::new(), children: Vec::new() }
    }

    fn id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    fn class(mut self, class: &'static str) -> Self {
        self.classes.push(class);
        self
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }

    fn descendants<'a>(&'a self, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            out.push(child);
            child.descendants(out);
        }
    }

    /// Simple selectors only: `tag`, `.class`, `tag.class`
    fn matches_css(&self, selector: &str) -> bool {
        let mut pieces = selector.split('.');
        let tag = pieces.next().unwrap_or_default();
        (tag.is_empty() || tag == self.tag) && pieces.all(|class| self.classes.iter().any(|c| *c == class))
    }

    fn html(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.tag);
        if let Some(id) = &self.test_id {
            out.push_str(&format!(" data-testid=\"{}\"", id));
        }
        if !self.classes.is_empty() {
            out.push_str(&format!(" class=\"{}\"", self.classes.join(" ")));
        }
        out.push('>');
        out.push_str(&self.text);
        for child in &self.children {
            child.html(out);
        }
        out.push_str(&format!("</{}>", self.tag));
    }
}

fn render(board: &Board) -> Node {
    let stats = board
        .stats()
        .iter()
        .zip(["Completed", "In Progress", "Pending"])
        .fold(Node::new("div").id("stats"), |panel, (count, label)| {
            panel.child(
                Node::new("div")
                    .class("stat-card")
                    .child(Node::new("span").class("stat-number").text(count.to_string()))
                    .child(Node::new("span").class("stat-label").text(label)),
            )
        });

    let list = board.tasks.iter().fold(Node::new("ul").id("task-list"), |list, task| {
        list.child(
            Node::new("li")
                .id(format!("task-{}", task.id))
                .class("task-card")
                .child(Node::new("span").class("task-title").text(&task.title))
                .child(Node::new("span").class("status-badge").text(task.status.as_str()))
                .child(Node::new("button").id(format!("toggle-{}", task.id)).text("Toggle"))
                .child(Node::new("button").id(format!("delete-{}", task.id)).text("Delete")),
        )
    });

    Node::new("body").child(
        Node::new("main")
            .child(Node::new("h1").text("\n  Task Manager Pro\n"))
            .child(stats)
            .child(Node::new("input").id("task-input"))
            .child(Node::new("button").id("add-task-btn").text("Add Task"))
            .child(list),
    )
}

/// Resolve a locator chain the way Playwright does: each part searches the
/// descendants of the previous matches, `nth` picks one of them
fn query<'a>(root: &'a Node, locator: &Locator) -> Vec<&'a Node> {
    let mut scope = vec![root];
    for part in locator.parts() {
        scope = match part {
            LocatorPart::Nth(n) => {
                let index = if *n < 0 { scope.len() as i64 + n } else { *n };
                usize::try_from(index)
                    .ok()
                    .and_then(|i| scope.get(i).copied())
                    .into_iter()
                    .collect()
            }
            _ => {
                let mut found = Vec::new();
                for node in &scope {
                    let mut all = Vec::new();
                    node.descendants(&mut all);
                    found.extend(all.into_iter().filter(|n| match part {
                        LocatorPart::TestId(id) => n.test_id.as_deref() == Some(id.as_str()),
                        LocatorPart::Css(css) => n.matches_css(css),
                        LocatorPart::Nth(_) => false,
                    }));
                }
                found
            }
        };
    }
    scope
}

#[derive(Default)]
struct Shared {
    quirks: Quirks,

    /// Page loads that fail before the app answers normally
    failing_loads: AtomicUsize,

    /// Pause on every navigation, to make concurrent pages overlap
    load_delay_ms: AtomicU64,

    open_pages: AtomicUsize,
    max_open_pages: AtomicUsize,
    pages_opened: AtomicUsize,
}

/// Browser launcher backed by the in-memory board; clones share counters
#[derive(Clone, Default)]
pub struct TaskBoard {
    shared: Arc<Shared>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quirks(quirks: Quirks) -> Self {
        Self {
            shared: Arc::new(Shared { quirks, ..Shared::default() }),
        }
    }

    pub fn failing_loads(self, n: usize) -> Self {
        self.shared.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn load_delay(self, delay: Duration) -> Self {
        self.shared.load_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Most pages that were open at the same time
    pub fn max_concurrent_pages(&self) -> usize {
        self.shared.max_open_pages.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.shared.pages_opened.load(Ordering::SeqCst)
    }

    /// Pages that were opened and never closed
    pub fn leaked_pages(&self) -> usize {
        self.shared.open_pages.load(Ordering::SeqCst)
    }

    /// Open a page directly, without a runner
    pub async fn open(&self) -> Box<dyn Page> {
        match self.new_page().await {
            Ok(page) => page,
            Err(e) => panic!("fake launcher cannot fail: {}", e),
        }
    }
}

impl Shared {
    fn take_failing_load(&self) -> bool {
        self.failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BrowserLauncher for TaskBoard {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let open = self.shared.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open_pages.fetch_max(open, Ordering::SeqCst);
        self.shared.pages_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(BoardPage {
            shared: Arc::clone(&self.shared),
            board: None,
            url: "about:blank".to_string(),
        }))
    }
}

/// One isolated page; its board only exists after a successful navigation
pub struct BoardPage {
    shared: Arc<Shared>,
    board: Option<Board>,
    url: String,
}

impl BoardPage {
    fn tree(&self) -> Node {
        match &self.board {
            Some(board) => render(board),
            None => Node::new("body"),
        }
    }

    /// The single element `target` points at
    fn single(&self, target: &Locator) -> E2eResult<Node> {
        let tree = self.tree();
        let matches = query(&tree, target);
        match matches.as_slice() {
            [] => Err(E2eError::ElementNotFound { selector: target.to_string() }),
            [node] => Ok((*node).clone()),
            many => Err(E2eError::Driver(format!(
                "strict mode violation: {} resolved to {} elements",
                target,
                many.len()
            ))),
        }
    }

    fn board_mut(&mut self) -> E2eResult<&mut Board> {
        self.board
            .as_mut()
            .ok_or_else(|| E2eError::Driver("page not loaded".to_string()))
    }

    fn add_task(&mut self) -> E2eResult<()> {
        let keeps_input = self.shared.quirks.keeps_input;
        let board = self.board_mut()?;
        let title = board.input.trim().to_string();
        if title.is_empty() {
            return Ok(());
        }

        board.tasks.push(Task { id: board.next_id, title, status: Status::Pending });
        board.next_id += 1;
        if !keeps_input {
            board.input.clear();
        }
        Ok(())
    }

    fn toggle(&mut self, id: u32) -> E2eResult<()> {
        let wraps = self.shared.quirks.toggle_wraps;
        let board = self.board_mut()?;
        if let Some(task) = board.tasks.iter_mut().find(|t| t.id == id) {
            task.status = match task.status {
                Status::Pending => Status::InProgress,
                Status::InProgress => Status::Completed,
                Status::Completed if wraps => Status::Pending,
                Status::Completed => Status::Completed,
            };
        }
        Ok(())
    }
}

fn numbered(id: &str, prefix: &str) -> Option<u32> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[async_trait]
impl Page for BoardPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        let delay = self.shared.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.shared.take_failing_load() {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        if !url.starts_with(BASE_URL) {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            });
        }

        self.board = Some(Board::initial());
        self.url = url.to_string();
        Ok(())
    }

    async fn click(&mut self, target: &Locator) -> E2eResult<()> {
        let node = self.single(target)?;
        let id = node.test_id.unwrap_or_default();

        if id == "add-task-btn" {
            return self.add_task();
        }
        if let Some(n) = numbered(&id, "toggle-") {
            return self.toggle(n);
        }
        if let Some(n) = numbered(&id, "delete-") {
            self.board_mut()?.tasks.retain(|t| t.id != n);
        }
        Ok(())
    }

    async fn fill(&mut self, target: &Locator, value: &str) -> E2eResult<()> {
        let node = self.single(target)?;
        if node.tag != "input" {
            return Err(E2eError::ElementNotInteractable {
                selector: target.to_string(),
                reason: "element is not an <input>".to_string(),
            });
        }
        self.board_mut()?.input = value.to_string();
        Ok(())
    }

    async fn press(&mut self, target: &Locator, key: &str) -> E2eResult<()> {
        let node = self.single(target)?;
        if key == "Enter" && node.test_id.as_deref() == Some("task-input") && !self.shared.quirks.ignores_enter {
            return self.add_task();
        }
        Ok(())
    }

    async fn text(&mut self, target: &Locator) -> E2eResult<String> {
        Ok(self.single(target)?.text_content())
    }

    async fn input_value(&mut self, target: &Locator) -> E2eResult<String> {
        let node = self.single(target)?;
        if node.tag != "input" {
            return Err(E2eError::Driver(format!("{} is not an input element", target)));
        }
        Ok(self.board.as_ref().map(|b| b.input.clone()).unwrap_or_default())
    }

    async fn count(&mut self, target: &Locator) -> E2eResult<usize> {
        Ok(query(&self.tree(), target).len())
    }

    async fn is_visible(&mut self, target: &Locator) -> E2eResult<bool> {
        match self.single(target) {
            Ok(_) => Ok(true),
            Err(E2eError::ElementNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn url(&mut self) -> E2eResult<String> {
        Ok(self.url.clone())
    }

    async fn content(&mut self) -> E2eResult<String> {
        let mut html = String::from("<!DOCTYPE html><html>");
        self.tree().html(&mut html);
        html.push_str("</html>");
        Ok(html)
    }

    /// A flat image whose colour encodes the board state
    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        let board = self.board.clone().unwrap_or_else(|| Board { tasks: vec![], next_id: 1, input: String::new() });
        let [completed, in_progress, pending] = board.stats();
        let shift = if self.shared.quirks.restyled { 90 } else { 0 };
        let colour = image::Rgba([
            (completed as u8).wrapping_mul(40).wrapping_add(shift),
            (in_progress as u8).wrapping_mul(40),
            (pending as u8).wrapping_mul(40),
            255,
        ]);

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        image::RgbaImage::from_pixel(64, 48, colour).save(path)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> E2eResult<()> {
        self.shared.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
