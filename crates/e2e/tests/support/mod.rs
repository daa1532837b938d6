//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sightline_common::{
    AiConfig, BoundingBox, Cookie, LoadState, Observation, TestProgressTracker, WaitState,
};
use sightline_e2e::vision::CompletionRequest;
use sightline_e2e::{AgentCapability, AgentOutcome, AiSession, BrowserDriver, E2eError, E2eResult, VisionClient};

pub const PAGE_URL: &str = "https://shop.test/checkout";

/// Minimal PNG signature; the engine only base64-encodes the bytes.
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Browser double that records every call as `op:args`.
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<String>>,
    cookies: Mutex<Vec<Cookie>>,
    failing: HashSet<String>,
    rejects_files: HashSet<String>,
    observations: Vec<Observation>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation on `selector` fails.
    pub fn failing(mut self, selector: &str) -> Self {
        self.failing.insert(selector.to_string());
        self
    }

    /// `selector` is found but refuses `set_input_files`.
    pub fn rejecting_files(mut self, selector: &str) -> Self {
        self.rejects_files.insert(selector.to_string());
        self
    }

    pub fn observing(mut self, observations: Vec<Observation>) -> Self {
        self.observations = observations;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls whose operation name is `op`.
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{}:", op);
        self.calls()
            .into_iter()
            .filter(|c| c == op || c.starts_with(&prefix))
            .collect()
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn on(&self, op: &str, selector: &str) -> E2eResult<()> {
        self.record(format!("{}:{}", op, selector));
        if self.failing.contains(selector) {
            Err(E2eError::Driver(format!("{} not found", selector)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn wait_for_selector(&self, selector: &str, _state: WaitState, _timeout: Duration) -> E2eResult<()> {
        self.on("wait", selector)
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.on("click", selector)
    }

    async fn double_click(&self, selector: &str) -> E2eResult<()> {
        self.on("double_click", selector)
    }

    async fn hover(&self, selector: &str) -> E2eResult<()> {
        self.on("hover", selector)
    }

    async fn focus(&self, selector: &str) -> E2eResult<()> {
        self.on("focus", selector)
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.on("fill", &format!("{}={}", selector, value))?;
        if self.failing.contains(selector) {
            return Err(E2eError::Driver(format!("{} not found", selector)));
        }
        Ok(())
    }

    async fn drag_to(&self, source: &str, target: &str) -> E2eResult<()> {
        self.record(format!("drag_to:{}->{}", source, target));
        Ok(())
    }

    async fn bounding_box(&self, _selector: &str) -> E2eResult<Option<BoundingBox>> {
        Ok(Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 40.0,
        }))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> E2eResult<()> {
        self.record(format!("mouse_move:{},{}", x, y));
        Ok(())
    }

    async fn mouse_down(&self) -> E2eResult<()> {
        self.record("mouse_down".to_string());
        Ok(())
    }

    async fn mouse_up(&self) -> E2eResult<()> {
        self.record("mouse_up".to_string());
        Ok(())
    }

    async fn mouse_wheel(&self, delta_x: f64, delta_y: f64) -> E2eResult<()> {
        self.record(format!("wheel:{},{}", delta_x, delta_y));
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> E2eResult<()> {
        self.on("scroll_into_view", selector)
    }

    async fn press_keys(&self, keys: &str) -> E2eResult<()> {
        self.record(format!("press:{}", keys));
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, _files: &[PathBuf]) -> E2eResult<()> {
        self.on("set_input_files", selector)?;
        if self.rejects_files.contains(selector) {
            return Err(E2eError::Driver(format!("{} is not a file input", selector)));
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.record("screenshot".to_string());
        std::fs::write(path, FAKE_PNG)?;
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        Ok(PAGE_URL.to_string())
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> E2eResult<()> {
        Ok(())
    }

    async fn reload(&self) -> E2eResult<()> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.record(format!("goto:{}", url));
        Ok(())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> E2eResult<()> {
        self.record(format!("add_cookies:{}", cookies.len()));
        self.cookies.lock().extend_from_slice(cookies);
        Ok(())
    }

    async fn observe(&self, description: &str) -> E2eResult<Vec<Observation>> {
        self.record(format!("observe:{}", description));
        Ok(self.observations.clone())
    }
}

/// One scripted completion outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Never settles until cancelled
    Hang,
    Fail,
}

impl Reply {
    pub fn decision(label: &str) -> Self {
        Reply::Text(format!("<reasoning>stub</reasoning><decision>{}</decision>", label))
    }
}

/// Completion double: plays `script` in order, then repeats `fallback`.
pub struct StubVision {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubVision {
    pub fn always(reply: Reply) -> Self {
        Self::scripted(vec![], reply)
    }

    pub fn scripted(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl VisionClient for StubVision {
    async fn complete(&self, request: CompletionRequest, cancel: CancellationToken) -> E2eResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(E2eError::Completion("stub failure".to_string())),
            Reply::Hang => {
                cancel.cancelled().await;
                Err(E2eError::Completion("cancelled".to_string()))
            }
        }
    }
}

/// Agent double returning a fixed outcome.
pub struct FakeAgent {
    success: bool,
    tasks: Mutex<Vec<(String, String)>>,
}

impl FakeAgent {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// `(instructions, task)` pairs received so far.
    pub fn tasks(&self) -> Vec<(String, String)> {
        self.tasks.lock().clone()
    }
}

#[async_trait]
impl AgentCapability for FakeAgent {
    async fn execute(&self, instructions: &str, task: &str) -> E2eResult<AgentOutcome> {
        self.tasks
            .lock()
            .push((instructions.to_string(), task.to_string()));
        Ok(AgentOutcome {
            success: self.success,
            message: None,
        })
    }
}

/// Everything a test needs to drive one session.
pub struct Harness {
    pub driver: Arc<FakeDriver>,
    pub vision: Arc<StubVision>,
    pub tracker: Arc<TestProgressTracker>,
    pub session: AiSession,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(driver: FakeDriver, vision: StubVision) -> Self {
        Self::with_config(driver, vision, |_| {})
    }

    pub fn with_config(driver: FakeDriver, vision: StubVision, tweak: impl FnOnce(&mut AiConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AiConfig {
            screenshot_dir: dir.path().join("shots"),
            ..Default::default()
        };
        tweak(&mut config);

        let driver = Arc::new(driver);
        let vision = Arc::new(vision);
        let tracker = Arc::new(TestProgressTracker::new("harness"));
        let session = AiSession::new(driver.clone(), vision.clone(), tracker.clone(), config);

        Self {
            driver,
            vision,
            tracker,
            session,
            dir,
        }
    }

    pub fn with_agent(mut self, agent: Arc<FakeAgent>) -> Self {
        self.session = self.session.with_agent(agent);
        self
    }

    /// Screenshot files left on disk.
    pub fn screenshots_on_disk(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("shots"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn step_descriptions(&self) -> Vec<String> {
        self.tracker
            .steps()
            .into_iter()
            .map(|s| s.description)
            .collect()
    }
}
