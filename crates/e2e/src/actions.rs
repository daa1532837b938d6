//! UI actions
//!
//! Thin wrappers that map a described action onto a [`Primitive`] and run it
//! through [`AiSession::perform`]. Cookie injection, navigation and uploads
//! have no AI tier and record their own step.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use sightline_common::{ActionRequest, Cookie, LoadState, Precondition, WaitState};

use crate::context::AiSession;
use crate::error::{E2eError, E2eResult};
use crate::fallback::{evaluate_gate, DragTarget, GateOutcome, Primitive};

const NAVIGATE_PAUSE: Duration = Duration::from_millis(1_000);
const NAVIGATE_LOAD_TIMEOUT: Duration = Duration::from_millis(10_000);
const UPLOAD_ATTACH_TIMEOUT: Duration = Duration::from_millis(10_000);
const UPLOAD_LAST_RESORT_TIMEOUT: Duration = Duration::from_millis(5_000);
const UPLOAD_CLICK_PAUSE: Duration = Duration::from_millis(1_000);
const SAFE_CLICK_PAUSE: Duration = Duration::from_millis(100);
const FILE_INPUT_SELECTOR: &str = r#"input[type="file"]"#;

/// Default timeout for [`AiSession::safe_click`].
pub const SAFE_CLICK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Vertical delta used when a scroll names neither a delta nor a target.
pub const DEFAULT_SCROLL_DELTA: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrollAmount {
    Named(NamedAmount),
    Pixels(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedAmount {
    Small,
    Medium,
    Large,
}

impl ScrollAmount {
    pub fn pixels(self) -> f64 {
        match self {
            ScrollAmount::Named(NamedAmount::Small) => 100.0,
            ScrollAmount::Named(NamedAmount::Medium) => 300.0,
            ScrollAmount::Named(NamedAmount::Large) => 500.0,
            ScrollAmount::Pixels(px) => px,
        }
    }
}

impl Default for ScrollAmount {
    fn default() -> Self {
        ScrollAmount::Named(NamedAmount::Medium)
    }
}

/// How far and where to scroll. A direction overrides the matching delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    pub delta_x: f64,
    pub delta_y: f64,
    pub direction: Option<ScrollDirection>,
    pub amount: Option<ScrollAmount>,
    /// Scroll this element into view instead of wheeling
    pub scroll_to: Option<String>,
}

impl ScrollOptions {
    /// Effective wheel deltas.
    pub fn deltas(&self) -> (f64, f64) {
        let (mut dx, mut dy) = (self.delta_x, self.delta_y);
        if let Some(direction) = self.direction {
            let px = self.amount.unwrap_or_default().pixels();
            match direction {
                ScrollDirection::Up => dy = -px,
                ScrollDirection::Down => dy = px,
                ScrollDirection::Left => dx = -px,
                ScrollDirection::Right => dx = px,
            }
        }
        if dx == 0.0 && dy == 0.0 && self.scroll_to.is_none() {
            dy = DEFAULT_SCROLL_DELTA;
        }
        (dx, dy)
    }
}

/// Map one symbolic key name to the driver's key name. Unknown names pass
/// through untouched.
pub fn normalize_key(key: &str) -> String {
    let mapped = match key.to_ascii_uppercase().as_str() {
        "CTRL" => "Control",
        "ALT" => "Alt",
        "SHIFT" => "Shift",
        "ENTER" => "Enter",
        "ESC" => "Escape",
        "SPACE" => " ",
        "TAB" => "Tab",
        "DELETE" => "Delete",
        "BACKSPACE" => "Backspace",
        "ARROW_UP" => "ArrowUp",
        "ARROW_DOWN" => "ArrowDown",
        "ARROW_LEFT" => "ArrowLeft",
        "ARROW_RIGHT" => "ArrowRight",
        "HOME" => "Home",
        "END" => "End",
        "PAGE_UP" => "PageUp",
        "PAGE_DOWN" => "PageDown",
        _ => return key.to_string(),
    };
    mapped.to_string()
}

/// `["CTRL", "ENTER"]` becomes `Control+Enter`.
pub fn normalize_keys<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| normalize_key(k.as_ref()))
        .collect::<Vec<_>>()
        .join("+")
}

/// Escape characters that are reserved in a cookie value.
pub fn escape_cookie_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            ' ' => escaped.push_str("%20"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn default_cookie_description(cookies: &[Cookie]) -> String {
    match cookies {
        [single] => format!("Injected cookie {}", single.name),
        many => format!(
            "Injected cookies: {}",
            many.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        ),
    }
}

impl AiSession {
    pub async fn click_action(&self, request: &ActionRequest) -> bool {
        let primitive = request.selector.clone().map(Primitive::Click);
        self.perform(&request.description, &request.description, primitive, request.precondition.as_ref())
            .await
    }

    pub async fn double_click_action(&self, request: &ActionRequest) -> bool {
        let primitive = request.selector.clone().map(Primitive::DoubleClick);
        self.perform(&request.description, &request.description, primitive, request.precondition.as_ref())
            .await
    }

    pub async fn hover_action(&self, request: &ActionRequest) -> bool {
        let primitive = request.selector.clone().map(Primitive::Hover);
        self.perform(&request.description, &request.description, primitive, request.precondition.as_ref())
            .await
    }

    /// The AI tier is told the value to type as well as the description.
    pub async fn fill_action(&self, request: &ActionRequest, value: &str) -> bool {
        let primitive = request.selector.clone().map(|selector| Primitive::Fill {
            selector,
            value: value.to_string(),
        });
        let ai_description = format!("{}. Fill the field with the value: {}", request.description, value);
        self.perform(&request.description, &ai_description, primitive, request.precondition.as_ref())
            .await
    }

    /// Drag the element at `request.selector` to `target`.
    pub async fn drag_action(&self, request: &ActionRequest, target: DragTarget) -> bool {
        let primitive = request
            .selector
            .clone()
            .map(|source| Primitive::Drag { source, target });
        self.perform(&request.description, &request.description, primitive, request.precondition.as_ref())
            .await
    }

    /// Wheel over the page, over `request.selector`, or scroll
    /// `options.scroll_to` into view.
    pub async fn scroll_action(&self, request: &ActionRequest, options: &ScrollOptions) -> bool {
        let (dx, dy) = options.deltas();
        let primitive = match (&options.scroll_to, &request.selector) {
            (Some(target), _) => Primitive::ScrollIntoView(target.clone()),
            (None, selector) => Primitive::Wheel {
                selector: selector.clone(),
                dx,
                dy,
            },
        };
        self.perform(&request.description, &request.description, Some(primitive), request.precondition.as_ref())
            .await
    }

    /// Press a key chord, on `request.selector` when one is given.
    pub async fn keypress_action<S: AsRef<str>>(
        &self,
        request: &ActionRequest,
        keys: &[S],
        focus_first: bool,
    ) -> bool {
        let primitive = Primitive::Press {
            selector: request.selector.clone(),
            keys: normalize_keys(keys),
            focus_first,
        };
        self.perform(&request.description, &request.description, Some(primitive), request.precondition.as_ref())
            .await
    }

    /// Inject cookies into the browser context. Values are escaped and the
    /// path defaults to `/`. A closed gate skips injection and reports success.
    pub async fn cookie_action(
        &self,
        cookies: &[Cookie],
        description: Option<&str>,
        precondition: Option<&Precondition>,
    ) -> bool {
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| default_cookie_description(cookies));

        let prepared: Vec<Cookie> = cookies
            .iter()
            .map(|cookie| Cookie {
                value: escape_cookie_value(&cookie.value),
                path: Some(cookie.path.clone().unwrap_or_else(|| "/".to_string())),
                ..cookie.clone()
            })
            .collect();

        let success = match evaluate_gate(precondition, self.config.gate_mismatch) {
            GateOutcome::Open => match self.driver.add_cookies(&prepared).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(description = %description, "Cookie injection failed: {}", e);
                    false
                }
            },
            GateOutcome::Skip | GateOutcome::AiOnly => {
                info!(description = %description, "Precondition not met, skipping cookie injection");
                true
            }
        };

        self.progress.add_step(&description, success);
        success
    }

    /// Set `files` on a file input. Without a working selector the page is
    /// observed for the best candidate; as a last resort the candidate is
    /// clicked and the first file input on the page is used.
    pub async fn upload_file_action(
        &self,
        description: &str,
        files: &[PathBuf],
        selector: Option<&str>,
    ) -> bool {
        let mut success = match selector {
            Some(selector) => self.set_files_on(selector, files, UPLOAD_ATTACH_TIMEOUT).await,
            None => false,
        };

        if !success {
            success = self.upload_via_observation(description, files).await;
        }

        self.progress.add_step(description, success);
        success
    }

    async fn set_files_on(&self, selector: &str, files: &[PathBuf], timeout: Duration) -> bool {
        let result: E2eResult<()> = async {
            self.driver
                .wait_for_selector(selector, WaitState::Attached, timeout)
                .await?;
            self.driver.set_input_files(selector, files).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(selector, "Setting input files failed: {}", e);
                false
            }
        }
    }

    async fn upload_via_observation(&self, description: &str, files: &[PathBuf]) -> bool {
        let observations = match self.driver.observe(description).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!(description, "Observe failed during upload: {}", e);
                return false;
            }
        };

        let candidate = observations
            .iter()
            .find(|obs| obs.selector.is_some() && obs.looks_like_file_input())
            .or_else(|| observations.first());
        let Some(selector) = candidate.and_then(|c| c.selector.as_deref()) else {
            return false;
        };

        if self.set_files_on(selector, files, UPLOAD_ATTACH_TIMEOUT).await {
            return true;
        }
        if selector.contains(FILE_INPUT_SELECTOR) {
            return false;
        }

        debug!(selector, "Clicking candidate to reveal a file input");
        if self.driver.click(selector).await.is_err() {
            return false;
        }
        tokio::time::sleep(UPLOAD_CLICK_PAUSE).await;
        self.set_files_on(FILE_INPUT_SELECTOR, files, UPLOAD_LAST_RESORT_TIMEOUT)
            .await
    }

    /// Navigate and record the step. Navigation and load errors are ignored.
    pub async fn navigate_action(&self, url: &str, description: Option<&str>) {
        tokio::time::sleep(NAVIGATE_PAUSE).await;
        if let Err(e) = self.driver.goto(url).await {
            debug!(url, "Navigation error ignored: {}", e);
        }
        self.wait_for_page(LoadState::DomContentLoaded, NAVIGATE_LOAD_TIMEOUT)
            .await;
        self.wait_for_page(LoadState::NetworkIdle, NAVIGATE_LOAD_TIMEOUT)
            .await;

        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Navigated to {}", url));
        self.progress.add_step(&description, true);
    }

    pub async fn refresh_action(&self, description: Option<&str>) -> E2eResult<()> {
        self.driver.reload().await?;
        self.progress
            .add_step(description.unwrap_or("Refreshed the page"), true);
        Ok(())
    }

    /// Click with readiness waits and an overall deadline. Records nothing.
    pub async fn safe_click(&self, selector: &str, timeout: Duration) -> bool {
        self.safe_pointer(selector, timeout, false).await
    }

    pub async fn safe_double_click(&self, selector: &str, timeout: Duration) -> bool {
        self.safe_pointer(selector, timeout, true).await
    }

    async fn safe_pointer(&self, selector: &str, timeout: Duration, double: bool) -> bool {
        self.wait_for_page(LoadState::DomContentLoaded, timeout).await;
        self.wait_for_page(LoadState::NetworkIdle, timeout).await;

        let prepared: E2eResult<()> = async {
            self.driver
                .wait_for_selector(selector, WaitState::Visible, timeout)
                .await?;
            self.driver.scroll_into_view(selector).await
        }
        .await;
        if let Err(e) = prepared {
            debug!(selector, "Element not ready: {}", e);
            return false;
        }

        tokio::time::sleep(SAFE_CLICK_PAUSE).await;

        let click = async {
            if double {
                self.driver.double_click(selector).await
            } else {
                self.driver.click(selector).await
            }
        };
        match tokio::time::timeout(timeout, click).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(selector, "Click failed: {}", e);
                false
            }
            Err(_) => {
                debug!(selector, "Click timed out after {:?}", timeout);
                false
            }
        }
    }
}

/// Error that ends the running scenario with a passing status.
pub fn pass_test_early(message: Option<&str>) -> E2eError {
    E2eError::PassTestEarly(
        message
            .unwrap_or("Test completed successfully via agent")
            .to_string(),
    )
}
