//! Browser driver capability surface
//!
//! The engine never talks to a browser directly. Whatever automation backend
//! is in use (Playwright bridge, CDP client, WebDriver) is adapted to this
//! trait and handed to [`crate::AiSession`].
//!
//! Selectors may match several elements. Every method acts on the first
//! match; backends with strict single-match locators must narrow to it
//! themselves (Playwright: `.first()`).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sightline_common::{BoundingBox, Cookie, LoadState, Observation, WaitState};

use crate::error::E2eResult;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Wait until `selector` reaches `state`, failing after `timeout`.
    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    async fn double_click(&self, selector: &str) -> E2eResult<()>;

    async fn hover(&self, selector: &str) -> E2eResult<()>;

    async fn focus(&self, selector: &str) -> E2eResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn drag_to(&self, source: &str, target: &str) -> E2eResult<()>;

    async fn bounding_box(&self, selector: &str) -> E2eResult<Option<BoundingBox>>;

    async fn mouse_move(&self, x: f64, y: f64) -> E2eResult<()>;

    async fn mouse_down(&self) -> E2eResult<()>;

    async fn mouse_up(&self) -> E2eResult<()>;

    async fn mouse_wheel(&self, delta_x: f64, delta_y: f64) -> E2eResult<()>;

    async fn scroll_into_view(&self, selector: &str) -> E2eResult<()>;

    /// Press a `+`-joined key chord such as `Control+Enter`.
    async fn press_keys(&self, keys: &str) -> E2eResult<()>;

    /// Set files on the first element matching `selector`. Uploads fall back
    /// to a bare `input[type="file"]`, which often matches several inputs.
    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> E2eResult<()>;

    /// Write a full-page PNG screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    async fn url(&self) -> E2eResult<String>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()>;

    async fn reload(&self) -> E2eResult<()>;

    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn add_cookies(&self, cookies: &[Cookie]) -> E2eResult<()>;

    /// Ask the page which elements match a natural-language description.
    async fn observe(&self, description: &str) -> E2eResult<Vec<Observation>>;
}
