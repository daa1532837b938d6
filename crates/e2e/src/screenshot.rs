//! Screenshot capture for model prompts

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::driver::BrowserDriver;
use crate::error::E2eResult;

/// A captured page image, on disk and encoded for a prompt.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub path: PathBuf,
    pub base64: String,
}

impl Screenshot {
    /// Remove the file before a retry so it is never reused.
    pub async fn discard(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Discarded screenshot"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), "Could not discard screenshot: {}", e),
        }
    }
}

/// Writes screenshots under a directory with timestamp-qualified names.
pub struct ScreenshotCapture<'a> {
    driver: &'a dyn BrowserDriver,
    dir: &'a Path,
}

impl<'a> ScreenshotCapture<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, dir: &'a Path) -> Self {
        Self { driver, dir }
    }

    /// `<dir>/<prefix>-<timestamp>.png`
    pub fn path_for(&self, prefix: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.png", prefix, file_timestamp()))
    }

    pub async fn capture(&self, prefix: &str) -> E2eResult<Screenshot> {
        tokio::fs::create_dir_all(self.dir).await?;

        let path = self.path_for(prefix);
        self.driver.screenshot(&path).await?;

        let bytes = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Captured screenshot");

        Ok(Screenshot {
            path,
            base64: STANDARD.encode(bytes),
        })
    }
}

/// ISO-8601 UTC timestamp with `:` and `.` replaced so it is filename-safe.
fn file_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}
