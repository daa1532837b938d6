//! Core types for Sightline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Closed classification of a vision model verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Pass,
    MajorFail,
    MinorFail,
    PartialFail,
    Wait,
    Unparseable,
}

impl Decision {
    /// Map one of the five recognized labels (case-insensitive, surrounding
    /// whitespace ignored). Anything else yields `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pass" => Some(Decision::Pass),
            "major-fail" => Some(Decision::MajorFail),
            "minor-fail" => Some(Decision::MinorFail),
            "partial-fail" => Some(Decision::PartialFail),
            "wait" => Some(Decision::Wait),
            _ => None,
        }
    }

    /// Soft failures are reported as passing.
    pub fn is_soft_failure(self) -> bool {
        matches!(self, Decision::MinorFail | Decision::PartialFail)
    }

    /// Whether the decision calls for another capture-and-ask cycle.
    pub fn is_retryable(self) -> bool {
        matches!(self, Decision::MajorFail | Decision::Wait)
    }

    /// Boolean verdict used once retries are no longer possible.
    pub fn verdict(self) -> bool {
        match self {
            Decision::Pass | Decision::MinorFail | Decision::PartialFail => true,
            Decision::MajorFail | Decision::Wait | Decision::Unparseable => false,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pass => write!(f, "pass"),
            Decision::MajorFail => write!(f, "major-fail"),
            Decision::MinorFail => write!(f, "minor-fail"),
            Decision::PartialFail => write!(f, "partial-fail"),
            Decision::Wait => write!(f, "wait"),
            Decision::Unparseable => write!(f, "unparseable"),
        }
    }
}

/// "Only run the deterministic primitive when `current == expected`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    pub current: String,
    pub expected: String,
}

impl Precondition {
    pub fn new(current: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            expected: expected.into(),
        }
    }

    /// An empty side counts as "not supplied" and never closes the gate.
    pub fn holds(&self) -> bool {
        self.current.is_empty() || self.expected.is_empty() || self.current == self.expected
    }
}

/// A described UI action, optionally bound to a locator and a precondition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionRequest {
    pub description: String,
    pub selector: Option<String>,
    pub precondition: Option<Precondition>,
}

impl ActionRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn when(mut self, current: impl Into<String>, expected: impl Into<String>) -> Self {
        self.precondition = Some(Precondition::new(current, expected));
        self
    }
}

/// One entry of the progress transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub description: String,
    /// Wall-clock time the entry was recorded (display only)
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// Monotonic offset from tracker creation
    pub elapsed: Duration,
    /// Offset into the test video, when recording started
    pub video_offset: Option<Duration>,
    pub success: Option<bool>,
}

/// Recorded outcome of an AI vision assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAssertionRecord {
    pub condition: String,
    pub screenshot_base64: String,
    pub result: bool,
}

/// A file attached to the running test (screenshots, traces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub path: PathBuf,
}

/// A candidate element returned by the driver's observe capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub selector: Option<String>,
    pub description: String,
}

impl Observation {
    /// Heuristic used by file upload to prefer real file inputs.
    pub fn looks_like_file_input(&self) -> bool {
        let selector_hit = self
            .selector
            .as_deref()
            .map(|s| s.contains(r#"input[type="file"]"#) || s.contains("input[type=file]"))
            .unwrap_or(false);
        let description = self.description.to_lowercase();
        selector_hit || description.contains("file input") || description.contains("input file")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Cookie to inject into the active browser context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: Option<bool>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub same_site: Option<SameSite>,
}

/// Element state to wait for before acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Attached,
}

/// Page load milestones the driver can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    DomContentLoaded,
    NetworkIdle,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::DomContentLoaded => write!(f, "domcontentloaded"),
            LoadState::NetworkIdle => write!(f, "networkidle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}
