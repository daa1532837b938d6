//! Progress log: the append-only transcript of executed steps
//!
//! Every action, assertion and extraction appends here once it has fully
//! resolved. The rendered transcript is fed back into model prompts, so the
//! wording of [`ProgressLog::progress_string`] matters.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::types::{AiAssertionRecord, Attachment, ProgressEntry};

const FAILED_STEP_MARKER: &str =
    "* (There were complications executing this step. It was probably not executed properly.)";

const EMPTY_TRANSCRIPT: &str = "No steps completed yet.";

/// Append-only recorder consulted by the engine for prompt context.
pub trait ProgressLog: Send + Sync {
    fn add_step(&self, description: &str, success: bool);

    fn add_ai_assertion(&self, condition: &str, screenshot_base64: &str, result: bool);

    /// Human-readable transcript, used verbatim inside model prompts.
    fn progress_string(&self) -> String;

    fn test_id(&self) -> String;

    fn attach(&self, _attachment: Attachment) {}
}

#[derive(Debug, Default)]
struct TrackerState {
    steps: Vec<ProgressEntry>,
    assertions: Vec<AiAssertionRecord>,
    attachments: Vec<Attachment>,
    guide: String,
    login_notes: String,
    file_path: Option<PathBuf>,
    video_started: Option<Instant>,
}

/// In-memory [`ProgressLog`] for a single test execution.
#[derive(Debug)]
pub struct TestProgressTracker {
    test_id: String,
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    state: Mutex<TrackerState>,
}

/// Serializable view of the recorded steps, consumed by reporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsExport {
    pub test_id: String,
    pub test_start_time: chrono::DateTime<chrono::Utc>,
    pub steps: Vec<ExportedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedStep {
    pub description: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub video_timestamp_ms: Option<u64>,
    pub video_timestamp_formatted: Option<String>,
    pub success: Option<bool>,
}

impl TestProgressTracker {
    /// An empty `test_id` is replaced by a generated one.
    pub fn new(test_id: impl Into<String>) -> Self {
        let mut test_id = test_id.into();
        if test_id.is_empty() {
            test_id = format!("test-{}", uuid::Uuid::new_v4());
        }
        Self {
            test_id,
            started: Instant::now(),
            started_at: chrono::Utc::now(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn with_file_path(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().file_path = Some(path.into());
        self
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.state.lock().file_path.clone()
    }

    pub fn set_test_case_guide(&self, guide: impl Into<String>) {
        let guide = guide.into();
        info!(test_id = %self.test_id, "Set test case guide");
        self.state.lock().guide = guide;
    }

    pub fn test_case_guide(&self) -> String {
        self.state.lock().guide.clone()
    }

    pub fn set_login_notes(&self, notes: impl Into<String>) {
        self.state.lock().login_notes = notes.into();
    }

    pub fn login_notes(&self) -> String {
        self.state.lock().login_notes.clone()
    }

    /// Mark the moment video recording began; later steps carry an offset.
    pub fn mark_video_start(&self) {
        self.state.lock().video_started = Some(Instant::now());
    }

    pub fn steps(&self) -> Vec<ProgressEntry> {
        self.state.lock().steps.clone()
    }

    pub fn step_count(&self) -> usize {
        self.state.lock().steps.len()
    }

    pub fn ai_assertions(&self) -> Vec<AiAssertionRecord> {
        self.state.lock().assertions.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.state.lock().attachments.clone()
    }

    /// Transcript without the guide and login notes header.
    pub fn steps_string(&self) -> String {
        self.render(false)
    }

    /// `(description, MM:SS or N/A)` pairs.
    pub fn steps_with_video_timestamps(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .steps
            .iter()
            .map(|step| {
                let stamp = step
                    .video_offset
                    .map(format_duration)
                    .unwrap_or_else(|| "N/A".to_string());
                (step.description.clone(), stamp)
            })
            .collect()
    }

    pub fn export_steps(&self) -> StepsExport {
        let state = self.state.lock();
        StepsExport {
            test_id: self.test_id.clone(),
            test_start_time: self.started_at,
            steps: state
                .steps
                .iter()
                .map(|step| ExportedStep {
                    description: step.description.clone(),
                    timestamp: step.recorded_at,
                    video_timestamp_ms: step.video_offset.map(|d| d.as_millis() as u64),
                    video_timestamp_formatted: step.video_offset.map(format_duration),
                    success: step.success,
                })
                .collect(),
        }
    }

    pub fn export_steps_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_steps())?)
    }

    fn render(&self, with_guide: bool) -> String {
        let state = self.state.lock();
        if state.steps.is_empty() {
            return EMPTY_TRANSCRIPT.to_string();
        }

        let mut output = String::new();
        if with_guide && !state.guide.is_empty() {
            output.push_str(&format!("Test Case Guide:\n{}\n\n", state.guide));
            if !state.login_notes.is_empty() {
                output.push_str(&format!("Login Notes:\n{}\n\n", state.login_notes));
            }
            output.push_str("Test Steps:\n");
        }

        let lines: Vec<String> = state
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let local = step.recorded_at.with_timezone(&chrono::Local);
                format!(
                    "Step {}: {} (Executed at: {})",
                    i + 1,
                    step.description,
                    local.format("%H:%M:%S")
                )
            })
            .collect();
        output.push_str(&lines.join("\n"));
        output
    }
}

impl Default for TestProgressTracker {
    fn default() -> Self {
        Self::new("")
    }
}

impl ProgressLog for TestProgressTracker {
    fn add_step(&self, description: &str, success: bool) {
        let description = if success {
            description.to_string()
        } else {
            format!("{}{}", description, FAILED_STEP_MARKER)
        };

        let mut state = self.state.lock();
        let video_offset = state.video_started.map(|start| start.elapsed());
        state.steps.push(ProgressEntry {
            description,
            recorded_at: chrono::Utc::now(),
            elapsed: self.started.elapsed(),
            video_offset,
            success: Some(success),
        });
    }

    fn add_ai_assertion(&self, condition: &str, screenshot_base64: &str, result: bool) {
        info!(test_id = %self.test_id, condition, result, "Recorded AI assertion");
        self.state.lock().assertions.push(AiAssertionRecord {
            condition: condition.to_string(),
            screenshot_base64: screenshot_base64.to_string(),
            result,
        });
    }

    fn progress_string(&self) -> String {
        self.render(true)
    }

    fn test_id(&self) -> String {
        self.test_id.clone()
    }

    fn attach(&self, attachment: Attachment) {
        self.state.lock().attachments.push(attachment);
    }
}

/// Format as `MM:SS`.
fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
