//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration for AI assertions, extraction and actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Vision model endpoint and credentials
    pub model: ModelConfig,

    /// Directory screenshots are written to
    pub screenshot_dir: PathBuf,

    /// Do not attach assertion screenshots to the test record
    pub skip_attach_screenshot: bool,

    /// Per-request completion timeout for assertions
    pub assert_request_timeout_ms: u64,

    /// Per-request completion timeout for extraction
    pub extract_request_timeout_ms: u64,

    /// Document-ready wait before an assertion capture
    pub page_ready_timeout_ms: u64,

    /// Idle pause after the readiness wait
    pub settle_delay_ms: u64,

    /// Document-ready and network-idle waits before an extraction capture
    pub extract_page_load_timeout_ms: u64,

    /// Document-ready wait before delegating an action to AI
    pub act_ready_timeout_ms: u64,

    /// Visibility wait applied to deterministic primitives
    pub visibility_timeout_ms: u64,

    /// What a closed precondition gate means for UI actions
    pub gate_mismatch: GateMismatch,

    /// Retry caps and backoffs
    pub retry: RetryPolicy,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            screenshot_dir: PathBuf::from("test-results"),
            skip_attach_screenshot: false,
            assert_request_timeout_ms: 45_000,
            extract_request_timeout_ms: 180_000,
            page_ready_timeout_ms: 1_000,
            settle_delay_ms: 1_000,
            extract_page_load_timeout_ms: 5_000,
            act_ready_timeout_ms: 30_000,
            visibility_timeout_ms: 10_000,
            gate_mismatch: GateMismatch::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AiConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AiConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.assert_request_timeout_ms == 0 || self.extract_request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request timeouts must be greater than zero".to_string(),
            ));
        }
        if self.model.deployment.trim().is_empty() {
            return Err(Error::InvalidConfig("model deployment must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn assert_request_timeout(&self) -> Duration {
        Duration::from_millis(self.assert_request_timeout_ms)
    }

    pub fn extract_request_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_request_timeout_ms)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn extract_page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_page_load_timeout_ms)
    }

    pub fn act_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.act_ready_timeout_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }
}

/// Which completion API dialect to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFlavor {
    #[default]
    Azure,
    Openai,
}

/// Vision model endpoint configuration. Values are passed through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub flavor: ModelFlavor,

    /// Resource endpoint (Azure) or API base URL (OpenAI)
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Azure `api-version` query parameter
    pub api_version: String,

    /// Deployment (Azure) or model identifier (OpenAI)
    pub deployment: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            flavor: ModelFlavor::Azure,
            endpoint: None,
            api_key: None,
            api_version: "2024-02-15-preview".to_string(),
            deployment: "gpt-4.1".to_string(),
        }
    }
}

/// Behavior of an action whose precondition does not hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMismatch {
    /// Skip the action and report success without acting
    #[default]
    Skip,
    /// Skip the primitive but still let the AI perform the description
    AiFallback,
}

/// Bounded retry budgets per outcome class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub timeout_retries: u32,
    pub timeout_backoff_ms: u64,
    pub major_fail_retries: u32,
    pub major_fail_backoff_ms: u64,
    pub wait_retries: u32,
    pub wait_backoff_ms: u64,
    pub extract_wait_retries: u32,
    pub extract_wait_backoff_ms: u64,
    pub wait_until_interval_ms: u64,
    pub wait_until_deadline_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_retries: 2,
            timeout_backoff_ms: 5_000,
            major_fail_retries: 3,
            major_fail_backoff_ms: 10_000,
            wait_retries: 10,
            wait_backoff_ms: 10_000,
            extract_wait_retries: 10,
            extract_wait_backoff_ms: 5_000,
            wait_until_interval_ms: 10_000,
            wait_until_deadline_ms: 300_000,
        }
    }
}

impl RetryPolicy {
    pub fn wait_until_interval(&self) -> Duration {
        Duration::from_millis(self.wait_until_interval_ms)
    }

    pub fn wait_until_deadline(&self) -> Duration {
        Duration::from_millis(self.wait_until_deadline_ms)
    }
}
