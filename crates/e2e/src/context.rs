//! The capability bundle every AI-assisted operation runs against

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use sightline_common::{AiConfig, LoadState, ProgressLog};

use crate::agent::AgentCapability;
use crate::driver::BrowserDriver;
use crate::vision::VisionClient;

/// One browser page plus the collaborators that assist it.
///
/// Operations on a session are awaited one at a time; nothing here is shared
/// across concurrently running tests.
#[derive(Clone)]
pub struct AiSession {
    pub(crate) driver: Arc<dyn BrowserDriver>,
    pub(crate) vision: Arc<dyn VisionClient>,
    pub(crate) progress: Arc<dyn ProgressLog>,
    pub(crate) agent: Option<Arc<dyn AgentCapability>>,
    pub(crate) config: AiConfig,
}

impl AiSession {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        vision: Arc<dyn VisionClient>,
        progress: Arc<dyn ProgressLog>,
        config: AiConfig,
    ) -> Self {
        Self {
            driver,
            vision,
            progress,
            agent: None,
            config,
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentCapability>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn progress(&self) -> &dyn ProgressLog {
        self.progress.as_ref()
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Best-effort readiness wait; a timeout is logged and ignored.
    pub(crate) async fn wait_for_page(&self, state: LoadState, timeout: Duration) {
        if let Err(e) = self.driver.wait_for_load_state(state, timeout).await {
            debug!("{} wait timed out, continuing anyway: {}", state, e);
        }
    }

    pub(crate) async fn page_url(&self) -> String {
        self.driver
            .url()
            .await
            .unwrap_or_else(|_| "unknown".to_string())
    }
}
