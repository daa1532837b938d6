//! Agent capability: the richest fallback tier for UI actions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// An external agent able to carry out a described action on the page.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// `instructions` frame the agent's role and carry the progress
    /// transcript; `task` is the action description itself.
    async fn execute(&self, instructions: &str, task: &str) -> E2eResult<AgentOutcome>;
}

/// Role instructions handed to the agent ahead of a single fallback step.
pub fn fallback_instructions(progress: &str) -> String {
    let progress = if progress.trim().is_empty() { "N/A" } else { progress };
    format!(
        "You are a persistent AI agent operating a web browser to perform a QA test step \
         that the deterministic automation failed to perform. Execute precisely the requested \
         step and stop immediately after it is completed.\n\nPrevious steps:\n{}",
        progress
    )
}
