//! Sightline E2E engine
//!
//! AI-assisted assertions, extraction and action fallback for browser
//! end-to-end tests:
//! - Asks a vision model whether a condition holds on a page screenshot
//! - Retries with separate budgets for "still loading", hard failures and
//!   request timeouts
//! - Runs UI actions deterministically first and hands them to an AI tier
//!   when the primitive is missing or fails
//! - Parses declarative YAML scenarios and reports one record per attempt
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  AiSession (per test attempt)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  actions / fallback                                         │
//! │    ├── click, fill, drag, scroll, press, cookie, upload     │
//! │    └── perform(): gate -> primitive -> AI tier -> progress  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  orchestrator                                               │
//! │    ├── ai_assert / expect_ai_assert / wait_until            │
//! │    ├── ai_extract                                           │
//! │    └── AttemptState: wait | major-fail | timeout budgets    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  screenshot -> vision (race vs deadline) -> classifier      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver   VisionClient   AgentCapability  ProgressLog│
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod agent;
pub mod classifier;
pub mod context;
pub mod driver;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod screenshot;
pub mod spec;
pub mod vision;

pub use actions::{pass_test_early, ScrollOptions};
pub use agent::{AgentCapability, AgentOutcome};
pub use classifier::{classify_decision, classify_extraction, Extraction};
pub use context::AiSession;
pub use driver::BrowserDriver;
pub use error::{E2eError, E2eResult};
pub use fallback::{DragTarget, Primitive};
pub use orchestrator::{AttemptEvent, AttemptState, RetryLimits, RetryReason, Transition};
pub use report::{dedupe_flaky, SuiteReport, TestRecord, TestStatus};
pub use runner::{RunnerConfig, ScenarioRunner};
pub use spec::{Scenario, ScenarioStep};
pub use vision::{OpenAiVisionClient, VisionClient};
