//! Sightline Common Library
//!
//! Shared data model, configuration and the progress log used by the
//! AI-assisted browser test engine.

pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod types;

pub use config::{AiConfig, GateMismatch, ModelConfig, ModelFlavor, RetryPolicy};
pub use error::{Error, Result};
pub use progress::{ProgressLog, StepsExport, TestProgressTracker};
pub use types::*;

/// Sightline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
