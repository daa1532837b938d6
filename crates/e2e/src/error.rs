//! Error types for the AI-assisted test engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error(transparent)]
    Common(#[from] sightline_common::Error),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("AI request timed out after {timeout_ms}ms ({attempts} attempts)")]
    AiTimeout { timeout_ms: u64, attempts: u32 },

    #[error("AI detected loading state for {variable} after {attempts} attempts")]
    ExtractionStalled { variable: String, attempts: u32 },

    #[error("AI response not in expected format for {variable} (attempt {attempts})")]
    ExtractionUnparseable { variable: String, attempts: u32 },

    #[error("{0}")]
    AssertionFailed(String),

    #[error("Test passed early: {0}")]
    PassTestEarly(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
