//! Finalized per-test records and suite-level results

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use sightline_common::StepsExport;

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
    Interrupted,
}

impl TestStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::TimedOut | TestStatus::Interrupted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub trace: Option<String>,
    pub video: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Annotation {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

/// One attempt of one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub title: String,
    pub file: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Zero-based attempt index
    #[serde(default)]
    pub retry: u32,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Artifacts,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub steps: Option<StepsExport>,
    #[serde(default)]
    pub flaky: bool,
}

impl TestRecord {
    /// Identity shared by every attempt of the same test.
    pub fn key(&self) -> String {
        format!("{}#{}", self.file, self.title)
    }
}

/// Collapse retried attempts to one record per test.
///
/// A test with both a passing and a failing attempt keeps only its latest
/// passing attempt, marked flaky. Otherwise the latest attempt wins. First
/// appearance order is preserved.
pub fn dedupe_flaky(records: Vec<TestRecord>) -> Vec<TestRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<TestRecord>> = HashMap::new();

    for record in records {
        let key = record.key();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let mut attempts = groups.remove(&key)?;
            let any_failed = attempts.iter().any(|r| r.status.is_failure());
            let last_pass = attempts
                .iter()
                .rposition(|r| r.status == TestStatus::Passed);

            match last_pass {
                Some(idx) if any_failed => {
                    let mut kept = attempts.swap_remove(idx);
                    kept.flaky = true;
                    Some(kept)
                }
                _ => attempts.pop(),
            }
        })
        .collect()
}

/// Result of running a suite, after flaky de-duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub flaky: Vec<String>,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub results: Vec<TestRecord>,
}

impl SuiteReport {
    pub fn from_records(records: Vec<TestRecord>, duration_ms: u64) -> Self {
        let results = dedupe_flaky(records);

        let passed = results.iter().filter(|r| r.status == TestStatus::Passed).count();
        let skipped = results.iter().filter(|r| r.status == TestStatus::Skipped).count();
        let failed = results.iter().filter(|r| r.status.is_failure()).count();
        let flaky = results
            .iter()
            .filter(|r| r.flaky)
            .map(|r| r.title.clone())
            .collect();
        let status = if failed > 0 {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };

        Self {
            total: results.len(),
            passed,
            failed,
            skipped,
            flaky,
            status,
            duration_ms,
            results,
        }
    }

    /// Write the report as pretty JSON to `<dir>/test-results.json`.
    pub fn write_results(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(title: &str, status: TestStatus, retry: u32) -> TestRecord {
        TestRecord {
            title: title.into(),
            file: "checkout.yaml".into(),
            project_name: None,
            status,
            duration_ms: 10,
            retry,
            error: None,
            artifacts: Artifacts::default(),
            annotations: vec![],
            steps: None,
            flaky: false,
        }
    }

    #[test]
    fn test_flaky_keeps_passing_attempt() {
        let records = vec![
            record("pay", TestStatus::Failed, 0),
            record("pay", TestStatus::Passed, 1),
            record("ship", TestStatus::Passed, 0),
        ];
        let deduped = dedupe_flaky(records);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "pay");
        assert_eq!(deduped[0].status, TestStatus::Passed);
        assert_eq!(deduped[0].retry, 1);
        assert!(deduped[0].flaky);
        assert!(!deduped[1].flaky);
    }

    #[test]
    fn test_pass_before_later_failure_is_kept() {
        let records = vec![
            record("pay", TestStatus::Passed, 0),
            record("pay", TestStatus::TimedOut, 1),
        ];
        let deduped = dedupe_flaky(records);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].retry, 0);
        assert!(deduped[0].flaky);
    }

    #[test]
    fn test_consistent_failures_keep_latest() {
        let records = vec![
            record("pay", TestStatus::Failed, 0),
            record("pay", TestStatus::Failed, 1),
        ];
        let deduped = dedupe_flaky(records);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].retry, 1);
        assert!(!deduped[0].flaky);
    }

    #[test]
    fn test_same_title_in_different_files() {
        let mut other = record("pay", TestStatus::Failed, 0);
        other.file = "refunds.yaml".into();
        let deduped = dedupe_flaky(vec![record("pay", TestStatus::Passed, 0), other]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_suite_report_counts_and_write() {
        let records = vec![
            record("pay", TestStatus::Failed, 0),
            record("pay", TestStatus::Passed, 1),
            record("refund", TestStatus::Failed, 0),
            record("browse", TestStatus::Skipped, 0),
        ];
        let report = SuiteReport::from_records(records, 1234);

        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.flaky, vec!["pay".to_string()]);
        assert_eq!(report.status, TestStatus::Failed);

        let dir = TempDir::new().unwrap();
        let path = report.write_results(dir.path()).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["results"][0]["status"], "passed");
        assert_eq!(value["results"][0]["flaky"], true);
    }
}
