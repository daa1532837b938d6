//! Scenario runner: drives YAML scenarios through an [`AiSession`]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use sightline_common::{ActionRequest, AiConfig, ProgressLog, TestProgressTracker};

use crate::actions::pass_test_early;
use crate::agent::AgentCapability;
use crate::context::AiSession;
use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};
use crate::report::{Annotation, Artifacts, SuiteReport, TestRecord, TestStatus};
use crate::spec::{drag_target, interpolate, Scenario, ScenarioStep, When};
use crate::vision::VisionClient;

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Engine settings shared by every session
    pub ai: AiConfig,

    /// Directory scenarios are loaded from
    pub scenarios_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Reported as the project of every record
    pub project_name: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            scenarios_dir: PathBuf::from("tests/scenarios"),
            output_dir: PathBuf::from("test-results"),
            project_name: None,
        }
    }
}

/// Runs scenarios one attempt at a time against a single browser page.
pub struct ScenarioRunner {
    driver: Arc<dyn BrowserDriver>,
    vision: Arc<dyn VisionClient>,
    agent: Option<Arc<dyn AgentCapability>>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        vision: Arc<dyn VisionClient>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            driver,
            vision,
            agent: None,
            config,
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentCapability>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Run every scenario in the configured directory
    pub async fn run_all(&self) -> E2eResult<SuiteReport> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteReport> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&filtered).await)
    }

    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> SuiteReport {
        let start = Instant::now();
        let mut records = Vec::new();

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            records.extend(self.run_scenario(scenario).await);
        }

        let report = SuiteReport::from_records(records, start.elapsed().as_millis() as u64);
        info!(
            "Results: {} passed, {} failed, {} skipped, {} flaky ({} ms)",
            report.passed,
            report.failed,
            report.skipped,
            report.flaky.len(),
            report.duration_ms
        );
        report
    }

    /// Run a scenario, retrying failed attempts. Returns one record per attempt.
    pub async fn run_scenario(&self, scenario: &Scenario) -> Vec<TestRecord> {
        let mut records = Vec::new();

        for retry in 0..=scenario.retries {
            let record = self.run_attempt(scenario, retry).await;
            let passed = record.status == TestStatus::Passed;

            if passed {
                info!("✓ {} ({} ms)", record.title, record.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    record.title,
                    record.error.as_deref().unwrap_or("unknown error")
                );
            }
            records.push(record);

            if passed {
                break;
            }
            if retry < scenario.retries {
                warn!(scenario = %scenario.name, retry = retry + 1, "Retrying scenario");
            }
        }

        records
    }

    fn session(&self, tracker: Arc<TestProgressTracker>) -> AiSession {
        let session = AiSession::new(
            self.driver.clone(),
            self.vision.clone(),
            tracker,
            self.config.ai.clone(),
        );
        match &self.agent {
            Some(agent) => session.with_agent(agent.clone()),
            None => session,
        }
    }

    async fn run_attempt(&self, scenario: &Scenario, retry: u32) -> TestRecord {
        let start = Instant::now();
        let tracker = Arc::new(TestProgressTracker::new("").with_file_path(&scenario.file));
        if !scenario.guide.is_empty() {
            tracker.set_test_case_guide(scenario.guide.as_str());
        }
        if !scenario.login_notes.is_empty() {
            tracker.set_login_notes(scenario.login_notes.as_str());
        }
        let session = self.session(tracker.clone());

        debug!(scenario = %scenario.name, test_id = %tracker.test_id(), retry, "Starting attempt");

        let mut vars = scenario.variables.clone();
        let mut outcome = Ok(());
        for (i, step) in scenario.steps.iter().enumerate() {
            debug!(step = i + 1, kind = step.kind(), "Executing step");
            outcome = execute_step(&session, step, &mut vars).await;
            if outcome.is_err() {
                break;
            }
        }

        let mut annotations = Vec::new();
        let (status, error) = match outcome {
            Ok(()) => (TestStatus::Passed, None),
            Err(E2eError::PassTestEarly(message)) => {
                info!(scenario = %scenario.name, "Passed early: {}", message);
                annotations.push(Annotation::new("pass_test_early", message));
                (TestStatus::Passed, None)
            }
            Err(e @ E2eError::AiTimeout { .. }) => (TestStatus::TimedOut, Some(e.to_string())),
            Err(e) => (TestStatus::Failed, Some(e.to_string())),
        };

        let screenshots = tracker
            .attachments()
            .into_iter()
            .map(|a| a.path.display().to_string())
            .collect();

        TestRecord {
            title: scenario.name.clone(),
            file: scenario.file.clone(),
            project_name: self.config.project_name.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            retry,
            error,
            artifacts: Artifacts {
                screenshots,
                ..Default::default()
            },
            annotations,
            steps: Some(tracker.export_steps()),
            flaky: false,
        }
    }

    /// Write the report to the configured output directory
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        report.write_results(&self.config.output_dir)
    }
}

fn request(
    description: &str,
    selector: &Option<String>,
    when: &Option<When>,
    vars: &BTreeMap<String, String>,
) -> ActionRequest {
    ActionRequest {
        description: interpolate(description, vars),
        selector: selector.as_deref().map(|s| interpolate(s, vars)),
        precondition: when.as_ref().map(|w| w.resolve(vars)),
    }
}

/// Execute one step. Action outcomes are recorded in the progress log and
/// never fail the scenario; strict assertions and fatal engine errors do.
pub async fn execute_step(
    session: &AiSession,
    step: &ScenarioStep,
    vars: &mut BTreeMap<String, String>,
) -> E2eResult<()> {
    match step {
        ScenarioStep::Navigate { url, description } => {
            let description = description.as_deref().map(|d| interpolate(d, vars));
            session
                .navigate_action(&interpolate(url, vars), description.as_deref())
                .await;
        }
        ScenarioStep::Refresh { description } => {
            let description = description.as_deref().map(|d| interpolate(d, vars));
            session.refresh_action(description.as_deref()).await?;
        }
        ScenarioStep::Click { description, selector, when } => {
            session
                .click_action(&request(description, selector, when, vars))
                .await;
        }
        ScenarioStep::DoubleClick { description, selector, when } => {
            session
                .double_click_action(&request(description, selector, when, vars))
                .await;
        }
        ScenarioStep::Hover { description, selector, when } => {
            session
                .hover_action(&request(description, selector, when, vars))
                .await;
        }
        ScenarioStep::Fill { description, value, selector, when } => {
            session
                .fill_action(&request(description, selector, when, vars), &interpolate(value, vars))
                .await;
        }
        ScenarioStep::Drag { description, selector, target, offset, when } => {
            let target = target.as_deref().map(|t| interpolate(t, vars));
            session
                .drag_action(
                    &request(description, selector, when, vars),
                    drag_target(target.as_deref(), *offset),
                )
                .await;
        }
        ScenarioStep::Scroll { description, selector, scroll, when } => {
            session
                .scroll_action(&request(description, selector, when, vars), scroll)
                .await;
        }
        ScenarioStep::Press { description, keys, selector, focus_first, when } => {
            session
                .keypress_action(&request(description, selector, when, vars), keys, *focus_first)
                .await;
        }
        ScenarioStep::Cookie { cookies, description, when } => {
            let cookies: Vec<_> = cookies
                .iter()
                .map(|c| {
                    let mut c = c.clone();
                    c.value = interpolate(&c.value, vars);
                    c
                })
                .collect();
            let description = description.as_deref().map(|d| interpolate(d, vars));
            let precondition = when.as_ref().map(|w| w.resolve(vars));
            session
                .cookie_action(&cookies, description.as_deref(), precondition.as_ref())
                .await;
        }
        ScenarioStep::Upload { description, files, selector } => {
            let selector = selector.as_deref().map(|s| interpolate(s, vars));
            session
                .upload_file_action(&interpolate(description, vars), files, selector.as_deref())
                .await;
        }
        ScenarioStep::Extract { variable, guide } => {
            let value = session
                .extract_action(variable, &interpolate(guide, vars))
                .await?;
            vars.insert(variable.clone(), value);
        }
        ScenarioStep::Assert { condition } => {
            session.assert_action(&interpolate(condition, vars)).await?;
        }
        ScenarioStep::Check { condition } => {
            let condition = interpolate(condition, vars);
            let result = session.ai_assert(&condition).await?;
            info!(condition = %condition, result, "Checked condition");
        }
        ScenarioStep::WaitUntil { condition } => {
            session.wait_until(&interpolate(condition, vars)).await;
        }
        ScenarioStep::PassEarly { message } => {
            return Err(pass_test_early(message.as_deref()));
        }
    }
    Ok(())
}
