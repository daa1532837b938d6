//! Retry/timeout orchestration for AI assertions and extraction
//!
//! Each logical call runs as an explicit loop:
//!
//! ```text
//! Init -> Capturing -> AwaitingModel -> Classifying -> Resolved(bool)
//!             ^                                    |
//!             +--- RetryWait / RetryMajorFail -----+
//!             +--- RetryTimeout <-- (deadline) ----+
//! ```
//!
//! [`AttemptState`] holds the counters and decides every transition, so the
//! policy can be exercised without a browser or a model.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sightline_common::{Attachment, Decision, LoadState, RetryPolicy};

use crate::classifier::{classify_decision, classify_extraction, Extraction};
use crate::context::AiSession;
use crate::error::{E2eError, E2eResult};
use crate::screenshot::{Screenshot, ScreenshotCapture};
use crate::vision::{ChatMessage, CompletionRequest};

/// Why another capture-and-ask cycle is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Wait,
    MajorFail,
    Timeout,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::Wait => write!(f, "wait"),
            RetryReason::MajorFail => write!(f, "major-fail"),
            RetryReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// What happened during one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    Decided(Decision),
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Terminal boolean verdict.
    Resolve(bool),
    /// Discard the screenshot, back off, try again.
    Retry { reason: RetryReason, delay: Duration },
    /// The budget for `reason` is spent.
    Exhausted(RetryReason),
}

/// Caps and backoffs for one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLimits {
    pub wait_cap: u32,
    pub wait_backoff: Duration,
    pub major_fail_cap: u32,
    pub major_fail_backoff: Duration,
    pub timeout_cap: u32,
    pub timeout_backoff: Duration,
}

impl RetryLimits {
    pub fn for_assertions(policy: &RetryPolicy) -> Self {
        Self {
            wait_cap: policy.wait_retries,
            wait_backoff: Duration::from_millis(policy.wait_backoff_ms),
            major_fail_cap: policy.major_fail_retries,
            major_fail_backoff: Duration::from_millis(policy.major_fail_backoff_ms),
            timeout_cap: policy.timeout_retries,
            timeout_backoff: Duration::from_millis(policy.timeout_backoff_ms),
        }
    }

    /// Extraction has no major-fail category.
    pub fn for_extraction(policy: &RetryPolicy) -> Self {
        Self {
            wait_cap: policy.extract_wait_retries,
            wait_backoff: Duration::from_millis(policy.extract_wait_backoff_ms),
            major_fail_cap: 0,
            major_fail_backoff: Duration::ZERO,
            timeout_cap: policy.timeout_retries,
            timeout_backoff: Duration::from_millis(policy.timeout_backoff_ms),
        }
    }
}

/// Counters for one logical call chain. Both only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Outcome-driven retries so far (wait and major-fail share it)
    pub attempt: u32,
    /// Network-timeout retries so far
    pub timeout_retry: u32,
}

impl AttemptState {
    /// Backoff before retrying for `reason`, or `None` once its cap is reached.
    pub fn retry_after(&self, reason: RetryReason, limits: &RetryLimits) -> Option<Duration> {
        let (used, cap, delay) = match reason {
            RetryReason::Wait => (self.attempt, limits.wait_cap, limits.wait_backoff),
            RetryReason::MajorFail => {
                (self.attempt, limits.major_fail_cap, limits.major_fail_backoff)
            }
            RetryReason::Timeout => {
                (self.timeout_retry, limits.timeout_cap, limits.timeout_backoff)
            }
        };
        (used < cap).then_some(delay)
    }

    pub fn next(&self, event: AttemptEvent, limits: &RetryLimits) -> Transition {
        let reason = match event {
            AttemptEvent::TimedOut => RetryReason::Timeout,
            AttemptEvent::Decided(decision) if !decision.is_retryable() => {
                return Transition::Resolve(decision.verdict())
            }
            AttemptEvent::Decided(Decision::Wait) => RetryReason::Wait,
            AttemptEvent::Decided(_) => RetryReason::MajorFail,
        };
        match self.retry_after(reason, limits) {
            Some(delay) => Transition::Retry { reason, delay },
            None => Transition::Exhausted(reason),
        }
    }

    pub fn advance(&mut self, reason: RetryReason) {
        match reason {
            RetryReason::Timeout => self.timeout_retry += 1,
            RetryReason::Wait | RetryReason::MajorFail => self.attempt += 1,
        }
    }

    /// Completion calls issued so far, counting the current one.
    pub fn calls(&self) -> u32 {
        self.attempt + self.timeout_retry + 1
    }
}

fn assertion_messages(prompt: &str, url: &str, progress: &str, png_base64: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You are a testing assistant that judges whether a condition holds on a webpage \
         screenshot.\n\n\
         Explain your judgement inside <reasoning>...</reasoning>, then give exactly one \
         decision inside <decision>...</decision>:\n\
         - pass: the condition is met\n\
         - major-fail: the condition is clearly not met\n\
         - minor-fail: the condition is met apart from cosmetic differences\n\
         - partial-fail: the condition is mostly met with small non-blocking gaps\n\
         - wait: the page is still loading and cannot be judged yet\n\n\
         Previous steps:\n{}",
        non_empty(progress)
    );
    let user = format!("Condition: {}\n\nCurrent page URL: {}", prompt, url);
    vec![ChatMessage::system(system), ChatMessage::user_with_image(user, png_base64)]
}

fn extraction_messages(
    variable: &str,
    guide: &str,
    url: &str,
    progress: &str,
    png_base64: &str,
) -> Vec<ChatMessage> {
    let system = format!(
        "You extract specific information from webpage screenshots.\n\n\
         - Analyze the screenshot and follow the extraction guide.\n\
         - Put your reasoning inside <reasoning>...</reasoning> and the value inside \
         <extracted_value>...</extracted_value>.\n\
         - If the page is still loading, answer with <wait/> instead.\n\n\
         Test Case Progress:\n{}",
        non_empty(progress)
    );
    let user = format!(
        "Variable to extract: \"{}\"\n\nExtraction Guide:\n{}\n\nCurrent page URL: {}",
        variable, guide, url
    );
    vec![ChatMessage::system(system), ChatMessage::user_with_image(user, png_base64)]
}

fn non_empty(text: &str) -> &str {
    if text.trim().is_empty() {
        "N/A"
    } else {
        text
    }
}

impl AiSession {
    /// Race the completion call against `limit`. `Ok(None)` means the
    /// deadline won and the request was cancelled.
    async fn race_completion(
        &self,
        request: CompletionRequest,
        limit: Duration,
    ) -> E2eResult<Option<String>> {
        let cancel = CancellationToken::new();
        let call = self.vision.complete(request, cancel.clone());

        tokio::select! {
            result = call => result.map(Some),
            _ = tokio::time::sleep(limit) => {
                cancel.cancel();
                Ok(None)
            }
        }
    }

    fn record_assertion(&self, prompt: &str, screenshot: &Screenshot, result: bool) {
        self.progress.add_ai_assertion(prompt, &screenshot.base64, result);
        if !self.config.skip_attach_screenshot {
            self.progress.attach(Attachment {
                name: format!("Screenshot for: {}", prompt),
                content_type: "image/png".to_string(),
                path: screenshot.path.clone(),
            });
        }
    }

    fn record_extraction(&self, variable: &str, value: String, screenshot: &Screenshot) -> String {
        self.progress
            .add_step(&format!("Extracted Variable '{}' as '{}'", variable, value), true);
        if !self.config.skip_attach_screenshot {
            self.progress.attach(Attachment {
                name: format!("Screenshot for extracting {}", variable),
                content_type: "image/png".to_string(),
                path: screenshot.path.clone(),
            });
        }
        value
    }

    /// Ask the vision model whether `prompt` holds on the current page.
    ///
    /// Retry budgets resolve to `Ok(false)`; only an exhausted timeout budget
    /// or a failing completion client produce `Err`.
    pub async fn ai_assert(&self, prompt: &str) -> E2eResult<bool> {
        self.ai_assert_with_timeout(prompt, self.config.page_ready_timeout())
            .await
    }

    /// [`Self::ai_assert`] with an explicit page-readiness timeout.
    pub async fn ai_assert_with_timeout(
        &self,
        prompt: &str,
        page_ready_timeout: Duration,
    ) -> E2eResult<bool> {
        self.run_assertion(prompt, page_ready_timeout, self.config.assert_request_timeout())
            .await
    }

    async fn run_assertion(
        &self,
        prompt: &str,
        page_ready_timeout: Duration,
        request_timeout: Duration,
    ) -> E2eResult<bool> {
        let limits = RetryLimits::for_assertions(&self.config.retry);
        let capture = ScreenshotCapture::new(self.driver(), &self.config.screenshot_dir);
        let mut state = AttemptState::default();

        loop {
            self.wait_for_page(LoadState::DomContentLoaded, page_ready_timeout)
                .await;
            tokio::time::sleep(self.config.settle_delay()).await;

            let screenshot = capture.capture("aiAssert").await?;
            let url = self.page_url().await;
            let request = CompletionRequest {
                model: self.config.model.deployment.clone(),
                messages: assertion_messages(
                    prompt,
                    &url,
                    &self.progress.progress_string(),
                    &screenshot.base64,
                ),
                temperature: None,
            };

            let event = match self.race_completion(request, request_timeout).await? {
                Some(response) => {
                    debug!(prompt, response = %response, "Assertion response");
                    let decision = classify_decision(&response);
                    if decision.is_soft_failure() {
                        warn!(prompt, ?decision, "Soft failure counted as pass");
                    }
                    AttemptEvent::Decided(decision)
                }
                None => AttemptEvent::TimedOut,
            };

            match state.next(event, &limits) {
                Transition::Resolve(result) => {
                    info!(prompt, result, calls = state.calls(), "AI assertion resolved");
                    self.record_assertion(prompt, &screenshot, result);
                    return Ok(result);
                }
                Transition::Retry { reason, delay } => {
                    info!(
                        prompt,
                        %reason,
                        attempt = state.attempt,
                        timeout_retry = state.timeout_retry,
                        "Retrying AI assertion in {:?}",
                        delay
                    );
                    screenshot.discard().await;
                    tokio::time::sleep(delay).await;
                    state.advance(reason);
                }
                Transition::Exhausted(RetryReason::Timeout) => {
                    screenshot.discard().await;
                    error!(prompt, "AI assertion timed out on every attempt");
                    return Err(E2eError::AiTimeout {
                        timeout_ms: request_timeout.as_millis() as u64,
                        attempts: state.timeout_retry + 1,
                    });
                }
                Transition::Exhausted(reason) => {
                    warn!(prompt, %reason, attempts = state.attempt + 1, "AI assertion retries exhausted");
                    self.record_assertion(prompt, &screenshot, false);
                    return Ok(false);
                }
            }
        }
    }

    /// Strict assertion: a false verdict becomes
    /// [`E2eError::AssertionFailed`] carrying the condition text.
    pub async fn expect_ai_assert(&self, prompt: &str) -> E2eResult<()> {
        if self.ai_assert(prompt).await? {
            info!("PASSED: {}", prompt);
            Ok(())
        } else {
            error!("FAILED: {}", prompt);
            Err(E2eError::AssertionFailed(format!(
                "AI assertion failed for: {}",
                prompt
            )))
        }
    }

    /// Strict assertion followed by a progress step for the condition.
    pub async fn assert_action(&self, prompt: &str) -> E2eResult<()> {
        self.expect_ai_assert(prompt).await?;
        self.progress.add_step(prompt, true);
        Ok(())
    }

    /// Read a named value off the current page, following `guide`.
    ///
    /// Fails when the page never stops loading, when no usable text comes
    /// back, or when every attempt times out.
    pub async fn ai_extract(&self, variable: &str, guide: &str) -> E2eResult<String> {
        let limits = RetryLimits::for_extraction(&self.config.retry);
        let request_timeout = self.config.extract_request_timeout();
        let page_load_timeout = self.config.extract_page_load_timeout();
        let capture = ScreenshotCapture::new(self.driver(), &self.config.screenshot_dir);
        let prefix = format!("aiExtract-{}", variable);
        let mut state = AttemptState::default();

        loop {
            self.wait_for_page(LoadState::DomContentLoaded, page_load_timeout)
                .await;
            self.wait_for_page(LoadState::NetworkIdle, page_load_timeout)
                .await;
            tokio::time::sleep(self.config.settle_delay()).await;

            let screenshot = capture.capture(&prefix).await?;
            let url = self.page_url().await;
            let request = CompletionRequest {
                model: self.config.model.deployment.clone(),
                messages: extraction_messages(
                    variable,
                    guide,
                    &url,
                    &self.progress.progress_string(),
                    &screenshot.base64,
                ),
                temperature: Some(0.0),
            };

            let reason = match self.race_completion(request, request_timeout).await? {
                Some(response) => match classify_extraction(&response) {
                    Extraction::Value(value) => {
                        info!(variable, value = %value, "Extracted value");
                        return Ok(self.record_extraction(variable, value, &screenshot));
                    }
                    Extraction::Untagged(value) => {
                        warn!(variable, "No extracted_value tag, using stripped response");
                        return Ok(self.record_extraction(variable, value, &screenshot));
                    }
                    Extraction::Empty => {
                        error!(variable, "Extraction response had no usable content");
                        return Err(E2eError::ExtractionUnparseable {
                            variable: variable.to_string(),
                            attempts: state.calls(),
                        });
                    }
                    Extraction::Wait => RetryReason::Wait,
                },
                None => RetryReason::Timeout,
            };

            screenshot.discard().await;
            match state.retry_after(reason, &limits) {
                Some(delay) => {
                    info!(
                        variable,
                        %reason,
                        attempt = state.attempt,
                        timeout_retry = state.timeout_retry,
                        "Retrying extraction in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    state.advance(reason);
                }
                None if reason == RetryReason::Timeout => {
                    error!(variable, "Extraction timed out on every attempt");
                    return Err(E2eError::AiTimeout {
                        timeout_ms: self.config.extract_request_timeout_ms,
                        attempts: state.timeout_retry + 1,
                    });
                }
                None => {
                    error!(variable, "Page still loading after every extraction attempt");
                    return Err(E2eError::ExtractionStalled {
                        variable: variable.to_string(),
                        attempts: state.attempt + 1,
                    });
                }
            }
        }
    }

    /// Extraction as a test step. The progress entry is written by
    /// [`Self::ai_extract`].
    pub async fn extract_action(&self, variable: &str, guide: &str) -> E2eResult<String> {
        self.ai_extract(variable, guide).await
    }

    /// Poll `condition` until it holds or the overall deadline passes. A
    /// failing poll counts as "not yet".
    pub async fn wait_until(&self, condition: &str) -> bool {
        let interval = self.config.retry.wait_until_interval();
        let deadline = self.config.retry.wait_until_deadline();
        let start = Instant::now();
        let mut met = false;

        while start.elapsed() < deadline {
            // Each poll may take as long as the whole wait.
            let poll = self.run_assertion(condition, self.config.page_ready_timeout(), deadline);
            met = match poll.await {
                Ok(result) => result,
                Err(e) => {
                    debug!(condition, "Poll failed, treating as not met: {}", e);
                    false
                }
            };
            if met {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        self.progress
            .add_step(&format!("Wait until condition met: {}", condition), met);
        met
    }
}
