//! Deterministic-first action policy with AI fallback
//!
//! Every UI action goes through [`AiSession::perform`]: check the
//! precondition gate, try the deterministic primitive, hand the description
//! to the AI tier if that did not work, then write exactly one progress entry.
//! Primitive errors never cross this boundary; they become `false`.

use tracing::{debug, info, warn};

use sightline_common::{GateMismatch, LoadState, Precondition, WaitState};

use crate::agent::fallback_instructions;
use crate::context::AiSession;
use crate::error::{E2eError, E2eResult};

/// Pixel offset used when a drag has neither a target nor an explicit offset.
pub const DEFAULT_DRAG_OFFSET: f64 = 10.0;

/// Where a drag ends.
#[derive(Debug, Clone, PartialEq)]
pub enum DragTarget {
    Selector(String),
    Offset { x: f64, y: f64 },
    Default,
}

/// A deterministic driver operation, bound to its target.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Click(String),
    DoubleClick(String),
    Hover(String),
    Fill { selector: String, value: String },
    Drag { source: String, target: DragTarget },
    /// Mouse wheel, optionally over an element first.
    Wheel { selector: Option<String>, dx: f64, dy: f64 },
    ScrollIntoView(String),
    /// Key chord, optionally sent to an element that is clicked or focused first.
    Press {
        selector: Option<String>,
        keys: String,
        focus_first: bool,
    },
}

/// How a gated action should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateOutcome {
    Open,
    /// Skip everything and report success
    Skip,
    /// Skip the primitive, go straight to the AI tier
    AiOnly,
}

pub(crate) fn evaluate_gate(precondition: Option<&Precondition>, policy: GateMismatch) -> GateOutcome {
    match precondition {
        Some(p) if !p.holds() => match policy {
            GateMismatch::Skip => GateOutcome::Skip,
            GateMismatch::AiFallback => GateOutcome::AiOnly,
        },
        _ => GateOutcome::Open,
    }
}

impl AiSession {
    /// Run one primitive. The first element is always waited on for visibility.
    pub(crate) async fn execute_primitive(&self, primitive: &Primitive) -> E2eResult<()> {
        let driver = self.driver();
        let visible = self.config.visibility_timeout();

        match primitive {
            Primitive::Click(selector) => {
                driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                driver.click(selector).await
            }
            Primitive::DoubleClick(selector) => {
                driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                driver.double_click(selector).await
            }
            Primitive::Hover(selector) => {
                driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                driver.hover(selector).await
            }
            Primitive::Fill { selector, value } => {
                driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                driver.fill(selector, value).await
            }
            Primitive::Drag { source, target } => {
                driver.wait_for_selector(source, WaitState::Visible, visible).await?;
                let (dx, dy) = match target {
                    DragTarget::Selector(target) => {
                        driver.wait_for_selector(target, WaitState::Visible, visible).await?;
                        return driver.drag_to(source, target).await;
                    }
                    DragTarget::Offset { x, y } => (*x, *y),
                    DragTarget::Default => (DEFAULT_DRAG_OFFSET, DEFAULT_DRAG_OFFSET),
                };
                let bbox = driver
                    .bounding_box(source)
                    .await?
                    .ok_or_else(|| E2eError::Driver(format!("{} has no bounding box", source)))?;
                let (x, y) = bbox.center();
                driver.mouse_move(x, y).await?;
                driver.mouse_down().await?;
                driver.mouse_move(x + dx, y + dy).await?;
                driver.mouse_up().await
            }
            Primitive::Wheel { selector, dx, dy } => {
                if let Some(selector) = selector {
                    driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                    driver.hover(selector).await?;
                }
                driver.mouse_wheel(*dx, *dy).await
            }
            Primitive::ScrollIntoView(selector) => {
                driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                driver.scroll_into_view(selector).await
            }
            Primitive::Press {
                selector,
                keys,
                focus_first,
            } => {
                if let Some(selector) = selector {
                    driver.wait_for_selector(selector, WaitState::Visible, visible).await?;
                    if *focus_first && driver.click(selector).await.is_err() {
                        driver.focus(selector).await?;
                    }
                }
                driver.press_keys(keys).await
            }
        }
    }

    /// Perform `description` through `primitive` when one is available,
    /// falling back to the AI tier with `ai_description`.
    ///
    /// Writes one progress step carrying `description` and the outcome.
    pub async fn perform(
        &self,
        description: &str,
        ai_description: &str,
        primitive: Option<Primitive>,
        precondition: Option<&Precondition>,
    ) -> bool {
        let success = match evaluate_gate(precondition, self.config.gate_mismatch) {
            GateOutcome::Skip => {
                info!(description, "Precondition not met, skipping action");
                true
            }
            GateOutcome::AiOnly => {
                info!(description, "Precondition not met, delegating to AI");
                self.act_with_ai(ai_description).await
            }
            GateOutcome::Open => {
                let direct = match &primitive {
                    Some(p) => match self.execute_primitive(p).await {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(description, "Primitive failed, falling back to AI: {}", e);
                            false
                        }
                    },
                    None => false,
                };
                direct || self.act_with_ai(ai_description).await
            }
        };

        self.progress.add_step(description, success);
        success
    }

    /// AI tier: agent delegation when configured, otherwise an observe probe.
    /// Never fails; every error is a `false`.
    pub(crate) async fn act_with_ai(&self, description: &str) -> bool {
        self.wait_for_page(LoadState::DomContentLoaded, self.config.act_ready_timeout())
            .await;

        let result = match &self.agent {
            Some(agent) => {
                let instructions = fallback_instructions(&self.progress.progress_string());
                agent
                    .execute(&instructions, description)
                    .await
                    .map(|outcome| {
                        if let Some(message) = &outcome.message {
                            debug!(description, "Agent reported: {}", message);
                        }
                        outcome.success
                    })
            }
            None => self
                .driver
                .observe(description)
                .await
                .map(|observations| !observations.is_empty()),
        };

        match result {
            Ok(success) => {
                info!(description, success, "AI action finished");
                success
            }
            Err(e) => {
                warn!(description, "AI action failed: {}", e);
                false
            }
        }
    }

    /// Delegate a described action to the AI tier directly. Records one
    /// `Action: <description>` step on success.
    pub async fn ai_act(&self, description: &str) -> bool {
        let success = self.act_with_ai(description).await;
        if success {
            self.progress.add_step(&format!("Action: {}", description), true);
        }
        success
    }
}
