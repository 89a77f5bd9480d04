//! State carried by one objective run, and the port the loop reports
//! progress through.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use webpilot_core_types::{PauseKind, Phase, SessionId};
use webpilot_page_scanner::ScrollGeometry;

use crate::action::{Action, Decision};
use crate::outcome::ActionOutcome;

/// Session-wide monotonically increasing step counter, shared between
/// objectives so artifact names never collide.
pub type StepCounter = Arc<AtomicU64>;

/// What the orchestrator hands the loop for one objective.
#[derive(Clone, Debug)]
pub struct ObjectiveContext {
    pub session: SessionId,
    /// Original task text, verbatim.
    pub task: String,
    /// Fully composed context block (task, strategy, step, plan, notes).
    pub context_prompt: String,
    pub step_title: String,
    pub step_description: String,
}

/// Loop result: either the objective completed, or the session must pause.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectiveOutcome {
    pub completed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_kind: Option<PauseKind>,
}

impl ObjectiveOutcome {
    pub fn completed(reason: impl Into<String>) -> Self {
        Self {
            completed: true,
            reason: reason.into(),
            pending_action: None,
            pause_kind: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            completed: false,
            reason: reason.into(),
            pending_action: None,
            pause_kind: None,
        }
    }

    pub fn paused(kind: PauseKind, action: Action, reason: impl Into<String>) -> Self {
        Self {
            completed: false,
            reason: reason.into(),
            pending_action: Some(action),
            pause_kind: Some(kind),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_kind.is_some()
    }
}

/// Auto-scroll bookkeeping, reset whenever the URL changes.
#[derive(Clone, Debug, Default)]
pub struct ScrollState {
    pub count: u32,
    pub bottom_reached: bool,
    pub content_visible: bool,
    pub last_geometry: Option<ScrollGeometry>,
    pub last_url: String,
}

impl ScrollState {
    pub fn reset_for(&mut self, url: &str) {
        *self = Self {
            last_url: url.to_string(),
            ..Self::default()
        };
    }

    /// Line injected into decision prompts.
    pub fn status_line(&self) -> String {
        format!(
            "auto-scrolled {} time(s); content visible: {}; bottom reached: {}",
            self.count, self.content_visible, self.bottom_reached
        )
    }
}

/// State that survives pause/resume within one objective. A resume keeps
/// the counters; a fresh objective starts from default.
#[derive(Debug, Default)]
pub struct LoopState {
    pub steps_this_objective: u32,
    pub scroll: ScrollState,
    pub last_action: Option<Action>,
    pub last_outcome: Option<ActionOutcome>,
    /// A fill ran and nothing observable changed. Stays set while the
    /// recovery ladder escalates, since `last_action` becomes the injected
    /// recovery gesture and can no longer witness the original stall.
    pub fill_stalled: bool,
    /// Escalation counter for the fill auto-recovery ladder.
    pub recovery_tries: u32,
    /// Label of the most recently filled region, so recovery can re-find it
    /// after a rescan rewrote every identity.
    pub last_fill_label: Option<String>,
}

/// Where the loop reports progress: phase logs for every stage, and a
/// full record (with screenshot) after each executed action.
#[async_trait]
pub trait StepSink: Send + Sync {
    async fn phase_log(&self, phase: Phase, step: u64, message: &str, error: Option<&str>);

    /// Called after ACT+VERIFY with the decision that drove the action and
    /// the captured outcome. Implementations persist the step and push a
    /// screenshot to the client.
    async fn action_step(&self, step: u64, decision: &Decision, outcome: &ActionOutcome);
}

/// Sink that drops everything (tests).
pub struct NullSink;

#[async_trait]
impl StepSink for NullSink {
    async fn phase_log(&self, _phase: Phase, _step: u64, _message: &str, _error: Option<&str>) {}
    async fn action_step(&self, _step: u64, _decision: &Decision, _outcome: &ActionOutcome) {}
}
