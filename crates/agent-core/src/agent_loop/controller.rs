//! Per-objective loop: observe, auto-recover, auto-scroll, decide, act,
//! verify. One invocation drives a single objective to completion or to a
//! pause that the orchestrator surfaces to the user.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use webpilot_core_types::{PauseKind, Phase, Region};
use webpilot_page_scanner::{PageOps, PageResult, RegionScanner};

use crate::action::{Action, Decision, ScrollDirection};
use crate::agent_loop::config::AgentLoopConfig;
use crate::agent_loop::types::{
    LoopState, ObjectiveContext, ObjectiveOutcome, StepCounter, StepSink,
};
use crate::decider::{Decider, DeciderInput};
use crate::exec::execute_action;
use crate::guardrails::GuardrailGate;
use crate::history::{HistoryStore, HISTORY_WINDOW};
use crate::outcome::{ActionOutcome, StateSnapshot};
use crate::prompt::PAGE_TEXT_CHARS;
use crate::verify;
use crate::visibility::VisibilityChecker;

/// Labels that auto-recovery treats as a submit affordance.
const SUBMIT_KEYWORDS: &[&str] = &["search", "submit", "go", "find", "apply"];

pub struct AgentLoop {
    page: Arc<dyn PageOps>,
    scanner: Arc<RegionScanner>,
    decider: Arc<Decider>,
    visibility: VisibilityChecker,
    gate: GuardrailGate,
    history: Arc<dyn HistoryStore>,
    sink: Arc<dyn StepSink>,
    config: AgentLoopConfig,
    steps: StepCounter,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: Arc<dyn PageOps>,
        scanner: Arc<RegionScanner>,
        decider: Arc<Decider>,
        visibility: VisibilityChecker,
        gate: GuardrailGate,
        history: Arc<dyn HistoryStore>,
        sink: Arc<dyn StepSink>,
        config: AgentLoopConfig,
        steps: StepCounter,
    ) -> Self {
        Self {
            page,
            scanner,
            decider,
            visibility,
            gate,
            history,
            sink,
            config,
            steps,
        }
    }

    /// Drive one objective. `state` persists across pause/resume; pass a
    /// fresh `LoopState` for a new objective.
    pub async fn run(&self, ctx: &ObjectiveContext, state: &mut LoopState) -> ObjectiveOutcome {
        loop {
            if state.steps_this_objective >= self.config.max_steps {
                return ObjectiveOutcome::failed("max steps");
            }
            state.steps_this_objective += 1;
            let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;

            // 1. URL change resets scroll bookkeeping and the recovery ladder.
            let url = self.page.current_url().await.unwrap_or_default();
            if url != state.scroll.last_url {
                state.scroll.reset_for(&url);
                state.recovery_tries = 0;
                state.fill_stalled = false;
            }

            // 2. OBSERVE
            let regions = match self.scanner.scan(false).await {
                Ok(regions) => regions,
                Err(err) => {
                    self.sink
                        .phase_log(Phase::Observe, step, "region scan failed", Some(&err.to_string()))
                        .await;
                    Vec::new()
                }
            };
            let page_text = self
                .page
                .visible_text(PAGE_TEXT_CHARS)
                .await
                .unwrap_or_default();
            self.sink
                .phase_log(
                    Phase::Observe,
                    step,
                    &format!(
                        "{} regions at {} ({} chars of text)",
                        regions.len(),
                        url,
                        page_text.len()
                    ),
                    None,
                )
                .await;

            // 3. Auto-recovery: a fill that changed nothing gets an Enter,
            // then a submit click, then a pause. Never a silent re-fill.
            // `fill_stalled` is its own flag: after the first injection
            // `last_action` is the recovery gesture, not the fill, so the
            // ladder must not be re-derived from it.
            if state.fill_stalled {
                match self.auto_recover(step, state, &regions).await {
                    RecoveryResult::Injected => continue,
                    RecoveryResult::GiveUp => {
                        state.fill_stalled = false;
                        state.recovery_tries = 0;
                        let message =
                            "Typing did not submit the form. Please submit it manually and resume."
                                .to_string();
                        return ObjectiveOutcome::paused(
                            PauseKind::AskUser,
                            Action::AskUser {
                                message: message.clone(),
                                action_id: None,
                            },
                            message,
                        );
                    }
                }
            }

            // 4. Auto-scroll: spend a cheap visibility call before a full
            // decision, scroll when the target is plausibly below the fold.
            if !state.scroll.content_visible
                && !state.scroll.bottom_reached
                && state.scroll.count < self.config.scroll_cap
            {
                let objective = format!("{}: {}", ctx.step_title, ctx.step_description);
                if self
                    .visibility
                    .visible(&objective, &page_text, &regions)
                    .await
                {
                    state.scroll.content_visible = true;
                } else if self.auto_scroll(step, state).await {
                    continue;
                }
            }

            // 5. DECIDE
            let history = self.history.recent(&ctx.session, HISTORY_WINDOW).await;
            let decision = self
                .decider
                .decide(
                    &ctx.task,
                    DeciderInput {
                        context_prompt: &ctx.context_prompt,
                        step_title: &ctx.step_title,
                        step_description: &ctx.step_description,
                        url: &url,
                        page_text: &page_text,
                        regions: &regions,
                        history: &history,
                        last_action: state.last_action.as_ref(),
                        last_outcome: state.last_outcome.as_ref(),
                        scroll_status: &state.scroll.status_line(),
                        feedback: None,
                    },
                )
                .await;
            self.sink
                .phase_log(
                    Phase::Decide,
                    step,
                    &format!(
                        "{} (confidence {:.2}): {}",
                        decision.action.kind(),
                        decision.confidence,
                        decision.reasoning
                    ),
                    None,
                )
                .await;

            match &decision.action {
                Action::Done { reason } => {
                    return ObjectiveOutcome::completed(
                        reason.clone().unwrap_or_else(|| "objective done".to_string()),
                    );
                }
                Action::AskUser { message, .. } => {
                    return ObjectiveOutcome::paused(
                        PauseKind::AskUser,
                        decision.action.clone(),
                        message.clone(),
                    );
                }
                Action::Confirm { message, .. } => {
                    return ObjectiveOutcome::paused(
                        PauseKind::Confirm,
                        decision.action.clone(),
                        message.clone(),
                    );
                }
                _ => {}
            }

            // 6. Guardrail gate.
            let verdict = self.gate.check(&decision.action, &regions);
            if !verdict.allowed {
                let reason = verdict.reason.unwrap_or_else(|| "guardrail".to_string());
                if verdict.requires_confirmation {
                    return ObjectiveOutcome::paused(
                        PauseKind::Confirm,
                        decision.action.clone(),
                        reason,
                    );
                }
                self.sink
                    .phase_log(Phase::Decide, step, "action denied by guardrail", Some(&reason))
                    .await;
                continue;
            }

            // 7. ACT + 8. VERIFY
            let outcome = self.act_and_verify(step, &decision, &regions, state).await;
            if decision.action.is_fill() && !outcome.state_changed {
                state.fill_stalled = true;
                state.recovery_tries = 0;
            } else if outcome.state_changed {
                state.fill_stalled = false;
            }
            state.last_action = Some(decision.action.clone());
            state.last_outcome = Some(outcome.clone());
            self.sink.action_step(step, &decision, &outcome).await;
        }
    }

    /// Execute one action with before/after capture. Exceptions are
    /// absorbed into the outcome; a destroyed context during verify is the
    /// normal signature of a navigating click.
    async fn act_and_verify(
        &self,
        step: u64,
        decision: &Decision,
        regions: &[Region],
        state: &mut LoopState,
    ) -> ActionOutcome {
        let before = match self.capture_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "pre-action snapshot failed");
                StateSnapshot::default()
            }
        };

        if decision.action.is_fill() {
            state.last_fill_label = decision
                .action
                .target_region()
                .and_then(|id| regions.iter().find(|r| r.id == id))
                .map(|region| region.label.clone());
        }

        let exec_result = execute_action(&self.page, &self.scanner, &decision.action).await;
        if let Err(err) = exec_result {
            self.sink
                .phase_log(Phase::Act, step, decision.action.kind(), Some(&err.to_string()))
                .await;
            return ActionOutcome::failed(before, err.to_string());
        }
        self.sink
            .phase_log(Phase::Act, step, decision.action.kind(), None)
            .await;

        let _ = self
            .page
            .wait_for_network_idle(self.config.settle_cap_ms)
            .await;

        let message = verify::verify(&self.page, &decision.action).await;
        self.sink.phase_log(Phase::Verify, step, &message, None).await;

        match self.capture_snapshot().await {
            Ok(after) => ActionOutcome::from_snapshots(before, after),
            Err(err) => {
                // Navigation destroyed the context between act and verify.
                debug!(%err, "post-action snapshot unavailable");
                ActionOutcome {
                    after: before.clone(),
                    before,
                    state_changed: true,
                    error: Some("post-state unavailable; navigation in progress".to_string()),
                }
            }
        }
    }

    /// The escalating recovery ladder after a no-op fill.
    async fn auto_recover(
        &self,
        step: u64,
        state: &mut LoopState,
        regions: &[Region],
    ) -> RecoveryResult {
        let injected = match state.recovery_tries {
            0 => {
                // The rescan rewrote identities, so re-find the filled field
                // by label before pressing Enter on it.
                let target = state.last_fill_label.as_deref().and_then(|label| {
                    regions.iter().find(|region| region.label == label)
                });
                match target {
                    Some(region) => Action::KeyPress {
                        key: "Enter".to_string(),
                        region_id: Some(region.id.clone()),
                        description: Some("auto-recovery: submit the filled field".to_string()),
                    },
                    None => Action::KeyPress {
                        key: "Enter".to_string(),
                        region_id: None,
                        description: Some("auto-recovery: page-level Enter".to_string()),
                    },
                }
            }
            1 => match find_submit_region(regions) {
                Some(region) => Action::DomClick {
                    region_id: Some(region.id.clone()),
                    role: None,
                    name: None,
                    selector: None,
                    description: Some(format!(
                        "auto-recovery: click \"{}\"",
                        region.label
                    )),
                },
                None => Action::KeyPress {
                    key: "Enter".to_string(),
                    region_id: None,
                    description: Some("auto-recovery: page-level Enter".to_string()),
                },
            },
            _ => return RecoveryResult::GiveUp,
        };

        self.sink
            .phase_log(
                Phase::Act,
                step,
                &format!("auto-recovery attempt {}: {}", state.recovery_tries + 1, injected.kind()),
                None,
            )
            .await;

        let decision = Decision::new(
            injected,
            "fill produced no state change; injecting a submit gesture",
            0.5,
        );
        let outcome = self.act_and_verify(step, &decision, regions, state).await;
        if outcome.state_changed {
            state.recovery_tries = 0;
            state.fill_stalled = false;
        } else {
            state.recovery_tries += 1;
        }
        state.last_action = Some(decision.action.clone());
        state.last_outcome = Some(outcome.clone());
        self.sink.action_step(step, &decision, &outcome).await;
        RecoveryResult::Injected
    }

    /// One auto-scroll attempt. Returns true when the loop should
    /// re-iterate (a scroll happened); false means bottom was detected and
    /// the decision stage should run now.
    async fn auto_scroll(&self, step: u64, state: &mut LoopState) -> bool {
        let Ok(geometry) = self.page.scroll_geometry().await else {
            return false;
        };
        let scrollable = geometry.scroll_height > geometry.viewport_height + 10.0;
        if let Some(previous) = state.scroll.last_geometry {
            let unchanged = (geometry.scroll_y - previous.scroll_y).abs() < 1.0
                && (geometry.scroll_height - previous.scroll_height).abs() < 1.0;
            let no_new_content =
                (geometry.scroll_height - previous.scroll_height).abs() < 1.0;
            // A page that cannot scroll at all never reaches "bottom" this
            // way; it only stops when the scroll cap runs out.
            if scrollable && (unchanged || (geometry.at_bottom() && no_new_content)) {
                state.scroll.bottom_reached = true;
                self.sink
                    .phase_log(Phase::Observe, step, "page bottom reached", None)
                    .await;
                return false;
            }
        }

        let decision = Decision::new(
            Action::Scroll {
                direction: ScrollDirection::Down,
                amount: Some(self.config.scroll_step_px),
            },
            "target content not visible yet; scrolling before spending a decision",
            0.5,
        );
        let before = self.capture_snapshot().await.unwrap_or_default();
        if let Err(err) = self
            .page
            .scroll_by(0.0, self.config.scroll_step_px)
            .await
        {
            warn!(%err, "auto-scroll failed");
            return false;
        }
        let _ = self
            .page
            .wait_for_network_idle(self.config.settle_cap_ms)
            .await;
        let after = self.capture_snapshot().await.unwrap_or_default();
        let outcome = ActionOutcome::from_snapshots(before, after);

        state.scroll.count += 1;
        state.scroll.last_geometry = self.page.scroll_geometry().await.ok();
        state.last_action = Some(decision.action.clone());
        state.last_outcome = Some(outcome.clone());
        self.sink.action_step(step, &decision, &outcome).await;
        true
    }

    async fn capture_snapshot(&self) -> PageResult<StateSnapshot> {
        let url = self.page.current_url().await?;
        let title = self.page.title().await.unwrap_or_default();
        let text = self
            .page
            .visible_text(self.config.snapshot_text_chars)
            .await
            .unwrap_or_default();
        Ok(StateSnapshot::new(url, title, &text))
    }
}

enum RecoveryResult {
    Injected,
    GiveUp,
}

/// Button-like region whose label carries a submit keyword. Inputs are
/// excluded on purpose: the stalled fill target itself often matches.
fn find_submit_region<'a>(regions: &'a [Region]) -> Option<&'a Region> {
    use webpilot_core_types::RegionRole;
    regions.iter().find(|region| {
        if !matches!(region.role, RegionRole::Button | RegionRole::Other) {
            return false;
        }
        let label = region.label.to_lowercase();
        SUBMIT_KEYWORDS
            .iter()
            .any(|keyword| label.split_whitespace().any(|word| word == *keyword))
    })
}
