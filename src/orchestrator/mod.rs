//! Session orchestrator: plans inbound tasks, walks the plan through the
//! agent loop, handles pause/resume/stop, and finishes research tasks with
//! a synthesis pass. Errors surface as status events and deliberately do
//! not close the browser, so the user can inspect what happened.

mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use webpilot_agent_core::notes::NOTES_PROMPT_CHARS;
use webpilot_agent_core::{
    domain_allowed, execute_action, step_likely_done, ActionOutcome, AgentLoop, AgentLoopConfig,
    Decider, Decision, GuardrailGate, HistoryStore, LlmClient, LoopState, ObjectiveContext,
    Planner, PlanStep, ScoutSearch, StepSink, Synthesizer, VisibilityChecker,
};
use webpilot_core_types::{PauseKind, Phase, SessionId, SessionStatus};
use webpilot_page_scanner::{PageOps, RegionScanner, WaitUntil};

use crate::browser::{BrowserFactory, BrowserHost};
use crate::channel::{ClientChannel, ClientMessage};
use crate::config::Config;
use crate::screenshots::ArtifactStore;
use crate::storage::{Storage, StepRecord};

pub use session::Session;

/// Visible-text budget captured as a research note after each objective.
const NOTE_CAPTURE_CHARS: usize = 2_000;
/// Notes shorter than this are noise, not findings.
const NOTE_MIN_CHARS: usize = 50;

pub struct SessionHandle {
    pub state: Mutex<Session>,
    pub browser: Arc<dyn BrowserHost>,
    pub decider: Arc<Decider>,
}

pub struct Orchestrator {
    config: Config,
    storage: Arc<Storage>,
    llm: Arc<dyn LlmClient>,
    scout: Arc<dyn ScoutSearch>,
    channel: ClientChannel,
    artifacts: Arc<ArtifactStore>,
    browser_factory: Arc<dyn BrowserFactory>,
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        storage: Arc<Storage>,
        llm: Arc<dyn LlmClient>,
        scout: Arc<dyn ScoutSearch>,
        channel: ClientChannel,
        artifacts: Arc<ArtifactStore>,
        browser_factory: Arc<dyn BrowserFactory>,
    ) -> Self {
        Self {
            config,
            storage,
            llm,
            scout,
            channel,
            artifacts,
            browser_factory,
            sessions: DashMap::new(),
        }
    }

    pub fn channel(&self) -> &ClientChannel {
        &self.channel
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Entry point for inbound client messages.
    pub async fn handle_message(&self, message: ClientMessage) {
        let result = match message {
            ClientMessage::Task { task, session_id } => self.start_task(task, session_id).await,
            ClientMessage::Stop { session_id } => self.stop(&session_id).await,
            ClientMessage::Confirmation {
                session_id,
                approved,
                ..
            } => self.confirmation(&session_id, approved).await,
        };
        if let Err(err) = result {
            warn!(%err, "orchestrator message handling failed");
            self.channel.error(err.to_string());
        }
    }

    async fn start_task(&self, task: String, session_id: Option<String>) -> Result<()> {
        if let Some(id) = session_id {
            if let Some(handle) = self.sessions.get(&id).map(|entry| Arc::clone(&entry)) {
                info!(session = %id, "re-entering existing session");
                return self.run_traversal(handle, false).await;
            }
        }

        let id = SessionId::new();
        self.channel.status(
            id.clone(),
            SessionStatus::Started,
            Some("planning the task".to_string()),
            None,
            None,
        );
        self.channel
            .log(0, Phase::Planning, format!("planning: {task}"), None);

        let planner = Planner::new(Arc::clone(&self.llm), Arc::clone(&self.scout));
        let plan = planner.plan(&task).await;
        self.channel.log(0, Phase::Planning, plan.summary(), None);

        self.storage
            .create_session(&id, &task, &self.config.start_url)
            .await
            .context("failed to persist session")?;

        let browser = self
            .browser_factory
            .launch()
            .await
            .context("browser launch failed")?;

        let page = browser
            .newest_surface()
            .await
            .context("no browser surface")?;
        self.channel.log(
            0,
            Phase::Navigate,
            format!("opening start page {}", self.config.start_url),
            None,
        );
        if let Err(err) = page.navigate(&self.config.start_url).await {
            warn!(%err, "start-page navigation failed");
        }
        let _ = page.wait_until(WaitUntil::Domcontentloaded, 3_000).await;

        let handle = Arc::new(SessionHandle {
            state: Mutex::new(Session::new(id.clone(), task, plan)),
            browser,
            decider: Arc::new(Decider::new(Arc::clone(&self.llm))),
        });
        self.sessions.insert(id.0.clone(), Arc::clone(&handle));

        self.storage
            .update_session_status(&id, SessionStatus::Running)
            .await
            .ok();
        self.channel
            .status(id, SessionStatus::Running, None, None, None);

        self.run_traversal(handle, false).await
    }

    /// Walk objectives until the plan ends, a pause is required, or an
    /// objective fails.
    async fn run_traversal(&self, handle: Arc<SessionHandle>, mut resume: bool) -> Result<()> {
        loop {
            let mut session = handle.state.lock().await;
            if session.finished() {
                self.finalize(&mut session).await;
                return Ok(());
            }
            let step = session
                .current_step()
                .expect("unfinished session has a current step")
                .clone();

            // Re-bind to the newest tab: a click that opened a fresh tab
            // must make that tab the active surface.
            let page = match handle.browser.newest_surface().await {
                Ok(page) => page,
                Err(err) => {
                    self.fail_session(&mut session, &format!("browser unavailable: {err}"))
                        .await;
                    return Ok(());
                }
            };

            if step.needs_auth {
                let message = format!(
                    "Manual step required: {} - {}. Approve once you have finished it.",
                    step.title, step.description
                );
                session.pause_for_human(step.title.clone());
                self.storage
                    .update_session_status(&session.id, SessionStatus::Paused)
                    .await
                    .ok();
                self.channel.status(
                    session.id.clone(),
                    SessionStatus::Paused,
                    Some(message),
                    None,
                    Some(PauseKind::AskUser),
                );
                return Ok(());
            }

            if let Some(url) = &step.target_url {
                let step_number = session.steps.load(std::sync::atomic::Ordering::SeqCst);
                if domain_allowed(url, &self.config.allowed_domains) {
                    self.channel.log(
                        step_number,
                        Phase::Navigate,
                        format!("pre-navigating to verified URL {url}"),
                        None,
                    );
                    if let Err(err) = page.navigate(url).await {
                        // The agent may still recover from wherever we are.
                        warn!(%err, %url, "pre-navigation failed");
                    }
                    let _ = page.wait_until(WaitUntil::Domcontentloaded, 3_000).await;
                } else {
                    self.channel.log(
                        step_number,
                        Phase::Navigate,
                        format!("skipping pre-navigation: {url} is outside the allowed domains"),
                        None,
                    );
                }
            }

            let ctx = ObjectiveContext {
                session: session.id.clone(),
                task: session.task().to_string(),
                context_prompt: objective_prompt(&session, &step),
                step_title: step.title.clone(),
                step_description: step.description.clone(),
            };

            if !resume {
                session.loop_state = LoopState::default();
                handle.decider.reset();
            }
            resume = false;

            let scanner = Arc::new(RegionScanner::new(Arc::clone(&page)));
            let sink: Arc<dyn StepSink> = Arc::new(OrchestratorSink {
                session_id: session.id.clone(),
                storage: Arc::clone(&self.storage),
                channel: self.channel.clone(),
                artifacts: Arc::clone(&self.artifacts),
                page: Arc::clone(&page),
                scanner: Arc::clone(&scanner),
            });
            let history: Arc<dyn HistoryStore> = Arc::clone(&self.storage) as Arc<dyn HistoryStore>;
            let agent_loop = AgentLoop::new(
                Arc::clone(&page),
                scanner,
                Arc::clone(&handle.decider),
                VisibilityChecker::new(Arc::clone(&self.llm)),
                GuardrailGate::new(self.config.confirm_keywords.clone()),
                history,
                sink,
                AgentLoopConfig::default(),
                Arc::clone(&session.steps),
            );

            let outcome = agent_loop.run(&ctx, &mut session.loop_state).await;
            let step_number = session.steps.load(std::sync::atomic::Ordering::SeqCst);

            if outcome.completed {
                self.capture_note(&mut session, &page, &step).await;
                self.channel.log(
                    step_number,
                    Phase::Verify,
                    format!("objective completed: {} ({})", step.title, outcome.reason),
                    None,
                );
                session.advance();
                self.fast_forward(&mut session, &page, step_number).await;
                continue;
            }

            if let Some(kind) = outcome.pause_kind {
                if let Some(action) = outcome.pending_action.clone() {
                    session.pause_for_action(action);
                }
                self.storage
                    .update_session_status(&session.id, SessionStatus::Paused)
                    .await
                    .ok();
                self.channel.status(
                    session.id.clone(),
                    SessionStatus::Paused,
                    Some(outcome.reason),
                    outcome.pending_action,
                    Some(kind),
                );
                return Ok(());
            }

            self.fail_session(&mut session, &outcome.reason).await;
            return Ok(());
        }
    }

    /// Skip upcoming steps the agent already satisfied out of order.
    async fn fast_forward(
        &self,
        session: &mut Session,
        page: &Arc<dyn PageOps>,
        step_number: u64,
    ) {
        let url = page.current_url().await.unwrap_or_default();
        while let Some(next) = session.current_step() {
            if !step_likely_done(next, &url) {
                break;
            }
            self.channel.log(
                step_number,
                Phase::Verify,
                format!("fast-forward: \"{}\" already satisfied by {url}", next.title),
                None,
            );
            session.advance();
        }
    }

    async fn capture_note(
        &self,
        session: &mut Session,
        page: &Arc<dyn PageOps>,
        step: &PlanStep,
    ) {
        if let Ok(text) = page.visible_text(NOTE_CAPTURE_CHARS).await {
            if text.trim().len() > NOTE_MIN_CHARS {
                session.notes.push(step.title.clone(), text.trim());
            }
        }
    }

    async fn finalize(&self, session: &mut Session) {
        if session.plan.needs_synthesis && session.notes.worth_synthesizing() {
            let step_number = session.steps.load(std::sync::atomic::Ordering::SeqCst);
            let synthesizer = Synthesizer::new(Arc::clone(&self.llm));
            let answer = synthesizer.synthesize(session.task(), &session.notes).await;
            let message = format!("RESEARCH FINDINGS:\n{answer}");
            self.channel
                .log(step_number, Phase::Synthesis, message.clone(), None);
            let _ = self
                .storage
                .record_step(&StepRecord {
                    session_id: session.id.clone(),
                    step_number,
                    phase: Phase::Synthesis,
                    action_type: None,
                    action_data: None,
                    observation: Some(message),
                    error: None,
                })
                .await;
        }
        self.storage
            .update_session_status(&session.id, SessionStatus::Completed)
            .await
            .ok();
        self.channel.status(
            session.id.clone(),
            SessionStatus::Completed,
            Some("all objectives completed".to_string()),
            None,
            None,
        );
        // The session stays in the active map and the browser stays open so
        // the user can inspect the result.
    }

    async fn fail_session(&self, session: &mut Session, reason: &str) {
        // A stop may have raced us; a removed session emits nothing more.
        if !self.sessions.contains_key(&session.id.0) {
            return;
        }
        self.storage
            .update_session_status(&session.id, SessionStatus::Error)
            .await
            .ok();
        self.channel.status(
            session.id.clone(),
            SessionStatus::Error,
            Some(reason.to_string()),
            None,
            None,
        );
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        let Some((_, handle)) = self.sessions.remove(session_id) else {
            anyhow::bail!("unknown session {session_id}");
        };
        handle.browser.close().await;
        let id = SessionId::from(session_id);
        self.storage
            .update_session_status(&id, SessionStatus::Stopped)
            .await
            .ok();
        self.channel
            .status(id, SessionStatus::Stopped, None, None, None);
        Ok(())
    }

    async fn confirmation(&self, session_id: &str, approved: bool) -> Result<()> {
        let Some(handle) = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(&entry))
        else {
            anyhow::bail!("unknown session {session_id}");
        };

        if !approved {
            // Hard rejection ends the session.
            self.sessions.remove(session_id);
            handle.browser.close().await;
            let id = SessionId::from(session_id);
            self.storage
                .update_session_status(&id, SessionStatus::Stopped)
                .await
                .ok();
            self.channel.status(
                id,
                SessionStatus::Stopped,
                Some("user rejected the proposed action".to_string()),
                None,
                None,
            );
            return Ok(());
        }

        let resume = {
            let mut session = handle.state.lock().await;
            session.resume();
            if let Some(action) = session.pending_action.take() {
                // Execute the approved action once, then resume the loop
                // with its counters intact.
                let page = handle
                    .browser
                    .newest_surface()
                    .await
                    .context("no browser surface")?;
                let scanner = RegionScanner::new(Arc::clone(&page));
                let step_number = session.steps.load(std::sync::atomic::Ordering::SeqCst);
                self.channel.log(
                    step_number,
                    Phase::Act,
                    format!("executing approved action {}", action.kind()),
                    None,
                );
                if let Err(err) = execute_action(&page, &scanner, &action).await {
                    warn!(%err, "approved action failed");
                    self.channel.log(
                        step_number,
                        Phase::Act,
                        "approved action failed",
                        Some(err.to_string()),
                    );
                }
                true
            } else if session.paused_for_human_objective.take().is_some() {
                // The human finished the objective manually.
                session.advance();
                false
            } else {
                false
            }
        };

        let id = SessionId::from(session_id);
        self.storage
            .update_session_status(&id, SessionStatus::Running)
            .await
            .ok();
        self.channel
            .status(id, SessionStatus::Running, None, None, None);
        self.run_traversal(handle, resume).await
    }
}

fn objective_prompt(session: &Session, step: &PlanStep) -> String {
    let target = step
        .target_url
        .as_deref()
        .unwrap_or("(none; reach it by browsing)");
    let notes = session.notes.window_text(NOTES_PROMPT_CHARS);
    let notes = if notes.is_empty() {
        "(none yet)".to_string()
    } else {
        notes
    };
    format!(
        "Task: {task}\nStrategy: {strategy}\n\nCurrent objective (step {number} of {total}): {title}\n{description}\nTarget URL: {target}\n\nFull plan:\n{plan}\n\nResearch notes so far:\n{notes}",
        task = session.task(),
        strategy = session.plan.strategy,
        number = session.plan_index + 1,
        total = session.plan.len(),
        title = step.title,
        description = step.description,
        plan = session.plan.prompt_listing(),
    )
}

/// Bridges the loop's progress into persistence and the client channel.
struct OrchestratorSink {
    session_id: SessionId,
    storage: Arc<Storage>,
    channel: ClientChannel,
    artifacts: Arc<ArtifactStore>,
    page: Arc<dyn PageOps>,
    scanner: Arc<RegionScanner>,
}

#[async_trait]
impl StepSink for OrchestratorSink {
    async fn phase_log(&self, phase: Phase, step: u64, message: &str, error: Option<&str>) {
        self.channel
            .log(step, phase, message, error.map(str::to_string));
        let _ = self
            .storage
            .record_step(&StepRecord {
                session_id: self.session_id.clone(),
                step_number: step,
                phase,
                action_type: None,
                action_data: None,
                observation: Some(message.to_string()),
                error: error.map(str::to_string),
            })
            .await;
    }

    async fn action_step(&self, step: u64, decision: &Decision, outcome: &ActionOutcome) {
        let _ = self
            .storage
            .record_step(&StepRecord {
                session_id: self.session_id.clone(),
                step_number: step,
                phase: Phase::Act,
                action_type: Some(decision.action.kind().to_string()),
                action_data: serde_json::to_value(&decision.action).ok(),
                observation: Some(format!("stateChanged={}", outcome.state_changed)),
                error: outcome.error.clone(),
            })
            .await;

        let trace = json!({
            "action": decision.action,
            "reasoning": decision.reasoning,
            "confidence": decision.confidence,
            "stateChanged": outcome.state_changed,
            "urlAfter": outcome.after.url,
        });
        if let Ok(saved) = self.artifacts.save_trace(&self.session_id, step, &trace).await {
            let _ = self
                .storage
                .record_artifact(&self.session_id, step, &saved.web_path, "json")
                .await;
        }

        // Screenshot after ACT, with a quick rescan so the client overlay
        // shows the regions of the page that resulted from the action.
        match self.page.screenshot_png().await {
            Ok(bytes) => match self
                .artifacts
                .save_screenshot(&self.session_id, step, &bytes)
                .await
            {
                Ok(saved) => {
                    let _ = self
                        .storage
                        .record_artifact(&self.session_id, step, &saved.web_path, "png")
                        .await;
                    let regions = self.scanner.scan(true).await.ok();
                    self.channel.screenshot(
                        self.session_id.clone(),
                        step,
                        saved.web_path,
                        Some(format!(
                            "{} -> stateChanged={}",
                            decision.action.kind(),
                            outcome.state_changed
                        )),
                        regions,
                    );
                }
                Err(err) => warn!(%err, "failed to save screenshot"),
            },
            // Expected right after a navigating click; the next action's
            // screenshot will capture the new document.
            Err(err) => warn!(%err, "screenshot unavailable"),
        }
    }
}
