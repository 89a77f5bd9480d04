//! Per-task session state. Created when a task arrives; destroyed only on
//! an explicit stop, so the user can inspect the browser afterwards.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use webpilot_agent_core::{Action, LoopState, Plan, PlanStep, ResearchNotes, StepCounter};
use webpilot_core_types::SessionId;

pub struct Session {
    pub id: SessionId,
    /// Original task text, preserved verbatim so multilingual prompts
    /// survive. Read-only after creation.
    task: String,
    pub plan: Plan,
    pub plan_index: usize,
    pub completed_titles: Vec<String>,
    pub notes: ResearchNotes,
    pub paused: bool,
    pub pending_action: Option<Action>,
    pub paused_for_human_objective: Option<String>,
    /// Monotonic across the whole session, shared with the loop.
    pub steps: StepCounter,
    /// Loop state of the in-flight objective; preserved across a pause so
    /// a resume keeps its counters.
    pub loop_state: LoopState,
}

impl Session {
    pub fn new(id: SessionId, task: String, plan: Plan) -> Self {
        Self {
            id,
            task,
            plan,
            plan_index: 0,
            completed_titles: Vec::new(),
            notes: ResearchNotes::new(),
            paused: false,
            pending_action: None,
            paused_for_human_objective: None,
            steps: Arc::new(AtomicU64::new(0)),
            loop_state: LoopState::default(),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.plan.steps.get(self.plan_index)
    }

    pub fn finished(&self) -> bool {
        self.plan_index >= self.plan.len()
    }

    /// Mark the current objective done and move on.
    pub fn advance(&mut self) {
        if let Some(step) = self.current_step() {
            self.completed_titles.push(step.title.clone());
        }
        if self.plan_index < self.plan.len() {
            self.plan_index += 1;
        }
    }

    /// A paused session always carries either a pending action or a
    /// human-owned objective marker.
    pub fn pause_for_action(&mut self, action: Action) {
        self.paused = true;
        self.pending_action = Some(action);
        self.paused_for_human_objective = None;
    }

    pub fn pause_for_human(&mut self, step_title: String) {
        self.paused = true;
        self.pending_action = None;
        self.paused_for_human_objective = Some(step_title);
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}
