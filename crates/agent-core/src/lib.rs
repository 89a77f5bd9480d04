//! Agent core: action schema, planner, decider, guardrails and the
//! per-objective agent loop.

pub mod action;
pub mod agent_loop;
pub mod decider;
pub mod errors;
pub mod exec;
pub mod guardrails;
pub mod history;
pub mod llm;
pub mod notes;
pub mod outcome;
pub mod plan;
pub mod planner;
pub mod prompt;
pub mod synthesis;
pub mod util;
pub mod verify;
pub mod visibility;

pub use action::{Action, Decision, ScrollDirection, DEFAULT_SCROLL_PX};
pub use agent_loop::{
    AgentLoop, AgentLoopConfig, LoopState, NullSink, ObjectiveContext, ObjectiveOutcome,
    ScrollState, StepCounter, StepSink,
};
pub use decider::Decider;
pub use errors::{AgentError, AgentResult};
pub use exec::execute_action;
pub use guardrails::{domain_allowed, GuardrailGate, GuardrailVerdict, DEFAULT_CONFIRM_KEYWORDS};
pub use history::{EmptyHistory, HistoryEntry, HistoryStore, HISTORY_WINDOW};
pub use llm::{LlmClient, LlmRequest, ScriptedLlm};
pub use notes::{ResearchNote, ResearchNotes};
pub use outcome::{ActionOutcome, StateSnapshot};
pub use plan::{mentions_login, step_likely_done, url_has_search_markers, Plan, PlanStep};
pub use planner::{draft_plan, NoScout, Planner, ScoutSearch, VerifiedUrl};
pub use synthesis::Synthesizer;
pub use visibility::VisibilityChecker;
