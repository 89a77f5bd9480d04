//! Decision stage: one LLM call per loop iteration, hardened by response
//! auto-patching and a graduated heuristic fallback so a run of malformed
//! answers degrades the objective instead of cascading through the plan.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use webpilot_core_types::{Region, RegionRole};

use crate::action::{Action, Decision, ScrollDirection};
use crate::history::HistoryEntry;
use crate::llm::{LlmClient, LlmRequest};
use crate::outcome::ActionOutcome;
use crate::plan::{step_likely_done, PlanStep};
use crate::prompt::{compose_decision_prompt, DECIDER_SYSTEM_PROMPT};
use crate::util::extract_json_object;

/// Everything the decider sees for one call.
pub struct DeciderInput<'a> {
    pub context_prompt: &'a str,
    pub step_title: &'a str,
    pub step_description: &'a str,
    pub url: &'a str,
    pub page_text: &'a str,
    pub regions: &'a [Region],
    pub history: &'a [HistoryEntry],
    pub last_action: Option<&'a Action>,
    pub last_outcome: Option<&'a ActionOutcome>,
    pub scroll_status: &'a str,
    pub feedback: Option<&'a str>,
}

pub struct Decider {
    llm: Arc<dyn LlmClient>,
    /// Consecutive decisions answered without a valid LLM result. Reset on
    /// any successful parse; persisted across calls within an objective.
    fallback_tries: Mutex<u32>,
}

impl Decider {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback_tries: Mutex::new(0),
        }
    }

    /// Reset the graduated-fallback counter (new objective).
    pub fn reset(&self) {
        *self.fallback_tries.lock() = 0;
    }

    pub async fn decide(&self, task: &str, input: DeciderInput<'_>) -> Decision {
        if let Some(decision) = self.llm_decision(&input).await {
            *self.fallback_tries.lock() = 0;
            return decision;
        }
        self.heuristic_decision(task, &input)
    }

    async fn llm_decision(&self, input: &DeciderInput<'_>) -> Option<Decision> {
        let user = compose_decision_prompt(
            input.context_prompt,
            input.url,
            input.history,
            input.page_text,
            input.regions,
            input.last_action,
            input.last_outcome,
            input.scroll_status,
            input.feedback,
        );
        let request = LlmRequest::new(DECIDER_SYSTEM_PROMPT, user)
            .with_temperature(0.1)
            .with_max_tokens(512);
        let text = match self.llm.complete(request).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "decider llm call failed");
                return None;
            }
        };
        let decision = parse_decision(&text)?;
        if let Err(err) = decision.action.validate(input.regions) {
            warn!(%err, "decider proposed an invalid action");
            return None;
        }
        Some(decision)
    }

    /// Heuristic fallback on a null LLM result, in order: literal-task
    /// synthesis, already-done detection, then the graduated retry ladder.
    fn heuristic_decision(&self, task: &str, input: &DeciderInput<'_>) -> Decision {
        if let Some(decision) = literal_task_click(task, input.regions) {
            return decision;
        }

        let step = PlanStep {
            id: 0,
            title: input.step_title.to_string(),
            description: input.step_description.to_string(),
            needs_auth: false,
            target_url: None,
        };
        if step_likely_done(&step, input.url) {
            return Decision::new(
                Action::Done {
                    reason: Some("current URL already satisfies the objective".to_string()),
                },
                "no LLM answer; URL heuristics say the objective is met",
                0.4,
            );
        }

        let mut tries = self.fallback_tries.lock();
        let decision = match *tries {
            0 => Decision::new(
                Action::Scroll {
                    direction: ScrollDirection::Down,
                    amount: None,
                },
                "no LLM answer; scrolling to surface more context",
                0.2,
            ),
            1 => Decision::new(
                Action::Wait {
                    duration: Some(2_000),
                    until: None,
                },
                "no LLM answer twice; waiting for the page to settle",
                0.2,
            ),
            _ => Decision::new(
                Action::Done {
                    reason: Some("no usable LLM decision after repeated attempts".to_string()),
                },
                "giving up on this objective after three failed decisions",
                0.1,
            ),
        };
        *tries += 1;
        debug!(tries = *tries, "graduated decider fallback engaged");
        decision
    }
}

/// Rule 1 of the fallback: the task literally asks for a click we can
/// synthesize without a model.
fn literal_task_click(task: &str, regions: &[Region]) -> Option<Decision> {
    let lowered = task.to_lowercase();
    if lowered.contains("click") && lowered.contains("first link") {
        let first_link = regions.iter().find(|r| r.role == RegionRole::Link)?;
        return Some(Decision::new(
            Action::VisionClick {
                region_id: first_link.id.clone(),
                description: Some("first link on the page".to_string()),
            },
            "task literally asks for the first link",
            0.8,
        ));
    }
    let named = regions.iter().find(|r| {
        let label = r.label.to_lowercase();
        label.len() >= 4 && lowered.contains(&label)
    })?;
    Some(Decision::new(
        Action::VisionClick {
            region_id: named.id.clone(),
            description: Some(format!("region labeled \"{}\"", named.label)),
        },
        "task names this region's label",
        0.6,
    ))
}

/// Extract and repair a decision from raw LLM text. Missing `confidence`
/// defaults to 0.5 and missing `reasoning` to a placeholder; anything still
/// invalid after that is a null result.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let span = extract_json_object(text)?;
    let mut value: Value = serde_json::from_str(span).ok()?;
    let object = value.as_object_mut()?;
    object
        .entry("confidence")
        .or_insert_with(|| Value::from(0.5));
    object
        .entry("reasoning")
        .or_insert_with(|| Value::from("model omitted reasoning"));
    serde_json::from_value::<Decision>(value).ok()
}
